//! Pattern filter command.
//!
//! Line-level filter in the spirit of `grep`: keeps feature lines whose
//! chosen column contains one of the given patterns. For the attributes
//! column a single attribute field is searched instead of the whole text.

use crate::format::parsing::{
    column_count, parse_u64_fast, percent_decode, should_skip_line, split_columns, GFF_COLUMNS,
};
use crate::gff::{open_input, GffError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Pattern filter configuration.
#[derive(Debug, Clone)]
pub struct PatternFilterCommand {
    /// Substrings to look for; a line matches if any of them is found
    pub patterns: Vec<String>,
    /// 1-based column to search (9 = attributes)
    pub column: usize,
    /// Attribute field searched when `column` is 9
    pub field: String,
    /// Sort kept lines by start position
    pub sort: bool,
}

impl Default for PatternFilterCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternFilterCommand {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            column: GFF_COLUMNS,
            field: "ID".to_string(),
            sort: false,
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Load one pattern per line, ignoring blank lines.
    pub fn load_patterns<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let reader = BufReader::new(File::open(path)?);
        let mut patterns = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                patterns.push(line.to_string());
            }
        }
        Ok(patterns)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=GFF_COLUMNS).contains(&self.column) {
            return Err(GffError::InvalidFormat(format!(
                "Column must be between 1 and {}, got {}",
                GFF_COLUMNS, self.column
            )));
        }
        if self.patterns.is_empty() {
            return Err(GffError::InvalidFormat(
                "No patterns given; use --pattern or --list".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the columns of one feature line match.
    pub fn line_matches(&self, cols: &[&str; GFF_COLUMNS]) -> bool {
        if self.column == GFF_COLUMNS {
            attribute_values(cols[GFF_COLUMNS - 1], &self.field)
                .iter()
                .any(|value| self.contains_pattern(value))
        } else {
            self.contains_pattern(cols[self.column - 1])
        }
    }

    #[inline]
    fn contains_pattern(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| text.contains(p.as_str()))
    }

    /// Run the filter on a path (`None` or `-` for stdin).
    pub fn run<W: Write>(
        &self,
        input: Option<&Path>,
        output: &mut W,
    ) -> Result<PatternFilterStats> {
        self.validate()?;
        let reader = open_input(input)?;
        self.filter_lines(reader, output)
    }

    /// Core filter over any buffered reader.
    pub fn filter_lines<R: BufRead, W: Write>(
        &self,
        reader: R,
        output: &mut W,
    ) -> Result<PatternFilterStats> {
        self.validate()?;
        let mut stats = PatternFilterStats::default();
        let mut kept: Vec<(Option<u64>, String)> = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.starts_with("##FASTA") || line.starts_with('>') {
                break;
            }
            if should_skip_line(line.trim_end().as_bytes()) {
                continue;
            }
            stats.lines_read += 1;

            let cols = split_columns(&line).ok_or_else(|| GffError::Parse {
                line: line_num + 1,
                message: format!(
                    "Expected 9 tab-separated columns, got {}",
                    column_count(&line)
                ),
            })?;

            if self.line_matches(&cols) {
                let start = parse_u64_fast(cols[3].as_bytes());
                kept.push((start, line));
            }
        }

        if self.sort {
            // Unparseable starts go last; ties keep input order.
            kept.sort_by_key(|(start, _)| start.unwrap_or(u64::MAX));
        }

        let mut writer = BufWriter::with_capacity(256 * 1024, output);
        writeln!(writer, "##gff-version 3")?;
        for (_, line) in &kept {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;

        stats.lines_written = kept.len();
        Ok(stats)
    }
}

/// Values of one field in a raw attributes column.
fn attribute_values(column: &str, field: &str) -> Vec<String> {
    column
        .split(';')
        .filter_map(|entry| entry.trim().split_once('='))
        .filter(|(key, _)| percent_decode(key.trim()) == field)
        .flat_map(|(_, values)| values.split(','))
        .map(|value| percent_decode(value.trim()).into_owned())
        .collect()
}

/// Statistics for a pattern filter run.
#[derive(Debug, Clone, Default)]
pub struct PatternFilterStats {
    /// Feature lines read
    pub lines_read: usize,
    /// Feature lines written
    pub lines_written: usize,
}

impl std::fmt::Display for PatternFilterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Read: {}, Written: {}",
            self.lines_read, self.lines_written
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "##gff-version 3\n\
        ctg1\tbarrnap:0.9\trRNA\t500\t600\t.\t+\t.\tID=r1;product=16S ribosomal RNA\n\
        ctg1\tprokka\tCDS\t10\t50\t.\t+\t0\tID=c1;product=kinase\n\
        ctg1\tprokka\tCDS\t200\t300\t.\t-\t0\tID=c2;product=ligase,kinase-like\n\
        ##FASTA\n>ctg1\nACGT\n";

    fn run(cmd: &PatternFilterCommand) -> (String, PatternFilterStats) {
        let mut output = Vec::new();
        let stats = cmd.filter_lines(INPUT.as_bytes(), &mut output).unwrap();
        (String::from_utf8(output).unwrap(), stats)
    }

    #[test]
    fn test_source_column() {
        let cmd = PatternFilterCommand::new()
            .with_column(2)
            .with_patterns(vec!["barrnap:0.9".to_string()]);
        let (out, stats) = run(&cmd);
        assert_eq!(out.lines().count(), 2);
        assert!(out.contains("ID=r1"));
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.lines_written, 1);
    }

    #[test]
    fn test_attribute_field() {
        let cmd = PatternFilterCommand::new()
            .with_field("product")
            .with_patterns(vec!["kinase".to_string()]);
        let (out, _) = run(&cmd);
        assert!(out.contains("ID=c1"));
        assert!(out.contains("ID=c2"));
        assert!(!out.contains("ID=r1"));
    }

    #[test]
    fn test_field_only_searches_that_key() {
        // "c" appears in every ID but the Name field does not exist.
        let cmd = PatternFilterCommand::new()
            .with_field("Name")
            .with_patterns(vec!["c".to_string()]);
        let (out, _) = run(&cmd);
        assert_eq!(out, "##gff-version 3\n");
    }

    #[test]
    fn test_sort_by_start() {
        let cmd = PatternFilterCommand::new()
            .with_column(1)
            .with_sort(true)
            .with_patterns(vec!["ctg1".to_string()]);
        let (out, _) = run(&cmd);
        let starts: Vec<&str> = out
            .lines()
            .skip(1)
            .map(|l| l.split('\t').nth(3).unwrap())
            .collect();
        assert_eq!(starts, vec!["10", "200", "500"]);
    }

    #[test]
    fn test_invalid_column() {
        let cmd = PatternFilterCommand::new()
            .with_column(10)
            .with_patterns(vec!["x".to_string()]);
        let mut output = Vec::new();
        assert!(cmd.filter_lines(INPUT.as_bytes(), &mut output).is_err());
    }

    #[test]
    fn test_requires_patterns() {
        let mut output = Vec::new();
        let result = PatternFilterCommand::new().filter_lines(INPUT.as_bytes(), &mut output);
        assert!(matches!(result, Err(GffError::InvalidFormat(_))));
    }

    #[test]
    fn test_load_patterns() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "kinase\n\nligase").unwrap();
        let patterns = PatternFilterCommand::load_patterns(file.path()).unwrap();
        assert_eq!(patterns, vec!["kinase", "ligase"]);
    }
}

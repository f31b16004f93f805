//! Exact-mode filter command.
//!
//! Runs the nested feature filter over every record of a GFF3 file and
//! writes the surviving trees back as GFF3.

use crate::feature::Record;
use crate::format::output::GffWriter;
use crate::gff::{GffReader, Result};
use crate::nested::{FilterStats, NestedFeatureFilter};
use crate::selection::SelectionCriteria;
use log::{info, warn};
use std::io::{self, Write};
use std::path::Path;

/// Exact filter command configuration.
#[derive(Debug, Clone, Default)]
pub struct FilterCommand {
    pub criteria: SelectionCriteria,
    /// Write records left without features (as a bare sequence-region)
    pub keep_empty: bool,
    /// Append the `##FASTA` section of the kept records
    pub with_fasta: bool,
}

impl FilterCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criteria(mut self, criteria: SelectionCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_keep_empty(mut self, keep_empty: bool) -> Self {
        self.keep_empty = keep_empty;
        self
    }

    pub fn with_fasta(mut self, with_fasta: bool) -> Self {
        self.with_fasta = with_fasta;
        self
    }

    /// Filter a GFF3 file (`-` for stdin).
    pub fn run<P: AsRef<Path>, W: Write>(&self, input: P, output: &mut W) -> Result<FilterStats> {
        let records = GffReader::from_path(input)?.read_records()?;
        self.filter_records(&records, output)
    }

    /// Filter GFF3 from stdin.
    pub fn run_stdin<W: Write>(&self, output: &mut W) -> Result<FilterStats> {
        let stdin = io::stdin();
        let records = GffReader::new(stdin.lock()).read_records()?;
        self.filter_records(&records, output)
    }

    /// Filter parsed records and write the result.
    pub fn filter_records<W: Write>(
        &self,
        records: &[Record],
        output: &mut W,
    ) -> Result<FilterStats> {
        if self
            .criteria
            .attributes
            .as_ref()
            .is_some_and(|table| table.is_empty())
        {
            warn!("Attribute table has no keys, every feature will be removed");
        }

        let filter = NestedFeatureFilter::new(self.criteria.clone());
        let (filtered, stats) = filter.filter_all(records);

        let kept: Vec<Record> = filtered
            .into_iter()
            .filter(|record| self.keep_empty || !record.features.is_empty())
            .collect();

        let mut writer = GffWriter::new(output);
        writer.write_header()?;
        for record in &kept {
            writer.write_record(record)?;
        }
        if self.with_fasta {
            writer.write_fasta_section(&kept)?;
        }
        writer.flush()?;

        info!("Filter finished: {}", stats);
        Ok(stats)
    }
}

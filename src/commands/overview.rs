//! Overview command: summary counts for a GFF3 file.

use crate::feature::{Feature, Record};
use crate::gff::{GffReader, Result};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Counts gathered over every feature at every depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub records: usize,
    pub features: usize,
    pub seqids: BTreeMap<String, usize>,
    pub sources: BTreeMap<String, usize>,
    pub types: BTreeMap<String, usize>,
    /// Keyed by `source:type`.
    pub source_types: BTreeMap<String, usize>,
    pub attribute_keys: BTreeMap<String, usize>,
}

impl Overview {
    /// Tally the given records.
    pub fn from_records(records: &[Record]) -> Self {
        let mut seqids: FxHashMap<&str, usize> = FxHashMap::default();
        let mut sources: FxHashMap<&str, usize> = FxHashMap::default();
        let mut types: FxHashMap<&str, usize> = FxHashMap::default();
        let mut source_types: FxHashMap<(&str, &str), usize> = FxHashMap::default();
        let mut attribute_keys: FxHashMap<&str, usize> = FxHashMap::default();
        let mut features = 0;

        for record in records {
            for feature in record.flatten() {
                features += 1;
                *seqids.entry(&feature.seqid).or_default() += 1;
                *sources.entry(&feature.source).or_default() += 1;
                *types.entry(&feature.kind).or_default() += 1;
                *source_types
                    .entry((&feature.source, &feature.kind))
                    .or_default() += 1;
                for key in feature.attributes.keys() {
                    *attribute_keys.entry(key).or_default() += 1;
                }
            }
        }

        let sorted = |map: FxHashMap<&str, usize>| -> BTreeMap<String, usize> {
            map.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
        };

        Self {
            records: records.len(),
            features,
            seqids: sorted(seqids),
            sources: sorted(sources),
            types: sorted(types),
            source_types: source_types
                .into_iter()
                .map(|((source, kind), n)| (format!("{}:{}", source, kind), n))
                .collect(),
            attribute_keys: sorted(attribute_keys),
        }
    }
}

/// Overview command configuration.
#[derive(Debug, Clone, Default)]
pub struct OverviewCommand {
    /// Print the counts as JSON instead of text
    pub json: bool,
}

impl OverviewCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn run<P: AsRef<Path>, W: Write>(&self, input: P, output: &mut W) -> Result<Overview> {
        let records = GffReader::from_path(input)?.read_records()?;
        self.report(&records, output)
    }

    /// Compute and print the overview of parsed records.
    pub fn report<W: Write>(&self, records: &[Record], output: &mut W) -> Result<Overview> {
        let overview = Overview::from_records(records);
        let mut out = BufWriter::new(output);

        if self.json {
            serde_json::to_writer_pretty(&mut out, &overview)?;
            writeln!(out)?;
        } else {
            writeln!(out, "Records: {}", overview.records)?;
            writeln!(out, "Features: {}", overview.features)?;
            write_section(&mut out, "Sequence IDs", &overview.seqids)?;
            write_section(&mut out, "Sources", &overview.sources)?;
            write_section(&mut out, "Feature types", &overview.types)?;
            write_section(&mut out, "Source:type pairs", &overview.source_types)?;
            write_section(&mut out, "Attribute keys", &overview.attribute_keys)?;

            if let Some(first) = records.iter().find_map(|r| r.features.first()) {
                write_first_feature(&mut out, first)?;
            }
        }

        out.flush()?;
        Ok(overview)
    }
}

fn write_section<W: Write>(
    out: &mut W,
    title: &str,
    counts: &BTreeMap<String, usize>,
) -> Result<()> {
    writeln!(out, "\n{}:", title)?;
    for (name, count) in counts {
        writeln!(out, "  {}\t{}", name, count)?;
    }
    Ok(())
}

fn write_first_feature<W: Write>(out: &mut W, feature: &Feature) -> Result<()> {
    writeln!(out, "\nFirst feature:")?;
    writeln!(out, "  {}", feature)?;
    for (key, values) in feature.attributes.iter() {
        writeln!(out, "  {} = {}", key, values.join(","))?;
    }
    if !feature.children.is_empty() {
        let kinds: Vec<&str> = feature.children.iter().map(|c| c.kind.as_str()).collect();
        writeln!(out, "  children: {}", kinds.join(", "))?;
    }
    Ok(())
}

//! Convert command: GFF3 to JSON, FASTA, GenBank, GFF3 or the document store.

use crate::feature::{Feature, Location, Record, Strand};
use crate::format::output::write_records;
use crate::gff::{GffError, GffReader, Result};
use crate::sequence::{attach_fasta, feature_sequence, load_fasta};
use crate::store::{Document, DocumentStore};
use bio::io::fasta;
use gb_io::seq::{Feature as GbFeature, Location as GbLocation, Qualifier, Seq, Topology};
use log::{info, warn};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertFormat {
    #[default]
    Json,
    Fasta,
    Genbank,
    Gff,
    Store,
}

impl FromStr for ConvertFormat {
    type Err = GffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ConvertFormat::Json),
            "fasta" => Ok(ConvertFormat::Fasta),
            "genbank" | "gbk" => Ok(ConvertFormat::Genbank),
            "gff" | "gff3" => Ok(ConvertFormat::Gff),
            "store" => Ok(ConvertFormat::Store),
            _ => Err(GffError::InvalidFormat(format!(
                "Unknown output format '{}'. Use: json, fasta, genbank, gff, store",
                s
            ))),
        }
    }
}

impl fmt::Display for ConvertFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConvertFormat::Json => "json",
            ConvertFormat::Fasta => "fasta",
            ConvertFormat::Genbank => "genbank",
            ConvertFormat::Gff => "gff",
            ConvertFormat::Store => "store",
        };
        write!(f, "{}", name)
    }
}

/// Convert command configuration.
#[derive(Debug, Clone)]
pub struct ConvertCommand {
    pub format: ConvertFormat,
    /// Attribute used as the JSON key and FASTA header
    pub id_attribute: String,
    /// External FASTA with the record sequences
    pub fasta: Option<PathBuf>,
    /// Feature types written to FASTA (empty = all)
    pub feature_types: Vec<String>,
    pub db_name: String,
    pub collection: String,
    pub store_path: PathBuf,
}

impl Default for ConvertCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvertCommand {
    pub fn new() -> Self {
        Self {
            format: ConvertFormat::Json,
            id_attribute: "ID".to_string(),
            fasta: None,
            feature_types: Vec::new(),
            db_name: "annotation_db".to_string(),
            collection: "Genome".to_string(),
            store_path: PathBuf::from("./store"),
        }
    }

    pub fn with_format(mut self, format: ConvertFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_id_attribute(mut self, key: impl Into<String>) -> Self {
        self.id_attribute = key.into();
        self
    }

    pub fn with_fasta(mut self, path: Option<PathBuf>) -> Self {
        self.fasta = path;
        self
    }

    pub fn with_feature_types(mut self, types: Vec<String>) -> Self {
        self.feature_types = types;
        self
    }

    pub fn with_store(
        mut self,
        store_path: impl Into<PathBuf>,
        db_name: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        self.store_path = store_path.into();
        self.db_name = db_name.into();
        self.collection = collection.into();
        self
    }

    /// Convert a GFF3 file (`-` for stdin).
    pub fn run<P: AsRef<Path>, W: Write>(&self, input: P, output: &mut W) -> Result<ConvertStats> {
        let mut records = GffReader::from_path(input)?.read_records()?;
        if let Some(path) = &self.fasta {
            let attached = attach_fasta(&mut records, load_fasta(path)?);
            info!("Attached {} sequences from {}", attached, path.display());
        }
        self.convert_records(&records, output)
    }

    /// Convert parsed records.
    pub fn convert_records<W: Write>(
        &self,
        records: &[Record],
        output: &mut W,
    ) -> Result<ConvertStats> {
        let stats = match self.format {
            ConvertFormat::Json => self.write_json(records, output)?,
            ConvertFormat::Fasta => self.write_fasta(records, output)?,
            ConvertFormat::Genbank => write_genbank(records, output)?,
            ConvertFormat::Gff => {
                write_records(&mut *output, records, true)?;
                ConvertStats {
                    written: records.iter().map(Record::feature_count).sum(),
                    skipped: 0,
                }
            }
            ConvertFormat::Store => self.write_store(records)?,
        };
        info!("Converted to {}: {}", self.format, stats);
        Ok(stats)
    }

    fn write_json<W: Write>(&self, records: &[Record], output: &mut W) -> Result<ConvertStats> {
        let mut entries = Map::new();
        for feature in records.iter().flat_map(Record::flatten) {
            entries.insert(feature.tag(&self.id_attribute), feature_to_json(feature));
        }
        let written = entries.len();

        let mut out = BufWriter::new(output);
        serde_json::to_writer_pretty(&mut out, &Value::Object(entries))?;
        writeln!(out)?;
        out.flush()?;

        Ok(ConvertStats {
            written,
            skipped: 0,
        })
    }

    fn wanted(&self, feature: &Feature) -> bool {
        self.feature_types.is_empty() || self.feature_types.iter().any(|t| *t == feature.kind)
    }

    fn write_fasta<W: Write>(&self, records: &[Record], output: &mut W) -> Result<ConvertStats> {
        let mut stats = ConvertStats::default();
        let mut writer = fasta::Writer::new(BufWriter::new(output));

        for record in records {
            for feature in record.flatten().into_iter().filter(|f| self.wanted(f)) {
                let tag = feature.tag(&self.id_attribute);
                match feature_sequence(record, feature) {
                    Some(seq) => {
                        writer.write(&tag, None, &seq)?;
                        stats.written += 1;
                    }
                    None => {
                        warn!("No sequence available for {} on {}, skipping", tag, record.id);
                        stats.skipped += 1;
                    }
                }
            }
        }
        writer.flush()?;
        Ok(stats)
    }

    fn write_store(&self, records: &[Record]) -> Result<ConvertStats> {
        let documents = Document::from_records(records);
        let store = DocumentStore::open(&self.store_path);
        store.save_collection(&self.db_name, &self.collection, &documents)?;
        info!(
            "Stored {} documents in {}/{}",
            documents.len(),
            self.db_name,
            self.collection
        );
        Ok(ConvertStats {
            written: documents.len(),
            skipped: 0,
        })
    }
}

/// JSON object for one feature; coordinates as written in the file.
pub fn feature_to_json(feature: &Feature) -> Value {
    let (start, end) = match &feature.location {
        Location::Span { start, end } => (json!(start + 1), json!(end)),
        Location::Malformed { start, end } => (json!(start), json!(end)),
    };
    let attributes: Map<String, Value> = feature
        .attributes
        .iter()
        .map(|(key, values)| (key.to_string(), json!(values)))
        .collect();

    json!({
        "seqid": feature.seqid,
        "source": feature.source,
        "type": feature.kind,
        "start": start,
        "end": end,
        "score": feature.score.as_deref().unwrap_or("."),
        "strand": feature.strand.to_string(),
        "phase": feature.phase.as_deref().unwrap_or("."),
        "attributes": attributes,
    })
}

/// GenBank entry for one record, with the feature tree flattened.
pub fn record_to_genbank(record: &Record) -> (Seq, usize) {
    let mut seq = Seq::empty();
    let bases = record.sequence.clone().unwrap_or_default();
    let extent = record
        .flatten()
        .into_iter()
        .filter_map(Feature::end)
        .max()
        .unwrap_or(0);

    seq.name = Some(record.id.clone());
    seq.topology = Topology::Linear;
    seq.molecule_type = Some("DNA".to_string());
    seq.accession = Some(record.id.clone());
    seq.len = Some(record.len().unwrap_or(extent) as usize);
    seq.seq = bases;

    let mut skipped = 0;
    for feature in record.flatten() {
        let Some((start, end)) = feature.location.span() else {
            warn!(
                "Feature {} has unreadable coordinates, not written to GenBank",
                feature.tag("ID")
            );
            skipped += 1;
            continue;
        };
        let mut location = GbLocation::simple_range(start as i64, end as i64);
        if feature.strand == Strand::Minus {
            location = GbLocation::Complement(Box::new(location));
        }
        let qualifiers: Vec<Qualifier> = feature
            .attributes
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |value| (Cow::Owned(key.to_string()), Some(value.clone())))
            })
            .collect();
        seq.features.push(GbFeature {
            kind: Cow::Owned(feature.kind.clone()),
            location,
            qualifiers,
        });
    }
    (seq, skipped)
}

fn write_genbank<W: Write>(records: &[Record], output: &mut W) -> Result<ConvertStats> {
    let mut stats = ConvertStats::default();
    let mut out = BufWriter::new(output);
    for record in records {
        let (seq, skipped) = record_to_genbank(record);
        stats.written += seq.features.len();
        stats.skipped += skipped;
        gb_io::writer::write(&mut out, &seq)?;
    }
    out.flush()?;
    Ok(stats)
}

/// Statistics for a convert run.
#[derive(Debug, Clone, Default)]
pub struct ConvertStats {
    /// Features (or documents) written
    pub written: usize,
    /// Features left out
    pub skipped: usize,
}

impl fmt::Display for ConvertStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Written: {}, Skipped: {}", self.written, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gff::parse_records;

    const INPUT: &str = "##gff-version 3\n\
        ctg1\tprokka\tgene\t2\t5\t.\t-\t.\tID=g1;Name=dnaA\n\
        ctg1\tprokka\tCDS\t2\t5\t.\t-\t0\tParent=g1\n\
        ##FASTA\n>ctg1\nAACCGGTT\n";

    fn convert(cmd: &ConvertCommand) -> (String, ConvertStats) {
        let records = parse_records(INPUT).unwrap();
        let mut output = Vec::new();
        let stats = cmd.convert_records(&records, &mut output).unwrap();
        (String::from_utf8(output).unwrap(), stats)
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("GenBank".parse::<ConvertFormat>().unwrap(), ConvertFormat::Genbank);
        assert!("xml".parse::<ConvertFormat>().is_err());
    }

    #[test]
    fn test_json_keyed_by_id_with_fallback() {
        let (out, stats) = convert(&ConvertCommand::new());
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(value["g1"]["start"], 2);
        assert_eq!(value["g1"]["attributes"]["Name"], json!(["dnaA"]));
        assert_eq!(value["CDS_ctg1:1-5"]["type"], "CDS");
    }

    #[test]
    fn test_json_custom_key() {
        let (out, _) = convert(&ConvertCommand::new().with_id_attribute("Name"));
        let value: Value = serde_json::from_str(&out).unwrap();
        assert!(value.get("dnaA").is_some());
    }

    #[test]
    fn test_fasta_minus_strand() {
        let cmd = ConvertCommand::new()
            .with_format(ConvertFormat::Fasta)
            .with_feature_types(vec!["gene".to_string()]);
        let (out, stats) = convert(&cmd);
        assert_eq!(out, ">g1\nCGGT\n");
        assert_eq!(stats.written, 1);
    }

    #[test]
    fn test_fasta_without_sequence_skips() {
        let records = parse_records("ctg1\t.\tgene\t1\t4\t.\t+\t.\tID=g1\n").unwrap();
        let mut output = Vec::new();
        let stats = ConvertCommand::new()
            .with_format(ConvertFormat::Fasta)
            .convert_records(&records, &mut output)
            .unwrap();
        assert!(output.is_empty());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_genbank_flattens_and_complements() {
        let records = parse_records(INPUT).unwrap();
        let (seq, skipped) = record_to_genbank(&records[0]);
        assert_eq!(skipped, 0);
        assert_eq!(seq.features.len(), 2);
        assert!(matches!(seq.features[0].location, GbLocation::Complement(_)));
        assert_eq!(seq.len, Some(8));

        let (out, _) = convert(&ConvertCommand::new().with_format(ConvertFormat::Genbank));
        assert!(out.starts_with("LOCUS"));
        assert!(out.contains("complement(2..5)"));
    }

    #[test]
    fn test_gff_rewrite_keeps_fasta() {
        let (out, _) = convert(&ConvertCommand::new().with_format(ConvertFormat::Gff));
        assert!(out.starts_with("##gff-version 3\n"));
        assert!(out.contains("##FASTA\n>ctg1\nAACCGGTT\n"));
    }

    #[test]
    fn test_store_output() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ConvertCommand::new()
            .with_format(ConvertFormat::Store)
            .with_store(dir.path(), "annotation_db", "Kp");
        let (out, stats) = convert(&cmd);
        assert!(out.is_empty());
        assert_eq!(stats.written, 2);

        let docs = DocumentStore::open(dir.path())
            .load_collection("annotation_db", "Kp")
            .unwrap();
        assert_eq!(docs[0].attribute_strings("ID"), vec!["g1"]);
    }
}

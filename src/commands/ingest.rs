//! Ingest command: attach tabular annotations to stored features.
//!
//! Each TSV line `locusName  Id  IdType  description` adds one
//! cross-reference object to the matching documents, under `Dbxref`, or
//! under `Ontology_term` when `IdType` is `GO`.

use crate::gff::{open_input, Result};
use crate::store::{DocumentStore, TypeIdIndex};
use log::{info, warn};
use serde_json::{Map, Value};
use std::io::BufRead;
use std::path::{Path, PathBuf};

const PROGRESS_EVERY: usize = 1000;
const GO_TAG: &str = "GO";

/// One parsed annotation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub locus: String,
    pub id: String,
    pub id_type: String,
    pub description: String,
}

impl Annotation {
    /// Split a tab-separated line; `None` unless it has exactly four columns.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
        let annotation = Self {
            locus: fields.next()?.to_string(),
            id: fields.next()?.to_string(),
            id_type: fields.next()?.to_string(),
            description: fields.next()?.to_string(),
        };
        if fields.next().is_some() {
            return None;
        }
        Some(annotation)
    }

    /// Attribute that receives this annotation.
    pub fn target_key(&self) -> &'static str {
        if self.id_type == GO_TAG {
            "Ontology_term"
        } else {
            "Dbxref"
        }
    }

    /// The cross-reference object; `Description` only when non-empty.
    pub fn to_entry(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("DBTAG".to_string(), Value::String(self.id_type.clone()));
        entry.insert("ID".to_string(), Value::String(self.id.clone()));
        if !self.description.is_empty() {
            entry.insert(
                "Description".to_string(),
                Value::String(self.description.clone()),
            );
        }
        Value::Object(entry)
    }
}

/// Ingest command configuration.
#[derive(Debug, Clone)]
pub struct IngestCommand {
    /// Feature type whose documents are annotated
    pub feature_type: String,
    pub db_name: String,
    pub collection: String,
    pub store_path: PathBuf,
    /// First line is a header
    pub has_header: bool,
}

impl Default for IngestCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestCommand {
    pub fn new() -> Self {
        Self {
            feature_type: "gene".to_string(),
            db_name: "annotation_db".to_string(),
            collection: "Genome".to_string(),
            store_path: PathBuf::from("./store"),
            has_header: true,
        }
    }

    pub fn with_feature_type(mut self, feature_type: impl Into<String>) -> Self {
        self.feature_type = feature_type.into();
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

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Ingest a TSV file (`None` or `-` for stdin, gzip accepted).
    pub fn run(&self, input: Option<&Path>) -> Result<IngestStats> {
        let reader = open_input(input)?;
        self.ingest(reader)
    }

    /// Ingest from any buffered reader and save the updated collection.
    pub fn ingest<R: BufRead>(&self, reader: R) -> Result<IngestStats> {
        let store = DocumentStore::open(&self.store_path);
        let mut documents = store.load_collection(&self.db_name, &self.collection)?;
        let index = TypeIdIndex::build(&documents);
        let mut stats = IngestStats::default();

        for (line_idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line_idx == 0 && self.has_header {
                continue;
            }
            if line_idx % PROGRESS_EVERY == 0 && line_idx > 0 {
                info!("Ingested {} lines", line_idx);
            }
            if line.trim().is_empty() {
                continue;
            }
            stats.lines += 1;

            let Some(annotation) = Annotation::parse(&line) else {
                warn!(
                    "Line {} does not have 4 tab-separated columns, skipping: {}",
                    line_idx + 1,
                    line
                );
                stats.malformed += 1;
                continue;
            };

            let targets = index.lookup(&self.feature_type, &annotation.locus);
            if targets.is_empty() {
                stats.unmatched += 1;
                continue;
            }
            let key = annotation.target_key();
            let entry = annotation.to_entry();
            for &i in targets {
                if documents[i].add_to_set(key, entry.clone()) {
                    stats.updated += 1;
                }
            }
        }

        store.save_collection(&self.db_name, &self.collection, &documents)?;
        info!("Ingest finished: {}", stats);
        Ok(stats)
    }
}

/// Statistics for an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Annotation lines read (header and blank lines excluded)
    pub lines: usize,
    /// Annotations added to documents
    pub updated: usize,
    /// Lines whose locus matched no document
    pub unmatched: usize,
    /// Lines without four columns
    pub malformed: usize,
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lines: {}, Updated: {}, Unmatched: {}, Malformed: {}",
            self.lines, self.updated, self.unmatched, self.malformed
        )
    }
}

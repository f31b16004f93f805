//! File-backed document store.
//!
//! Layout: `<root>/<db>/<collection>.json`, each collection a JSON array of
//! [`Document`]s. Saving goes through a temporary file in the same
//! directory followed by a rename, so readers never see a partial write.

use crate::feature::{Feature, Record};
use crate::gff::{GffError, Result};
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const COLLECTION_EXT: &str = "json";

/// One stored feature. Coordinates are 1-based, as in the GFF3 file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub seqid: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// `None` when the coordinate did not parse.
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub score: Option<String>,
    pub strand: String,
    pub phase: Option<String>,
    /// Attribute key -> array of values (strings, or objects added by ingest).
    pub attributes: Map<String, Value>,
}

impl Document {
    pub fn from_feature(feature: &Feature) -> Self {
        let span = feature.location.span();
        let attributes = feature
            .attributes
            .iter()
            .map(|(key, values)| {
                let values = values.iter().cloned().map(Value::String).collect();
                (key.to_string(), Value::Array(values))
            })
            .collect();

        Self {
            seqid: feature.seqid.clone(),
            source: feature.source.clone(),
            kind: feature.kind.clone(),
            start: span.map(|(s, _)| s + 1),
            end: span.map(|(_, e)| e),
            score: feature.score.clone(),
            strand: feature.strand.to_string(),
            phase: feature.phase.clone(),
            attributes,
        }
    }

    /// Every feature of every record, flattened, parents first.
    pub fn from_records(records: &[Record]) -> Vec<Self> {
        records
            .iter()
            .flat_map(Record::flatten)
            .map(Self::from_feature)
            .collect()
    }

    /// String values stored under `key`.
    pub fn attribute_strings(&self, key: &str) -> Vec<&str> {
        match self.attributes.get(key) {
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(value)) => vec![value.as_str()],
            _ => Vec::new(),
        }
    }

    /// Append `entry` to the array under `key` unless an equal entry exists.
    ///
    /// Returns whether the document changed.
    pub fn add_to_set(&mut self, key: &str, entry: Value) -> bool {
        let slot = self
            .attributes
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            let previous = slot.take();
            *slot = Value::Array(vec![previous]);
        }
        match slot {
            Value::Array(values) if !values.contains(&entry) => {
                values.push(entry);
                true
            }
            _ => false,
        }
    }
}

/// Lookup from `(type, ID value)` to document positions.
#[derive(Debug, Default)]
pub struct TypeIdIndex {
    map: FxHashMap<(String, String), Vec<usize>>,
}

impl TypeIdIndex {
    pub fn build(documents: &[Document]) -> Self {
        let mut map: FxHashMap<(String, String), Vec<usize>> = FxHashMap::default();
        for (i, doc) in documents.iter().enumerate() {
            for id in doc.attribute_strings("ID") {
                map.entry((doc.kind.clone(), id.to_string()))
                    .or_default()
                    .push(i);
            }
        }
        Self { map }
    }

    pub fn lookup(&self, kind: &str, id: &str) -> &[usize] {
        self.map
            .get(&(kind.to_string(), id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A directory of databases, each a directory of collections.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, db: &str, collection: &str) -> PathBuf {
        self.root
            .join(db)
            .join(format!("{}.{}", collection, COLLECTION_EXT))
    }

    /// Database names, sorted. A missing store has none.
    pub fn list_dbs(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut dbs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dbs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dbs.sort();
        Ok(dbs)
    }

    /// Collection names of `db`, sorted.
    pub fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        let dir = self.root.join(db);
        if !dir.is_dir() {
            return Err(GffError::InvalidFormat(format!(
                "Database '{}' not found in {}",
                db,
                self.root.display()
            )));
        }
        let mut collections = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == COLLECTION_EXT) {
                if let Some(stem) = path.file_stem() {
                    collections.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        collections.sort();
        Ok(collections)
    }

    pub fn contains(&self, db: &str, collection: &str) -> bool {
        self.collection_path(db, collection).is_file()
    }

    pub fn load_collection(&self, db: &str, collection: &str) -> Result<Vec<Document>> {
        let path = self.collection_path(db, collection);
        if !path.is_file() {
            return Err(GffError::InvalidFormat(format!(
                "Collection '{}' not found in database '{}'",
                collection, db
            )));
        }
        let documents: Vec<Document> = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        debug!("Loaded {} documents from {}", documents.len(), path.display());
        Ok(documents)
    }

    /// Replace a collection, creating the database if needed.
    pub fn save_collection(
        &self,
        db: &str,
        collection: &str,
        documents: &[Document],
    ) -> Result<()> {
        let dir = self.root.join(db);
        fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, documents)?;
            writer.flush()?;
        }
        let path = self.collection_path(db, collection);
        tmp.persist(&path).map_err(|e| GffError::Io(e.error))?;

        debug!("Saved {} documents to {}", documents.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Strand;
    use serde_json::json;

    fn gene() -> Feature {
        Feature::new("ctg1", "gene", 9, 50)
            .with_strand(Strand::Plus)
            .with_attribute("ID", "g1")
            .with_child(Feature::new("ctg1", "CDS", 9, 50).with_attribute("ID", "c1"))
    }

    #[test]
    fn test_document_from_feature() {
        let doc = Document::from_feature(&gene());
        assert_eq!(doc.kind, "gene");
        assert_eq!(doc.start, Some(10));
        assert_eq!(doc.end, Some(50));
        assert_eq!(doc.strand, "+");
        assert_eq!(doc.attributes["ID"], json!(["g1"]));
    }

    #[test]
    fn test_from_records_flattens() {
        let record = Record::new("ctg1").with_features(vec![gene()]);
        let docs = Document::from_records(&[record]);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].kind, "CDS");
    }

    #[test]
    fn test_add_to_set_is_idempotent() {
        let mut doc = Document::from_feature(&gene());
        let entry = json!({"DBTAG": "KEGG", "ID": "K1"});
        assert!(doc.add_to_set("Dbxref", entry.clone()));
        assert!(!doc.add_to_set("Dbxref", entry));
        assert_eq!(doc.attributes["Dbxref"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_index_lookup() {
        let record = Record::new("ctg1").with_features(vec![gene()]);
        let docs = Document::from_records(&[record]);
        let index = TypeIdIndex::build(&docs);
        assert_eq!(index.lookup("gene", "g1"), &[0]);
        assert_eq!(index.lookup("CDS", "c1"), &[1]);
        assert!(index.lookup("gene", "c1").is_empty());
    }

    #[test]
    fn test_save_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path());
        assert!(store.list_dbs().unwrap().is_empty());

        let docs = vec![Document::from_feature(&gene())];
        store.save_collection("annotation_db", "Kp", &docs).unwrap();
        store.save_collection("annotation_db", "Ec", &[]).unwrap();

        assert_eq!(store.list_dbs().unwrap(), vec!["annotation_db"]);
        assert_eq!(store.list_collections("annotation_db").unwrap(), vec!["Ec", "Kp"]);
        assert_eq!(store.load_collection("annotation_db", "Kp").unwrap(), docs);
        assert!(store.list_collections("missing").is_err());
        assert!(store.load_collection("annotation_db", "missing").is_err());
    }
}

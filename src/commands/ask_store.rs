//! Ask-store command: list databases or collections.

use crate::gff::Result;
use crate::store::DocumentStore;
use std::io::Write;
use std::path::PathBuf;

/// What to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreQuery {
    Databases,
    Collections(String),
}

#[derive(Debug, Clone)]
pub struct AskStoreCommand {
    pub store_path: PathBuf,
    pub query: StoreQuery,
}

impl AskStoreCommand {
    pub fn new(store_path: impl Into<PathBuf>, query: StoreQuery) -> Self {
        Self {
            store_path: store_path.into(),
            query,
        }
    }

    /// Print one name per line and return the names.
    pub fn run<W: Write>(&self, output: &mut W) -> Result<Vec<String>> {
        let store = DocumentStore::open(&self.store_path);
        let names = match &self.query {
            StoreQuery::Databases => store.list_dbs()?,
            StoreQuery::Collections(db) => store.list_collections(db)?,
        };
        for name in &names {
            writeln!(output, "{}", name)?;
        }
        output.flush()?;
        Ok(names)
    }
}

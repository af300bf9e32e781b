//! JSON file store.
//!
//! The whole store is one JSON array of tagged records, rewritten after
//! every mutation (temp file, then rename). A scale holds a few thousand
//! small records, so a full rewrite stays cheap.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::provider::{DataProvider, MemoryProvider, Record, RecordKind};
use crate::error::{Result, ScaleError};

#[derive(Debug)]
pub struct JsonFileProvider {
    path: PathBuf,
    inner: MemoryProvider,
}

impl JsonFileProvider {
    /// Load `path`, or start empty when it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| {
                ScaleError::Config(format!("cannot read store {}: {}", path.display(), e))
            })?;
            let records: Vec<Record> = serde_json::from_str(&text)?;
            info!(path = %path.display(), records = records.len(), "store loaded");
            MemoryProvider::from_records(records)
        } else {
            info!(path = %path.display(), "new store");
            MemoryProvider::new()
        };
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy and keep it only once the file is written.
    fn commit<T>(&mut self, change: impl FnOnce(&mut MemoryProvider) -> Result<T>) -> Result<T> {
        let mut next = self.inner.clone();
        let out = change(&mut next)?;
        self.save(&next)?;
        self.inner = next;
        Ok(out)
    }

    fn save(&self, snapshot: &MemoryProvider) -> Result<()> {
        let records: Vec<&Record> = snapshot.records().collect();
        let json = serde_json::to_string_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), records = records.len(), "store saved");
        Ok(())
    }
}

impl DataProvider for JsonFileProvider {
    fn get(&self, kind: RecordKind, id: u32) -> Result<Option<Record>> {
        self.inner.get(kind, id)
    }

    fn put(&mut self, record: Record) -> Result<()> {
        self.commit(|next| next.put(record))
    }

    fn delete(&mut self, kind: RecordKind, id: u32) -> Result<bool> {
        if self.inner.get(kind, id)?.is_none() {
            return Ok(false);
        }
        self.commit(|next| next.delete(kind, id))
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<Record>> {
        self.inner.list(kind)
    }
}

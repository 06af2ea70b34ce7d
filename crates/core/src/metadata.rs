//! C8 — FileMetadataStore: per-namespace record of each indexed file's
//! mtime, size, content hash, and chunk ids, persisted as one JSON document
//! per namespace under the data directory. Backs the change-detection gate
//! in `incremental.rs` (§4.8).

use crate::error::CoreResult;
use crate::model::FileEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct MetadataFile {
    files: HashMap<String, FileEntry>,
}

pub struct FileMetadataStore {
    path: PathBuf,
}

impl FileMetadataStore {
    pub fn for_namespace(namespace: &str) -> Self {
        Self { path: crate::paths::data_dir().join("metadata").join(format!("{namespace}.json")) }
    }

    #[cfg(test)]
    fn at(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> MetadataFile {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save(&self, file: &MetadataFile) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(file)?;
        crate::paths::atomic_write(&self.path, &content)?;
        Ok(())
    }

    pub fn get(&self, rel_path: &str) -> Option<FileEntry> {
        self.load().files.get(rel_path).cloned()
    }

    pub fn all(&self) -> HashMap<String, FileEntry> {
        self.load().files
    }

    pub fn upsert(&self, rel_path: &str, entry: FileEntry) -> CoreResult<()> {
        let mut file = self.load();
        file.files.insert(rel_path.to_string(), entry);
        self.save(&file)
    }

    pub fn remove(&self, rel_path: &str) -> CoreResult<()> {
        let mut file = self.load();
        file.files.remove(rel_path);
        self.save(&file)
    }

    /// Replace the entire store (used after a full reindex).
    pub fn replace_all(&self, files: HashMap<String, FileEntry>) -> CoreResult<()> {
        self.save(&MetadataFile { files })
    }

    /// Drop the store entirely (used by `clear_index`).
    pub fn clear(&self) -> CoreResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;

    fn sample_entry() -> FileEntry {
        FileEntry {
            mtime: Utc::now(),
            size: 42,
            content_hash: "abc123".into(),
            chunk_ids: HashSet::new(),
        }
    }

    #[test]
    fn round_trips_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMetadataStore::at(dir.path().join("ns.json"));
        store.upsert("src/lib.rs", sample_entry()).unwrap();
        let entry = store.get("src/lib.rs").unwrap();
        assert_eq!(entry.content_hash, "abc123");
    }

    #[test]
    fn remove_drops_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMetadataStore::at(dir.path().join("ns.json"));
        store.upsert("a.rs", sample_entry()).unwrap();
        store.upsert("b.rs", sample_entry()).unwrap();
        store.remove("a.rs").unwrap();
        assert!(store.get("a.rs").is_none());
        assert!(store.get("b.rs").is_some());
    }

    #[test]
    fn clear_deletes_the_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ns.json");
        let store = FileMetadataStore::at(path.clone());
        store.upsert("a.rs", sample_entry()).unwrap();
        assert!(path.exists());
        store.clear().unwrap();
        assert!(!path.exists());
    }
}

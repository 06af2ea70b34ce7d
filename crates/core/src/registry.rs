//! C7 — NamespaceRegistry: maps codebase roots to their vector-store
//! namespace, persisted as a single JSON document under the tool's data
//! directory (`~/.codex-context/registry.json`), read-modify-write in the
//! style of the teacher's `package.json` sniffing in `init.rs` — plain
//! `fs::read_to_string` + `serde_json::from_str` on load, defaulting on any
//! failure rather than treating a missing or corrupt file as fatal. Writes go
//! through `paths::atomic_write` so a crash mid-save never leaves a
//! half-written registry behind.

use crate::error::CoreResult;
use crate::model::generate_namespace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const REGISTRY_FILE: &str = "registry.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    /// canonical codebase path (as string) -> namespace id
    entries: HashMap<String, String>,
}

pub struct NamespaceRegistry {
    path: PathBuf,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self { path: crate::paths::data_dir().join(REGISTRY_FILE) }
    }

    #[cfg(test)]
    fn at(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> RegistryFile {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save(&self, file: &RegistryFile) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(file)?;
        crate::paths::atomic_write(&self.path, &content)?;
        Ok(())
    }

    /// Return the namespace for `canonical_path`, creating and persisting a
    /// new entry if one doesn't already exist (I3: a codebase's namespace id
    /// is stable across repeated calls once assigned).
    pub fn namespace_for(&self, canonical_path: &Path) -> CoreResult<String> {
        let key = canonical_path.to_string_lossy().to_string();
        let mut file = self.load();
        if let Some(ns) = file.entries.get(&key) {
            return Ok(ns.clone());
        }
        let ns = generate_namespace(canonical_path);
        file.entries.insert(key, ns.clone());
        self.save(&file)?;
        Ok(ns)
    }

    /// Look up an existing namespace without creating one.
    pub fn lookup(&self, canonical_path: &Path) -> Option<String> {
        self.load().entries.get(&canonical_path.to_string_lossy().to_string()).cloned()
    }

    /// Remove a codebase's registry entry (used by `clear_index`).
    pub fn remove(&self, canonical_path: &Path) -> CoreResult<()> {
        let key = canonical_path.to_string_lossy().to_string();
        let mut file = self.load();
        file.entries.remove(&key);
        self.save(&file)
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let registry = NamespaceRegistry::at(dir.path().join("registry.json"));
        let root = Path::new("/repo/my-project");
        let ns1 = registry.namespace_for(root).unwrap();
        let ns2 = registry.namespace_for(root).unwrap();
        assert_eq!(ns1, ns2);
    }

    #[test]
    fn different_roots_get_different_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let registry = NamespaceRegistry::at(dir.path().join("registry.json"));
        let ns1 = registry.namespace_for(Path::new("/repo/a")).unwrap();
        let ns2 = registry.namespace_for(Path::new("/repo/b")).unwrap();
        assert_ne!(ns1, ns2);
    }

    #[test]
    fn remove_drops_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = NamespaceRegistry::at(dir.path().join("registry.json"));
        let root = Path::new("/repo/my-project");
        registry.namespace_for(root).unwrap();
        registry.remove(root).unwrap();
        assert!(registry.lookup(root).is_none());
    }

    #[test]
    fn missing_file_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = NamespaceRegistry::at(dir.path().join("nonexistent.json"));
        assert!(registry.lookup(Path::new("/repo/x")).is_none());
    }
}

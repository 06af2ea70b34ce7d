//! End-to-end pipeline test: full index, search, incremental re-sync, and
//! clear, wired together the same way `AppContext` composes them — against
//! fake embedder/vector-store collaborators so the suite never needs network
//! credentials.

use codex_context_core::config::IndexConfig;
use codex_context_core::embedder::Embedder;
use codex_context_core::error::CoreResult;
use codex_context_core::incremental::run_incremental_sync;
use codex_context_core::orchestrator::run_full_index;
use codex_context_core::search::{search, SearchOptions};
use codex_context_core::vectorstore::{HybridHit, VectorRecord, VectorStore};
use std::collections::HashMap;
use std::sync::Mutex;

struct WordCountEmbedder;

impl Embedder for WordCountEmbedder {
    fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.split_whitespace().count() as f32]).collect())
    }
    fn max_input_chars(&self) -> usize {
        8000
    }
}

/// An in-memory stand-in for Turbopuffer: keyed by namespace, stores every
/// upserted record and does a trivial substring-match "search" so the test
/// can assert on ranking without a real hybrid-query backend.
#[derive(Default)]
struct InMemoryStore {
    namespaces: Mutex<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl VectorStore for InMemoryStore {
    fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> CoreResult<()> {
        let mut guard = self.namespaces.lock().unwrap();
        let ns = guard.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.chunk.id.clone(), record.clone());
        }
        Ok(())
    }

    fn delete(&self, namespace: &str, chunk_ids: &[String]) -> CoreResult<()> {
        let mut guard = self.namespaces.lock().unwrap();
        if let Some(ns) = guard.get_mut(namespace) {
            for id in chunk_ids {
                ns.remove(id);
            }
        }
        Ok(())
    }

    fn hybrid_search(
        &self,
        namespace: &str,
        query_text: &str,
        _query_embedding: &[f32],
        top_k: usize,
        _vector_weight: f32,
        _bm25_weight: f32,
    ) -> CoreResult<Vec<HybridHit>> {
        let guard = self.namespaces.lock().unwrap();
        let Some(ns) = guard.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<HybridHit> = ns
            .values()
            .filter(|r| r.chunk.content.contains(query_text))
            .map(|r| HybridHit { chunk: r.chunk.clone(), score: 1.0 })
            .collect();
        hits.sort_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn delete_namespace(&self, namespace: &str) -> CoreResult<()> {
        self.namespaces.lock().unwrap().remove(namespace);
        Ok(())
    }

    fn namespace_exists(&self, namespace: &str) -> CoreResult<bool> {
        Ok(self.namespaces.lock().unwrap().get(namespace).is_some_and(|ns| !ns.is_empty()))
    }
}

fn isolated_data_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("CODEX_CONTEXT_DATA_DIR", dir.path());
    dir
}

#[test]
fn full_index_then_search_finds_the_right_chunk() {
    let _data_dir = isolated_data_dir();
    let codebase = tempfile::tempdir().unwrap();
    std::fs::write(
        codebase.path().join("greeter.rs"),
        "pub fn greet(name: &str) -> String {\n    format!(\"hello {name}\")\n}\n",
    )
    .unwrap();
    std::fs::write(
        codebase.path().join("math.rs"),
        "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
    )
    .unwrap();

    let config = IndexConfig::default();
    let embedder = WordCountEmbedder;
    let store = InMemoryStore::default();

    let report = run_full_index(codebase.path(), "mcp_pipeline_a", &config, &embedder, &store).unwrap();
    assert_eq!(report.files_indexed, 2);
    assert!(report.errors.is_empty());

    let options = SearchOptions { top_k: 5, vector_weight: 0.6, bm25_weight: 0.4, rerank: false };
    let hits = search(
        codebase.path(),
        "mcp_pipeline_a",
        "format!(\"hello",
        &options,
        &config,
        &embedder,
        &store,
        None,
    )
    .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].file_path.ends_with("greeter.rs"));
}

#[test]
fn incremental_sync_picks_up_edits_and_deletions() {
    let _data_dir = isolated_data_dir();
    let codebase = tempfile::tempdir().unwrap();
    let greeter_path = codebase.path().join("greeter.rs");
    std::fs::write(&greeter_path, "pub fn greet() -> &'static str {\n    \"hi\"\n}\n").unwrap();

    let config = IndexConfig::default();
    let embedder = WordCountEmbedder;
    let store = InMemoryStore::default();

    run_full_index(codebase.path(), "mcp_pipeline_b", &config, &embedder, &store).unwrap();

    // mtime-based change detection needs the second write to look newer.
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(&greeter_path, "pub fn greet() -> &'static str {\n    \"hello there\"\n}\n").unwrap();

    let sync_report =
        run_incremental_sync(codebase.path(), "mcp_pipeline_b", &config, &embedder, &store, None).unwrap();
    assert_eq!(sync_report.updated, 1);

    let options = SearchOptions { top_k: 5, vector_weight: 0.6, bm25_weight: 0.4, rerank: false };
    let hits = search(
        codebase.path(),
        "mcp_pipeline_b",
        "hello there",
        &options,
        &config,
        &embedder,
        &store,
        None,
    )
    .unwrap();
    assert_eq!(hits.len(), 1);

    std::fs::remove_file(&greeter_path).unwrap();
    let removal_report =
        run_incremental_sync(codebase.path(), "mcp_pipeline_b", &config, &embedder, &store, None).unwrap();
    assert_eq!(removal_report.removed, 1);

    let hits_after_removal = search(
        codebase.path(),
        "mcp_pipeline_b",
        "hello there",
        &options,
        &config,
        &embedder,
        &store,
        None,
    )
    .unwrap();
    assert!(hits_after_removal.is_empty());
}

#[test]
fn clear_namespace_empties_the_store() {
    let _data_dir = isolated_data_dir();
    let codebase = tempfile::tempdir().unwrap();
    std::fs::write(codebase.path().join("a.rs"), "pub fn a() {}\n").unwrap();

    let config = IndexConfig::default();
    let embedder = WordCountEmbedder;
    let store = InMemoryStore::default();

    run_full_index(codebase.path(), "mcp_pipeline_c", &config, &embedder, &store).unwrap();
    assert!(store.namespace_exists("mcp_pipeline_c").unwrap());

    store.delete_namespace("mcp_pipeline_c").unwrap();
    assert!(!store.namespace_exists("mcp_pipeline_c").unwrap());
}

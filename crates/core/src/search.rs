//! C12 — SearchCoordinator: runs a hybrid dense+BM25 query against a
//! codebase's namespace, optionally reranks the candidate set, and
//! enriches each hit with "connection context" — the file's imports,
//! exports, and related modules — so a caller sees more than an isolated
//! snippet.

use crate::config::IndexConfig;
use crate::embedder::Embedder;
use crate::error::CoreResult;
use crate::incremental::run_incremental_sync;
use crate::model::{Import, Symbol};
use crate::reranker::Reranker;
use crate::symbols;
use crate::vectorstore::{HybridHit, VectorStore};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Connections {
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    #[serde(rename = "relatedFiles")]
    pub related_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(rename = "chunkId")]
    pub chunk_id: String,
    pub content: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "relativePath")]
    pub relative_path: String,
    #[serde(rename = "startLine")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
    pub language: String,
    pub score: f32,
    #[serde(rename = "originalScore", skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranked: Option<bool>,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
    pub connections: Connections,
}

pub struct SearchOptions {
    pub top_k: usize,
    pub vector_weight: f32,
    pub bm25_weight: f32,
    pub rerank: bool,
}

impl SearchOptions {
    pub fn from_config(config: &IndexConfig, top_k: usize, rerank: bool) -> Self {
        Self {
            top_k,
            vector_weight: config.default_vector_weight,
            bm25_weight: config.default_bm25_weight,
            rerank,
        }
    }
}

/// Run a search (spec §4.12). Before querying, performs a best-effort
/// incremental sync of `codebase_root` into `namespace` — a failure there is
/// logged and does not block the query, since stale results still beat no
/// results.
#[allow(clippy::too_many_arguments)]
pub fn search(
    codebase_root: &Path,
    namespace: &str,
    query: &str,
    options: &SearchOptions,
    config: &IndexConfig,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    reranker: Option<&dyn Reranker>,
) -> CoreResult<Vec<SearchHit>> {
    if let Err(e) = run_incremental_sync(codebase_root, namespace, config, embedder, store, None) {
        tracing::warn!(namespace, error = %e, "best-effort incremental sync before search failed, querying stale index");
    }

    let query_embedding = embedder.embed(query)?;

    // Over-fetch before reranking so the reranker has a real candidate pool
    // to work with, not just the final top_k.
    let fetch_k = if options.rerank { (options.top_k * 2).max(options.top_k) } else { options.top_k };

    let mut hits: Vec<HybridHit> = store.hybrid_search(
        namespace,
        query,
        &query_embedding,
        fetch_k,
        options.vector_weight,
        options.bm25_weight,
    )?;

    let mut reranked_scores: Vec<Option<f32>> = vec![None; hits.len()];

    if let (true, Some(reranker)) = (options.rerank, reranker) {
        let documents: Vec<String> = hits.iter().map(rerank_document).collect();
        let ranked = reranker.rerank(query, &documents)?;
        let mut reordered = Vec::with_capacity(ranked.len());
        let mut reordered_scores = Vec::with_capacity(ranked.len());
        for (idx, score) in ranked {
            if let Some(hit) = hits.get(idx) {
                reordered.push(hit.clone());
                reordered_scores.push(Some(score));
            }
        }
        hits = reordered;
        reranked_scores = reordered_scores;
    }

    hits.truncate(options.top_k);
    reranked_scores.truncate(options.top_k);

    Ok(hits
        .into_iter()
        .zip(reranked_scores)
        .map(|(hit, reranked_score)| build_search_hit(hit, reranked_score))
        .collect())
}

/// The reranker scores the concatenation of a hit's location, symbols, and
/// content — not raw content alone — so a cross-encoder sees the same
/// identifying context a human reading a search result would.
fn rerank_document(hit: &HybridHit) -> String {
    let symbols = hit.chunk.symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(",");
    format!(
        "{}:{}-{}\n{}\n{}",
        hit.chunk.file_path, hit.chunk.start_line, hit.chunk.end_line, symbols, hit.chunk.content
    )
}

fn build_search_hit(hit: HybridHit, reranked_score: Option<f32>) -> SearchHit {
    let connections = build_connections(&hit.chunk.file_path, hit.chunk.start_line, hit.chunk.end_line);
    let symbols = if connections.symbols_from_reparse.is_empty() {
        hit.chunk.symbols
    } else {
        connections.symbols_from_reparse
    };

    let (score, original_score, reranked) = match reranked_score {
        Some(new_score) => (new_score, Some(hit.score), Some(true)),
        None => (hit.score, None, None),
    };

    SearchHit {
        chunk_id: hit.chunk.id,
        content: hit.chunk.content,
        file_path: hit.chunk.file_path,
        relative_path: hit.chunk.relative_path,
        start_line: hit.chunk.start_line,
        end_line: hit.chunk.end_line,
        language: hit.chunk.language,
        score,
        original_score,
        reranked,
        symbols,
        imports: hit.chunk.imports,
        connections: connections.into(),
    }
}

/// Intermediate result of re-parsing a hit's file from disk: both the
/// connection-context shape and, when the re-parse succeeded, the precise
/// symbols overlapping the hit's line range (more accurate than whatever the
/// vector store round-tripped, which only carries symbol names).
struct ConnectionBuild {
    imports: Vec<String>,
    exports: Vec<String>,
    related_files: Vec<String>,
    symbols_from_reparse: Vec<Symbol>,
}

impl From<ConnectionBuild> for Connections {
    fn from(c: ConnectionBuild) -> Self {
        Connections { imports: c.imports, exports: c.exports, related_files: c.related_files }
    }
}

/// Re-parse the hit's source file (§4.12 step 6) to build its connection
/// context. Best-effort: if the file can no longer be read (deleted, moved,
/// permissions), returns an empty shape rather than failing the whole search.
fn build_connections(file_path: &str, start_line: usize, end_line: usize) -> ConnectionBuild {
    let path = Path::new(file_path);
    let Ok(content) = std::fs::read_to_string(path) else {
        return ConnectionBuild {
            imports: Vec::new(),
            exports: Vec::new(),
            related_files: Vec::new(),
            symbols_from_reparse: Vec::new(),
        };
    };
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let ast = symbols::extract(&content, ext);

    let imports: Vec<String> = ast.imports.iter().map(|i| i.module.clone()).collect();
    let related_files: Vec<String> = imports.iter().cloned().collect::<HashSet<_>>().into_iter().collect();
    let symbols_from_reparse =
        ast.symbols.iter().filter(|s| s.overlaps(start_line, end_line)).cloned().collect();

    ConnectionBuild { imports, exports: ast.exports, related_files, symbols_from_reparse }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chunk;

    struct FakeEmbedder;
    impl Embedder for FakeEmbedder {
        fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2]).collect())
        }
        fn max_input_chars(&self) -> usize {
            8000
        }
    }

    struct FakeStore;
    impl VectorStore for FakeStore {
        fn upsert(&self, _namespace: &str, _records: &[crate::vectorstore::VectorRecord]) -> CoreResult<()> {
            Ok(())
        }
        fn delete(&self, _namespace: &str, _chunk_ids: &[String]) -> CoreResult<()> {
            Ok(())
        }
        fn hybrid_search(
            &self,
            _namespace: &str,
            _query_text: &str,
            _query_embedding: &[f32],
            top_k: usize,
            _vector_weight: f32,
            _bm25_weight: f32,
        ) -> CoreResult<Vec<HybridHit>> {
            let chunk = Chunk {
                id: "chunk_1".into(),
                content: "pub fn a() {}".into(),
                file_path: "/nonexistent/a.rs".into(),
                relative_path: "a.rs".into(),
                start_line: 1,
                end_line: 1,
                language: "rust".into(),
                symbols: Vec::new(),
                imports: Vec::new(),
                exports: vec!["a".into()],
            };
            Ok(vec![HybridHit { chunk, score: 0.9 }].into_iter().cycle().take(top_k.min(3)).collect())
        }
        fn delete_namespace(&self, _namespace: &str) -> CoreResult<()> {
            Ok(())
        }
        fn namespace_exists(&self, _namespace: &str) -> CoreResult<bool> {
            Ok(true)
        }
    }

    struct IdentityReranker;
    impl Reranker for IdentityReranker {
        fn rerank(&self, _query: &str, documents: &[String]) -> CoreResult<Vec<(usize, f32)>> {
            Ok((0..documents.len()).map(|i| (i, 0.42)).collect())
        }
    }

    #[test]
    fn search_returns_hits_with_connections() {
        std::env::set_var("CODEX_CONTEXT_DATA_DIR", tempfile::tempdir().unwrap().path());
        let root = tempfile::tempdir().unwrap();
        let options = SearchOptions { top_k: 2, vector_weight: 0.6, bm25_weight: 0.4, rerank: false };
        let config = IndexConfig::default();
        let hits = search(
            root.path(),
            "mcp_test",
            "greet function",
            &options,
            &config,
            &FakeEmbedder,
            &FakeStore,
            None,
        )
        .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].original_score.is_none());
        assert!(hits[0].reranked.is_none());
        // The hit's file doesn't exist on disk, so re-parse fails gracefully
        // and connections come back empty rather than erroring the search.
        assert!(hits[0].connections.imports.is_empty());
    }

    #[test]
    fn connections_are_populated_by_re_parsing_the_hit_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("logger.rs");
        std::fs::write(&file_path, "use std::fmt;\n\npub struct Logger {}\n").unwrap();
        let build = build_connections(&file_path.to_string_lossy(), 3, 3);
        assert_eq!(build.imports, vec!["std::fmt".to_string()]);
        assert_eq!(build.exports, vec!["Logger".to_string()]);
        assert_eq!(build.symbols_from_reparse[0].name, "Logger");
    }

    #[test]
    fn reranking_preserves_original_score_and_marks_reranked() {
        std::env::set_var("CODEX_CONTEXT_DATA_DIR", tempfile::tempdir().unwrap().path());
        let root = tempfile::tempdir().unwrap();
        let options = SearchOptions { top_k: 2, vector_weight: 0.6, bm25_weight: 0.4, rerank: true };
        let config = IndexConfig::default();
        let hits = search(
            root.path(),
            "mcp_test",
            "greet function",
            &options,
            &config,
            &FakeEmbedder,
            &FakeStore,
            Some(&IdentityReranker),
        )
        .unwrap();
        assert_eq!(hits[0].score, 0.42);
        assert_eq!(hits[0].original_score, Some(0.9));
        assert_eq!(hits[0].reranked, Some(true));
    }
}

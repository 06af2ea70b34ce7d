//! C10 — IndexingOrchestrator: the full-reindex batch pipeline. Walks a
//! codebase end to end — discover, filter, parse, chunk, sub-chunk, embed,
//! upsert — and produces an [`IndexReport`] that never aborts the whole run
//! over a single bad file; every per-file failure is captured as a
//! [`FileError`] and the run continues (§7's non-fatal-error policy).

use crate::chunk::extract_chunks;
use crate::config::IndexConfig;
use crate::discover::{discover, extensions_for_languages};
use crate::embedder::Embedder;
use crate::error::{CoreResult, FileError};
use crate::filter::should_include;
use crate::language::detect;
use crate::metadata::FileMetadataStore;
use crate::model::{content_hash, Chunk, FileEntry};
use crate::subchunk::subchunk;
use crate::symbols;
use crate::vectorstore::{VectorRecord, VectorStore};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

const EMBED_BATCH_SIZE: usize = 64;
const MAX_BATCH_RETRIES: usize = 2;
const RETRY_BASE_DELAY_MS: u64 = 100;

#[derive(Debug, Default, Serialize)]
pub struct IndexReport {
    pub success: bool,
    pub namespace: String,
    #[serde(rename = "filesIndexed")]
    pub files_indexed: usize,
    #[serde(rename = "filesSkipped")]
    pub files_skipped: usize,
    #[serde(rename = "chunksCreated")]
    pub chunks_created: usize,
    #[serde(rename = "totalSymbols")]
    pub total_symbols: usize,
    pub errors: Vec<FileError>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

/// Run a full reindex of `codebase_root` into `namespace`. Replaces the
/// namespace's entire vector-store contents and metadata-store state.
pub fn run_full_index(
    codebase_root: &Path,
    namespace: &str,
    config: &IndexConfig,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
) -> CoreResult<IndexReport> {
    let start = Instant::now();
    let mut report = IndexReport { namespace: namespace.to_string(), ..IndexReport::default() };

    let extensions = extensions_for_languages(&config.supported_languages);
    let discovered = discover(codebase_root, &extensions);

    struct FileResult {
        rel_path: String,
        chunks: Vec<Chunk>,
        entry: FileEntry,
        symbol_count: usize,
    }

    let results: Vec<Result<Option<FileResult>, FileError>> = discovered
        .par_iter()
        .map(|file| -> Result<Option<FileResult>, FileError> {
            let to_err = |e: std::io::Error| FileError { file: file.rel_path.clone(), error: e.to_string() };
            let content = std::fs::read_to_string(&file.abs_path).map_err(to_err)?;

            let decision = should_include(&file.rel_path, &content, config.content_size_cap);
            if !decision.include {
                return Ok(None);
            }

            let detection = detect(&file.abs_path, Some(&content[..content.len().min(200)]));
            let ast = symbols::extract(&content, &detection.extension);
            let file_path = file.abs_path.to_string_lossy().to_string();
            let chunks: Vec<Chunk> = extract_chunks(
                &file_path,
                &file.rel_path,
                &detection.language,
                &content,
                &ast,
                config.max_chunk_chars,
            )
            .into_iter()
            .flat_map(|c| subchunk(c, config.max_chunk_chars))
            .collect();

            let entry = FileEntry {
                mtime: std::fs::metadata(&file.abs_path)
                    .and_then(|m| m.modified())
                    .map(chrono::DateTime::<chrono::Utc>::from)
                    .unwrap_or_else(|_| chrono::Utc::now()),
                size: content.len() as u64,
                content_hash: content_hash(&content),
                chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
            };

            Ok(Some(FileResult {
                rel_path: file.rel_path.clone(),
                chunks,
                entry,
                symbol_count: ast.symbols.len(),
            }))
        })
        .collect();

    let mut all_chunks = Vec::new();
    let mut file_entries: HashMap<String, FileEntry> = HashMap::new();

    for result in results {
        match result {
            Ok(Some(fr)) => {
                report.files_indexed += 1;
                report.chunks_created += fr.chunks.len();
                report.total_symbols += fr.symbol_count;
                file_entries.insert(fr.rel_path, fr.entry);
                all_chunks.extend(fr.chunks);
            }
            Ok(None) => report.files_skipped += 1,
            Err(e) => report.errors.push(e),
        }
    }

    // A stale namespace that fails to clear is a warning, not an abort (§4.10
    // step 4): the run continues and simply upserts on top of what's there.
    if let Err(e) = store.delete_namespace(namespace) {
        tracing::warn!(namespace, error = %e, "failed to clear existing namespace before reindex");
    }
    embed_and_upsert(&all_chunks, namespace, embedder, store, &mut report.errors);

    let metadata_store = FileMetadataStore::for_namespace(namespace);
    metadata_store.replace_all(file_entries)?;

    report.duration_ms = start.elapsed().as_millis() as u64;
    report.success = report.errors.is_empty();
    Ok(report)
}

/// Embed and upsert `chunks` in fixed-size batches. A batch that fails is
/// retried up to [`MAX_BATCH_RETRIES`] times before being skipped outright;
/// skipped chunks are tallied into `errors` rather than aborting the run.
fn embed_and_upsert(
    chunks: &[Chunk],
    namespace: &str,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    errors: &mut Vec<FileError>,
) {
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

        let mut attempt = 0;
        let embeddings = loop {
            match embedder.embed_batch(&texts) {
                Ok(e) => break Some(e),
                Err(e) if attempt < MAX_BATCH_RETRIES => {
                    tracing::warn!(attempt, error = %e, "embedding batch failed, retrying");
                    std::thread::sleep(backoff_delay(attempt));
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, batch_size = batch.len(), "embedding batch failed, skipping");
                    for chunk in batch {
                        errors.push(FileError {
                            file: chunk.relative_path.clone(),
                            error: format!("embedding failed: {e}"),
                        });
                    }
                    break None;
                }
            }
        };

        let Some(embeddings) = embeddings else { continue };

        let records: Vec<VectorRecord> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord { chunk, embedding })
            .collect();

        let mut attempt = 0;
        loop {
            match store.upsert(namespace, &records) {
                Ok(()) => break,
                Err(e) if attempt < MAX_BATCH_RETRIES => {
                    tracing::warn!(attempt, error = %e, "vector store upsert failed, retrying");
                    std::thread::sleep(backoff_delay(attempt));
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, batch_size = records.len(), "vector store upsert failed, skipping batch");
                    for record in &records {
                        errors.push(FileError {
                            file: record.chunk.relative_path.clone(),
                            error: format!("vector store upsert failed: {e}"),
                        });
                    }
                    break;
                }
            }
        }
    }
}

/// Exponential backoff delay before retry attempt `attempt` (0-based).
fn backoff_delay(attempt: usize) -> Duration {
    Duration::from_millis(RETRY_BASE_DELAY_MS * (1u64 << attempt))
}

/// The set of relative paths this index run touched, used by C11 to decide
/// whether a file that disappeared from disk should be dropped server-side.
pub fn indexed_paths(entries: &HashMap<String, FileEntry>) -> HashSet<String> {
    entries.keys().cloned().collect()
}

//! C11 — FileProcessor: incremental sync. Re-discovers the codebase,
//! classifies each file as changed/unchanged via the hash-gate (§4.8), and
//! applies an atomic per-file replace — upload the new chunks before
//! deleting the old ones, never the reverse, so a crash mid-sync never
//! leaves a file's code unsearchable.

use crate::chunk::extract_chunks;
use crate::config::IndexConfig;
use crate::discover::{discover, extensions_for_languages};
use crate::embedder::Embedder;
use crate::error::{CoreError, CoreResult, FileError};
use crate::filter::should_include;
use crate::language::detect;
use crate::metadata::FileMetadataStore;
use crate::model::{content_hash, Chunk, FileEntry};
use crate::subchunk::subchunk;
use crate::symbols;
use crate::vectorstore::{VectorRecord, VectorStore};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub errors: Vec<FileError>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum ChangeKind {
    New,
    Modified,
    Unchanged,
}

/// Steps 2-5 of the hash-gate: a file only needs re-embedding if it has no
/// prior entry, or its size or content hash differ from the last-recorded
/// entry. There is deliberately no mtime-equality shortcut here — coarse
/// filesystem mtime resolution can make two distinct edits report the same
/// timestamp, which would hide a real change. The cheap `since` time-gate
/// (step 1) lives in the caller, ahead of the content-hash read.
fn classify_change(
    previous: Option<&FileEntry>,
    size: u64,
    hash: &str,
) -> ChangeKind {
    let Some(prev) = previous else {
        return ChangeKind::New;
    };
    if prev.size != size {
        return ChangeKind::Modified;
    }
    if prev.content_hash != hash {
        return ChangeKind::Modified;
    }
    ChangeKind::Unchanged
}

pub fn run_incremental_sync(
    codebase_root: &Path,
    namespace: &str,
    config: &IndexConfig,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    max_age_hours: Option<f64>,
) -> CoreResult<SyncReport> {
    let start = Instant::now();
    let mut report = SyncReport::default();

    let metadata_store = FileMetadataStore::for_namespace(namespace);
    let previous_entries = metadata_store.all();

    let since = max_age_hours
        .map(|hours| chrono::Utc::now() - chrono::Duration::milliseconds((hours * 3_600_000.0) as i64));

    let extensions = extensions_for_languages(&config.supported_languages);
    let discovered = discover(codebase_root, &extensions);
    let mut seen_paths: HashSet<String> = HashSet::new();

    for file in &discovered {
        seen_paths.insert(file.rel_path.clone());

        let mtime = match std::fs::metadata(&file.abs_path).and_then(|m| m.modified()) {
            Ok(m) => chrono::DateTime::<chrono::Utc>::from(m),
            Err(e) => {
                report.errors.push(FileError { file: file.rel_path.clone(), error: e.to_string() });
                continue;
            }
        };

        if let Some(cutoff) = since {
            if mtime <= cutoff {
                report.unchanged += 1;
                continue;
            }
        }

        let content = match std::fs::read_to_string(&file.abs_path) {
            Ok(c) => c,
            Err(e) => {
                report.errors.push(FileError { file: file.rel_path.clone(), error: e.to_string() });
                continue;
            }
        };

        let size = content.len() as u64;
        let hash = content_hash(&content);
        let previous = previous_entries.get(&file.rel_path);
        let change = classify_change(previous, size, &hash);

        if change == ChangeKind::Unchanged {
            report.unchanged += 1;
            continue;
        }

        let decision = should_include(&file.rel_path, &content, config.content_size_cap);
        if !decision.include {
            if let Some(prev) = previous {
                if let Err(e) = replace_file_chunks(
                    namespace,
                    &file.rel_path,
                    Vec::new(),
                    prev,
                    embedder,
                    store,
                    &metadata_store,
                ) {
                    report.errors.push(FileError { file: file.rel_path.clone(), error: e.to_string() });
                }
            }
            continue;
        }

        let detection = detect(&file.abs_path, Some(&content[..content.len().min(200)]));
        let ast = symbols::extract(&content, &detection.extension);
        let file_path = file.abs_path.to_string_lossy().to_string();
        let new_chunks: Vec<Chunk> = extract_chunks(
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

        let new_entry = FileEntry {
            mtime,
            size,
            content_hash: hash,
            chunk_ids: new_chunks.iter().map(|c| c.id.clone()).collect(),
        };

        let result = match previous {
            Some(prev) => replace_file_chunks(
                namespace,
                &file.rel_path,
                new_chunks,
                prev,
                embedder,
                store,
                &metadata_store,
            ),
            None => embed_new_file(namespace, &file.rel_path, new_chunks, embedder, store, &metadata_store),
        };

        match result {
            Ok(()) => {
                metadata_store.upsert(&file.rel_path, new_entry)?;
                if change == ChangeKind::New {
                    report.added += 1;
                } else {
                    report.updated += 1;
                }
            }
            Err(e) => report.errors.push(FileError { file: file.rel_path.clone(), error: e.to_string() }),
        }
    }

    for (rel_path, entry) in &previous_entries {
        if seen_paths.contains(rel_path) {
            continue;
        }
        match remove_file_chunks(namespace, entry, store) {
            Ok(()) => {
                metadata_store.remove(rel_path)?;
                report.removed += 1;
            }
            Err(e) => report.errors.push(FileError { file: rel_path.clone(), error: e.to_string() }),
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

fn embed_new_file(
    namespace: &str,
    _rel_path: &str,
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    _metadata_store: &FileMetadataStore,
) -> CoreResult<()> {
    if chunks.is_empty() {
        return Ok(());
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder.embed_batch(&texts)?;
    let records: Vec<VectorRecord> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| VectorRecord { chunk, embedding })
        .collect();
    store.upsert(namespace, &records)
}

/// Atomic per-file replace: upload every new chunk first, then delete the
/// chunk ids the old entry had that aren't in the new set. Never the
/// reverse order — a reader must never observe a file with zero chunks.
///
/// If the upload fails, the old chunks are left untouched and the file stays
/// marked unchanged for next run (`AtomicReplaceAborted`). If the upload
/// succeeds but the stale-chunk delete fails, that's a warning, not an
/// abort — the file is correctly searchable, just with a few orphaned old
/// chunks left in the store until the next pass (`OrphanChunksLeft`, I1 is
/// violated temporarily).
fn replace_file_chunks(
    namespace: &str,
    rel_path: &str,
    new_chunks: Vec<Chunk>,
    previous: &FileEntry,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    _metadata_store: &FileMetadataStore,
) -> CoreResult<()> {
    if !new_chunks.is_empty() {
        embed_new_file(namespace, rel_path, new_chunks.clone(), embedder, store, _metadata_store)
            .map_err(|e| CoreError::AtomicReplaceAborted(format!("{rel_path}: {e}")))?;
    }

    let new_ids: HashSet<&String> = new_chunks.iter().map(|c| &c.id).collect();
    let stale_ids: Vec<String> =
        previous.chunk_ids.iter().filter(|id| !new_ids.contains(id)).cloned().collect();
    if !stale_ids.is_empty() {
        if let Err(e) = store.delete(namespace, &stale_ids) {
            let warning = CoreError::OrphanChunksLeft(format!("{rel_path}: {e}"));
            tracing::warn!(file = rel_path, error = %warning, "stale chunks left behind after upload");
        }
    }
    Ok(())
}

fn remove_file_chunks(namespace: &str, entry: &FileEntry, store: &dyn VectorStore) -> CoreResult<()> {
    let ids: Vec<String> = entry.chunk_ids.iter().cloned().collect();
    store.delete(namespace, &ids)
}

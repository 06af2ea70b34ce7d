//! Crate-wide error type covering the error kinds of the propagation policy.
//!
//! Only path- and lock-level failures are meant to abort an operation outright;
//! everything else (parse failures, filtered files, batch upload failures) is
//! recovered locally and surfaced as data in a report, never via `?` out of
//! the orchestrator.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("path not accessible: {0}")]
    PathNotAccessible(PathBuf),

    #[error("operation '{operation}' already in progress (pid {pid}, age {age_secs}s)")]
    LockContended { operation: String, pid: u32, age_secs: u64 },

    #[error("codebase not indexed: {0}")]
    NotIndexed(PathBuf),

    #[error("embedder request failed: {0}")]
    EmbedderFailed(String),

    #[error("vector store request failed: {0}")]
    VectorStoreFailed(String),

    #[error("reranker request failed: {0}")]
    RerankerFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("chunk exceeded embedder size limit even after sub-chunking: {0}")]
    EmbedOversized(String),

    #[error("batch upload failed: {0}")]
    BatchUploadFailed(String),

    #[error("atomic replace aborted, file left marked unchanged: {0}")]
    AtomicReplaceAborted(String),

    #[error("orphan chunks left behind after upload: {0}")]
    OrphanChunksLeft(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// A single non-fatal failure recorded against a file during a pipeline run.
/// This is the data-shaped counterpart of the propagation policy: instead of
/// aborting, the orchestrator pushes one of these and keeps going.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

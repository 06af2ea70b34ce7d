//! Data directory resolution (§6.4, §6.5).

use std::path::{Path, PathBuf};

/// Resolve the data directory: `CODEX_CONTEXT_DATA_DIR` env override, else
/// `$HOME/.codex-context`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CODEX_CONTEXT_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".codex-context")
}

/// Ensure the data directory exists, creating it if necessary.
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// First 8 hex chars of md5(canonical path) — used both for the namespace id
/// (prefixed `mcp_`) and for per-codebase file names under the data dir.
pub fn path_hash(canonical_path: &std::path::Path) -> String {
    let digest = md5::compute(canonical_path.to_string_lossy().as_bytes());
    format!("{digest:x}")[..8].to_string()
}

/// Sanitize an operation key into a safe filename component for lock files.
pub fn sanitize_op_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' { c } else { '_' })
        .collect()
}

/// Write `content` to `path` atomically: write to a sibling temp file, then
/// rename over the destination. No reader ever observes a half-written file
/// (spec §4.7/§7 — C7 and C8 must never leave a half-written on-disk state).
pub fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json"),
        std::process::id()
    ));
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

//! Background indexing worker (§6.1, SPEC_FULL.md §3). `index_codebase`
//! returns as soon as the lock is acquired and the work is handed to a
//! detached thread — a full reindex of a large codebase can run for minutes,
//! far past what an MCP client's request timeout tolerates. Progress and the
//! final result are appended to a per-namespace log file that
//! `get_indexing_status` tails.

use codex_context_core::config::IndexConfig;
use codex_context_core::embedder::Embedder;
use codex_context_core::incremental::run_incremental_sync;
use codex_context_core::lock::LockHandle;
use codex_context_core::orchestrator::run_full_index;
use codex_context_core::paths::data_dir;
use codex_context_core::vectorstore::VectorStore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Path to the log file a namespace's indexing runs append to.
pub fn log_path(namespace: &str) -> PathBuf {
    logs_dir().join(format!("{namespace}.log"))
}

fn append_log(namespace: &str, line: &str) {
    let path = log_path(namespace);
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(namespace, error = %e, "could not create indexing log directory");
            return;
        }
    }
    let entry = format!("{} {line}\n", chrono::Utc::now().to_rfc3339());
    match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(mut f) => {
            if let Err(e) = f.write_all(entry.as_bytes()) {
                tracing::warn!(namespace, error = %e, "could not write to indexing log");
            }
        }
        Err(e) => tracing::warn!(namespace, error = %e, "could not open indexing log"),
    }
}

/// Spawn a detached thread that runs a full index or incremental sync and
/// appends its outcome to the namespace's log. Takes ownership of
/// `lock_guard` so the lock releases only once the background run finishes,
/// not when the calling request returns. Returns the log path immediately.
#[allow(clippy::too_many_arguments)]
pub fn spawn_index_worker(
    root: PathBuf,
    namespace: String,
    config: IndexConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    incremental: bool,
    lock_guard: LockHandle,
) -> PathBuf {
    let path = log_path(&namespace);
    // Truncate: a new run's log shouldn't carry a previous run's tail line,
    // which `tail_summary` would otherwise report as this run's outcome.
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&path, "");

    append_log(&namespace, &format!("[started] incremental={incremental}"));

    std::thread::spawn(move || {
        let _guard = lock_guard;
        let outcome = if incremental {
            run_incremental_sync(&root, &namespace, &config, embedder.as_ref(), store.as_ref(), None)
                .map(|r| serde_json::to_value(r).unwrap_or_default())
        } else {
            run_full_index(&root, &namespace, &config, embedder.as_ref(), store.as_ref())
                .map(|r| serde_json::to_value(r).unwrap_or_default())
        };

        match outcome {
            Ok(report) => append_log(&namespace, &format!("[done] {report}")),
            Err(e) => append_log(&namespace, &format!("[error] {e}")),
        }
    });

    path
}

/// Parse a namespace's indexing log into a status object for
/// `get_indexing_status`: whether a run is still in progress, and — once
/// finished — the success rate and elapsed time pulled from the run's
/// reported error count and duration.
pub fn tail_summary(namespace: &str) -> serde_json::Value {
    let path = log_path(namespace);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return serde_json::json!({ "running": false });
    };

    let mut last_done: Option<&str> = None;
    let mut last_error: Option<&str> = None;
    let mut started = false;

    for line in content.lines() {
        if let Some(rest) = strip_tagged(line, "[started]") {
            started = true;
            let _ = rest;
        } else if let Some(rest) = strip_tagged(line, "[done]") {
            last_done = Some(rest);
            started = false;
        } else if let Some(rest) = strip_tagged(line, "[error]") {
            last_error = Some(rest);
            started = false;
        }
    }

    if let Some(json) = last_done {
        let report: serde_json::Value = serde_json::from_str(json).unwrap_or_default();
        let errors = report.get("errors").and_then(|e| e.as_array()).map(|a| a.len()).unwrap_or(0);
        let files_indexed = report.get("filesIndexed").and_then(|v| v.as_u64()).unwrap_or(0);
        let total_attempted = files_indexed + errors as u64;
        let success_rate =
            if total_attempted == 0 { 1.0 } else { files_indexed as f64 / total_attempted as f64 };
        return serde_json::json!({
            "running": false,
            "lastResult": report,
            "successRate": success_rate,
            "elapsedMs": report.get("durationMs"),
        });
    }

    if let Some(msg) = last_error {
        return serde_json::json!({ "running": false, "lastError": msg });
    }

    serde_json::json!({ "running": started })
}

/// Strip a leading RFC3339 timestamp and tag from a log line, returning the
/// remainder, e.g. `strip_tagged("2026-01-01T00:00:00Z [done] {...}", "[done]")`
/// returns `Some("{...}")`.
fn strip_tagged<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let marker = format!("{tag} ");
    line.find(&marker).map(|idx| line[idx + marker.len()..].trim())
}

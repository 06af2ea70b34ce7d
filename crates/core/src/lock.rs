//! C9 — LockService: a cross-process exclusive lock keyed by (operation,
//! canonical path), implemented with an exclusively-created marker file —
//! the same `OpenOptions::create_new` idiom the rest of the std-fs-heavy
//! teacher code reaches for wherever it needs an atomic "only one writer"
//! guarantee. A lock is considered stale (and safe to steal) once it's
//! older than `stale_secs` or its recorded PID is no longer alive.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize)]
struct LockFileContent {
    pid: u32,
    acquired_at_secs: u64,
}

pub struct LockHandle {
    path: PathBuf,
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct LockService {
    stale_secs: u64,
}

impl LockService {
    pub fn new(stale_secs: u64) -> Self {
        Self { stale_secs }
    }

    fn lock_path(&self, operation: &str, canonical_path: &Path) -> PathBuf {
        let key = format!(
            "{}-{}",
            crate::paths::sanitize_op_key(operation),
            crate::paths::path_hash(canonical_path)
        );
        crate::paths::data_dir().join("locks").join(format!("{key}.lock"))
    }

    /// Try to acquire the lock, stealing it first if it's stale or orphaned.
    /// Returns a [`LockHandle`] that releases the lock on drop, or
    /// [`CoreError::LockContended`] if a live holder still has it.
    pub fn acquire(&self, operation: &str, canonical_path: &Path) -> CoreResult<LockHandle> {
        let path = self.lock_path(operation, canonical_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match self.try_create(&path) {
            Ok(()) => return Ok(LockHandle { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        if self.is_stale_or_orphaned(&path) {
            let _ = std::fs::remove_file(&path);
            self.try_create(&path)?;
            return Ok(LockHandle { path });
        }

        let (pid, age_secs) = self.read_lock_info(&path).unwrap_or((0, 0));
        Err(CoreError::LockContended { operation: operation.to_string(), pid, age_secs })
    }

    fn try_create(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let content = LockFileContent { pid: std::process::id(), acquired_at_secs: now_secs() };
        let serialized = serde_json::to_string(&content).unwrap_or_default();
        file.write_all(serialized.as_bytes())?;
        Ok(())
    }

    fn read_lock_info(&self, path: &Path) -> Option<(u32, u64)> {
        let content = std::fs::read_to_string(path).ok()?;
        let parsed: LockFileContent = serde_json::from_str(&content).ok()?;
        let age = now_secs().saturating_sub(parsed.acquired_at_secs);
        Some((parsed.pid, age))
    }

    /// A lock file is stale if it's corrupt (unreadable/unparseable — treat
    /// as abandoned), older than the staleness threshold, or its recording
    /// process is no longer alive.
    fn is_stale_or_orphaned(&self, path: &Path) -> bool {
        let Some(content) = std::fs::read_to_string(path).ok() else {
            return true;
        };
        let Ok(parsed) = serde_json::from_str::<LockFileContent>(&content) else {
            return true;
        };
        let age = now_secs().saturating_sub(parsed.acquired_at_secs);
        if age > self.stale_secs {
            return true;
        }
        !process_is_alive(parsed.pid)
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0: no-op, just checks whether the process exists and is
    // signalable by us.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_contended() {
        std::env::set_var("CODEX_CONTEXT_DATA_DIR", tempfile::tempdir().unwrap().path());
        let svc = LockService::new(1800);
        let root = Path::new("/repo/project");
        let _first = svc.acquire("index", root).unwrap();
        let second = svc.acquire("index", root);
        assert!(matches!(second, Err(CoreError::LockContended { .. })));
    }

    #[test]
    fn lock_releases_on_drop() {
        std::env::set_var("CODEX_CONTEXT_DATA_DIR", tempfile::tempdir().unwrap().path());
        let svc = LockService::new(1800);
        let root = Path::new("/repo/project2");
        {
            let _guard = svc.acquire("index", root).unwrap();
        }
        let second = svc.acquire("index", root);
        assert!(second.is_ok());
    }

    #[test]
    fn stale_lock_is_stolen() {
        std::env::set_var("CODEX_CONTEXT_DATA_DIR", tempfile::tempdir().unwrap().path());
        let svc = LockService::new(0);
        let root = Path::new("/repo/project3");
        let first = svc.acquire("index", root).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = svc.acquire("index", root);
        assert!(second.is_ok());
        drop(first);
    }
}

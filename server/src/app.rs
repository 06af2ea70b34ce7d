//! Application context: builds the concrete E1/E2/E3 collaborators from
//! environment variables once at startup and hands out shared references
//! to the tool handlers.

use codex_context_core::config::IndexConfig;
use codex_context_core::embedder::{Embedder, JinaEmbedder};
use codex_context_core::error::{CoreError, CoreResult};
use codex_context_core::lock::LockService;
use codex_context_core::reranker::{JinaReranker, Reranker};
use codex_context_core::registry::NamespaceRegistry;
use codex_context_core::vectorstore::{TurbopufferStore, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborators are `Arc`, not `Box`: the background indexing worker
/// (`worker.rs`) spawns a detached thread that needs `'static` ownership of
/// them, which a boxed trait object can't cheaply provide.
pub struct AppContext {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub registry: NamespaceRegistry,
}

impl AppContext {
    /// Build the live context from environment variables (§6.5). Fails
    /// fast if the required collaborators aren't configured — a codebase
    /// indexing server with no embedder or vector store has nothing to do.
    pub fn from_env() -> CoreResult<Self> {
        let embedder = JinaEmbedder::from_env()?;
        let store = TurbopufferStore::from_env()?;
        let reranker = JinaReranker::from_env();
        Ok(Self {
            embedder: Arc::new(embedder),
            store: Arc::new(store),
            reranker: reranker.map(|r| Arc::new(r) as Arc<dyn Reranker>),
            registry: NamespaceRegistry::new(),
        })
    }

    pub fn lock_service(&self, config: &IndexConfig) -> LockService {
        LockService::new(config.lock_stale_secs)
    }

    /// Resolve and validate a tool-supplied codebase path: must be
    /// absolute (§6.1) and must exist on disk.
    pub fn validate_path(path_str: &str) -> CoreResult<PathBuf> {
        let path = Path::new(path_str);
        if !path.is_absolute() {
            return Err(CoreError::PathNotAccessible(path.to_path_buf()));
        }
        path.canonicalize().map_err(|_| CoreError::PathNotAccessible(path.to_path_buf()))
    }
}

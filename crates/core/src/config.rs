//! Runtime configuration, loaded from an optional `.codexcontext.toml` at the
//! codebase root. Absence of the file is not an error — compiled-in defaults
//! apply, matching the "start empty on load failure" discipline used by
//! the registry and metadata store.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Default maximum input size an embedding provider accepts, in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 8000;
pub const DEFAULT_CONTENT_SIZE_CAP: u64 = 500_000;
pub const DEFAULT_LOCK_STALE_SECS: u64 = 30 * 60;
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.6;
pub const DEFAULT_BM25_WEIGHT: f32 = 0.4;

#[derive(Clone, Debug)]
pub struct IndexConfig {
    pub supported_languages: HashSet<String>,
    pub max_chunk_chars: usize,
    pub content_size_cap: u64,
    pub lock_stale_secs: u64,
    pub default_vector_weight: f32,
    pub default_bm25_weight: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            supported_languages: [
                "typescript",
                "javascript",
                "python",
                "java",
                "cpp",
                "go",
                "rust",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            content_size_cap: DEFAULT_CONTENT_SIZE_CAP,
            lock_stale_secs: DEFAULT_LOCK_STALE_SECS,
            default_vector_weight: DEFAULT_VECTOR_WEIGHT,
            default_bm25_weight: DEFAULT_BM25_WEIGHT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    languages: Vec<String>,
    max_chunk_chars: Option<usize>,
    content_size_cap: Option<u64>,
    lock_stale_secs: Option<u64>,
    vector_weight: Option<f32>,
    bm25_weight: Option<f32>,
}

impl IndexConfig {
    /// Load `.codexcontext.toml` from the codebase root, falling back to
    /// defaults for any field that is absent or if the file itself can't be
    /// read or parsed.
    pub fn load(codebase_root: &Path) -> Self {
        let mut config = Self::default();
        let path = codebase_root.join(".codexcontext.toml");
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return config,
        };
        let raw: RawConfig = match toml::from_str(&content) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                return config;
            }
        };

        if !raw.languages.is_empty() {
            config.supported_languages = raw.languages.into_iter().collect();
        }
        if let Some(v) = raw.max_chunk_chars {
            config.max_chunk_chars = v;
        }
        if let Some(v) = raw.content_size_cap {
            config.content_size_cap = v;
        }
        if let Some(v) = raw.lock_stale_secs {
            config.lock_stale_secs = v;
        }
        if let Some(v) = raw.vector_weight {
            config.default_vector_weight = v;
        }
        if let Some(v) = raw.bm25_weight {
            config.default_bm25_weight = v;
        }
        config
    }
}

//! Core data model (spec §3): codebases, namespaces, file entries, chunks,
//! symbols, imports, exports.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Derive the deterministic namespace id for a canonical codebase path (I3).
/// `"mcp_" + first-8-hex(md5(canonical_path))`.
pub fn generate_namespace(canonical_path: &Path) -> String {
    format!("mcp_{}", crate::paths::path_hash(canonical_path))
}

/// Derive a chunk id from its file path, starting line, and content (§3, P2).
/// `"chunk_" + first-16-hex(sha256(filePath + ":" + startLine + ":" + content))`.
pub fn chunk_id(file_path: &str, start_line: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(start_line.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    format!("chunk_{}", hex_prefix(&digest, 16))
}

fn hex_prefix(bytes: &[u8], hex_chars: usize) -> String {
    let need_bytes = hex_chars.div_ceil(2);
    let mut s = String::with_capacity(hex_chars);
    for b in bytes.iter().take(need_bytes) {
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(hex_chars);
    s
}

/// Compute the SHA-256 hex digest of UTF-8 file content (C8's `contentHash`).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolType {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Constant,
    Method,
    Namespace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Local,
    Export,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SymbolType,
    #[serde(rename = "startLine")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl Symbol {
    pub fn overlaps(&self, start_line: usize, end_line: usize) -> bool {
        self.start_line <= end_line && start_line <= self.end_line
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    #[serde(rename = "importedNames")]
    pub imported_names: Vec<String>,
    pub line: usize,
}

/// The full per-file extraction result of C4 (SymbolExtractor).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileAst {
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
    pub exports: Vec<String>,
    #[serde(rename = "parseErrors")]
    pub parse_errors: Vec<String>,
}

/// A retrievable source-code unit with stable identity, line range, and language (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
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
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
    pub exports: Vec<String>,
}

impl Chunk {
    /// Recompute `id` from the current (file_path, start_line, content) triple.
    pub fn with_fresh_id(mut self) -> Self {
        self.id = chunk_id(&self.file_path, self.start_line, &self.content);
        self
    }
}

/// Per-file entry persisted by C8 (FileMetadataStore).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub mtime: chrono::DateTime<chrono::Utc>,
    pub size: u64,
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    #[serde(rename = "chunkIds")]
    pub chunk_ids: HashSet<String>,
}

/// A discovered file, not yet filtered or parsed.
#[derive(Clone, Debug)]
pub struct DiscoveredFile {
    pub abs_path: PathBuf,
    pub rel_path: String,
}

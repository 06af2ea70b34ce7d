//! C2 — ContentFilter: decide whether a discovered file is worth indexing.
//!
//! Exclusion signals are evaluated in order and short-circuit on the first
//! hit, mirroring the scanner's binary-detection + path-classification style
//! in the teacher's `scan.rs`.

use regex::Regex;
use std::sync::LazyLock;

#[derive(Clone, Debug, PartialEq)]
pub struct FilterDecision {
    pub include: bool,
    pub reason: Option<&'static str>,
    pub confidence: f32,
}

fn included(confidence: f32) -> FilterDecision {
    FilterDecision { include: true, reason: None, confidence }
}

fn excluded(reason: &'static str) -> FilterDecision {
    FilterDecision { include: false, reason: Some(reason), confidence: 0.0 }
}

static TEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|/)(tests?|__tests__|spec)(/|$)|\.(test|spec)\.[a-z]+$").unwrap()
});
static GENERATED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(generated|gen|pb)\.[a-z]+$|(^|/)generated(/|$)").unwrap()
});
static VENDORED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|/)(vendor|vendored|third_party|node_modules|target|dist|build)(/|$)")
        .unwrap()
});
static MINIFIED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.min\.(js|css)$").unwrap());

const LOCKFILE_NAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "go.sum",
    "composer.lock",
];

/// Default cap on file size (bytes); files larger than this are treated as
/// likely data files, not source.
pub const DEFAULT_SIZE_CAP: u64 = 500_000;

/// Decide whether a file should be indexed, given its path relative to the
/// codebase root and its content (when available — callers with only a
/// `len` can pass an empty string and rely on the size-cap check alone).
pub fn should_include(relative_path: &str, content: &str, size_cap: u64) -> FilterDecision {
    let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);

    if TEST_PATTERN.is_match(relative_path) {
        return excluded("Test file");
    }
    if GENERATED_PATTERN.is_match(relative_path) {
        return excluded("Generated file");
    }
    if VENDORED_PATTERN.is_match(relative_path) {
        return excluded("Vendored dependency");
    }
    if MINIFIED_PATTERN.is_match(relative_path) {
        return excluded("Minified file");
    }

    let size = content.len() as u64;
    if size > size_cap {
        return excluded("File too large (likely data file)");
    }

    if looks_binary(content.as_bytes()) {
        return excluded("Binary file");
    }

    if LOCKFILE_NAMES.contains(&file_name) {
        return excluded("Lockfile / generated manifest");
    }

    included(0.9)
}

/// Size-only variant (C2's "or just size" input mode): used when content is
/// not yet loaded, e.g. to skip a read entirely for obviously-oversized files.
pub fn should_include_by_size(relative_path: &str, size: u64, size_cap: u64) -> FilterDecision {
    if size > size_cap {
        return excluded("File too large (likely data file)");
    }
    let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    if TEST_PATTERN.is_match(relative_path) {
        return excluded("Test file");
    }
    if GENERATED_PATTERN.is_match(relative_path) {
        return excluded("Generated file");
    }
    if VENDORED_PATTERN.is_match(relative_path) {
        return excluded("Vendored dependency");
    }
    if MINIFIED_PATTERN.is_match(relative_path) {
        return excluded("Minified file");
    }
    if LOCKFILE_NAMES.contains(&file_name) {
        return excluded("Lockfile / generated manifest");
    }
    included(0.5)
}

/// Binary-signature / high-non-text-byte-ratio check, same 8KB-prefix
/// heuristic as the teacher's `is_text_file`, inverted to an exclusion test.
fn looks_binary(bytes: &[u8]) -> bool {
    let prefix = &bytes[..bytes.len().min(8192)];
    if prefix.contains(&0) {
        return true;
    }
    if prefix.is_empty() {
        return false;
    }
    let non_text = prefix
        .iter()
        .filter(|&&b| b != b'\n' && b != b'\r' && b != b'\t' && !(0x20..=0x7e).contains(&b))
        .count();
    (non_text as f64 / prefix.len() as f64) > 0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_test_files() {
        let d = should_include("src/foo.test.ts", "export const x = 1;", DEFAULT_SIZE_CAP);
        assert!(!d.include);
        assert_eq!(d.reason, Some("Test file"));
    }

    #[test]
    fn excludes_oversized_files() {
        let big = "x".repeat(600_000);
        let d = should_include("src/data.rs", &big, DEFAULT_SIZE_CAP);
        assert!(!d.include);
        assert_eq!(d.reason, Some("File too large (likely data file)"));
    }

    #[test]
    fn excludes_binary_content() {
        let bin: String = String::from_utf8_lossy(&[0u8, 1, 2, 3, 255, 254]).to_string();
        let d = should_include("src/blob.bin", &bin, DEFAULT_SIZE_CAP);
        assert!(!d.include);
    }

    #[test]
    fn excludes_lockfiles() {
        let d = should_include("Cargo.lock", "# auto-generated", DEFAULT_SIZE_CAP);
        assert!(!d.include);
    }

    #[test]
    fn includes_normal_source() {
        let d = should_include("src/main.rs", "fn main() {}\n", DEFAULT_SIZE_CAP);
        assert!(d.include);
        assert!(d.confidence >= 0.5);
    }
}

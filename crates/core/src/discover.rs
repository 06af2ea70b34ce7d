//! C3 — FileDiscoverer: walk a codebase root and return a deterministic list
//! of candidate files, respecting ignore rules. Grounded in the teacher's
//! parallel `ignore::WalkBuilder` usage in `scan.rs`, simplified to a
//! single-threaded deterministic walk since reproducibility (stable sort)
//! matters more here than wall-clock speed.

use crate::model::DiscoveredFile;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_SKIP_DIRS: &[&str] =
    &[".git", "node_modules", "__pycache__", "target", "dist", "build", ".next", "vendor"];

/// Walk `root`, returning every file whose extension maps to a supported
/// language, sorted lexicographically by relative path for reproducible
/// indexing (spec §4.3).
pub fn discover(root: &Path, supported_extensions: &HashSet<String>) -> Vec<DiscoveredFile> {
    let data_dir = crate::paths::data_dir();
    let skip: HashSet<&str> = DEFAULT_SKIP_DIRS.iter().copied().collect();

    let mut files: Vec<DiscoveredFile> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(move |entry| {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                let name = entry.file_name().to_string_lossy();
                return !skip.contains(name.as_ref());
            }
            true
        })
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| !entry.path().starts_with(&data_dir))
        .filter_map(|entry| {
            let abs_path = entry.path().to_path_buf();
            let ext = abs_path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
            if !supported_extensions.contains(&ext) {
                return None;
            }
            let rel_path =
                abs_path.strip_prefix(root).unwrap_or(&abs_path).to_string_lossy().replace('\\', "/");
            Some(DiscoveredFile { abs_path, rel_path })
        })
        .collect();

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

/// Map the config's language set to the extensions C1 recognizes for them.
pub fn extensions_for_languages(languages: &HashSet<String>) -> HashSet<String> {
    let mut exts = HashSet::new();
    for lang in languages {
        match lang.as_str() {
            "typescript" => {
                exts.insert("ts".to_string());
                exts.insert("tsx".to_string());
            }
            "javascript" => {
                for e in ["js", "jsx", "mjs", "cjs"] {
                    exts.insert(e.to_string());
                }
            }
            "python" => {
                exts.insert("py".to_string());
                exts.insert("pyi".to_string());
            }
            "java" => {
                exts.insert("java".to_string());
            }
            "cpp" => {
                for e in ["cpp", "cc", "cxx", "hpp", "hh", "hxx", "c", "h"] {
                    exts.insert(e.to_string());
                }
            }
            "go" => {
                exts.insert("go".to_string());
            }
            "rust" => {
                exts.insert("rs".to_string());
            }
            _ => {}
        }
    }
    exts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn discovers_files_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/c.rs"), "fn c() {}").unwrap();

        let exts: HashSet<String> = ["rs".to_string()].into_iter().collect();
        let files = discover(dir.path(), &exts);
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn skips_unsupported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), "# hi").unwrap();
        let exts: HashSet<String> = ["rs".to_string()].into_iter().collect();
        assert!(discover(dir.path(), &exts).is_empty());
    }
}

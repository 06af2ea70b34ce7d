//! C1 — LanguageDetector: map a file path (and optional content prefix) to a
//! language tag and an extension-based confidence score.

use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub language: String,
    pub extension: String,
    pub confidence: f32,
}

/// Extension → (language, base confidence).
fn ext_table(ext: &str) -> Option<(&'static str, f32)> {
    match ext {
        "ts" | "tsx" => Some(("typescript", 1.0)),
        "js" | "jsx" | "mjs" | "cjs" => Some(("javascript", 1.0)),
        "py" | "pyi" => Some(("python", 1.0)),
        "java" => Some(("java", 1.0)),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" | "c" | "h" => Some(("cpp", 0.9)),
        "go" => Some(("go", 1.0)),
        "rs" => Some(("rust", 1.0)),
        _ => None,
    }
}

/// Shebang heuristics for extension-less scripts.
fn shebang_language(content_prefix: &str) -> Option<&'static str> {
    let first_line = content_prefix.lines().next().unwrap_or("");
    if !first_line.starts_with("#!") {
        return None;
    }
    if first_line.contains("python") {
        Some("python")
    } else if first_line.contains("node") {
        Some("javascript")
    } else {
        None
    }
}

/// Detect the language of a file from its path and, optionally, a content
/// prefix (used for shebang sniffing on extension-less files).
pub fn detect(path: &Path, content_prefix: Option<&str>) -> Detection {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

    if let Some((lang, confidence)) = ext_table(&ext) {
        return Detection { language: lang.to_string(), extension: ext, confidence };
    }

    if ext.is_empty() {
        if let Some(content) = content_prefix {
            if let Some(lang) = shebang_language(content) {
                return Detection { language: lang.to_string(), extension: ext, confidence: 0.6 };
            }
        }
    }

    Detection { language: "unknown".to_string(), extension: ext, confidence: 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detects_common_extensions() {
        assert_eq!(detect(&PathBuf::from("a.rs"), None).language, "rust");
        assert_eq!(detect(&PathBuf::from("a.ts"), None).language, "typescript");
        assert_eq!(detect(&PathBuf::from("a.py"), None).language, "python");
        assert_eq!(detect(&PathBuf::from("a.go"), None).language, "go");
    }

    #[test]
    fn unknown_extension_has_zero_confidence() {
        let d = detect(&PathBuf::from("a.xyz"), None);
        assert_eq!(d.language, "unknown");
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn shebang_boosts_extensionless_scripts() {
        let d = detect(&PathBuf::from("runme"), Some("#!/usr/bin/env python3\nprint(1)\n"));
        assert_eq!(d.language, "python");
        assert!(d.confidence > 0.0);
    }
}

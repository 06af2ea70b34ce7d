//! C4 — SymbolExtractor: parse a file's AST with tree-sitter to recover
//! symbol definitions, imports, and exports. Falls back to a regex-based
//! pass when tree-sitter can't parse the file at all (unsupported grammar
//! or a syntax error tree-sitter can't recover from), matching the
//! teacher's tree-sitter walk in `ast.rs` but emitting the shared
//! [`crate::model::FileAst`] shape instead of a name-indexed per-repo index.

use crate::model::{FileAst, Import, Scope, Symbol, SymbolType};
use regex::Regex;
use std::sync::LazyLock;
use tree_sitter::{Language, Node, Parser};

fn language_for_ext(ext: &str) -> Option<Language> {
    match ext {
        "rs" => Some(tree_sitter_rust::LANGUAGE.into()),
        "ts" | "tsx" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "py" | "pyi" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" | "h" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        _ => None,
    }
}

fn classify_node(kind: &str) -> Option<SymbolType> {
    match kind {
        "function_item" | "function_declaration" | "function_definition" => {
            Some(SymbolType::Function)
        }
        "struct_item" | "class_declaration" | "class_definition" | "struct_specifier"
        | "class_specifier" => Some(SymbolType::Class),
        "trait_item" | "interface_declaration" => Some(SymbolType::Interface),
        "type_item" | "type_alias_declaration" | "type_spec" => Some(SymbolType::Type),
        "const_item" | "static_item" => Some(SymbolType::Constant),
        "method_definition" | "method_declaration" => Some(SymbolType::Method),
        "enum_item" | "enum_declaration" | "enum_specifier" => Some(SymbolType::Class),
        "mod_item" => Some(SymbolType::Namespace),
        "let_declaration" | "variable_declarator" => Some(SymbolType::Variable),
        _ => None,
    }
}

fn extract_name(node: &Node, source: &[u8]) -> Option<String> {
    for field in ["name", "type"] {
        if let Some(name_node) = node.child_by_field_name(field) {
            if let Ok(text) = name_node.utf8_text(source) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    if node.kind() == "impl_item" {
        if let Some(type_node) = node.child_by_field_name("type") {
            return type_node.utf8_text(source).ok().map(|s| s.trim().to_string());
        }
    }
    if node.kind() == "type_spec" {
        if let Some(child) = node.named_child(0) {
            return child.utf8_text(source).ok().map(|s| s.trim().to_string());
        }
    }
    None
}

/// Is this node (or a "pub"/export-decorated ancestor sibling text) visible
/// outside the file? Cheap source-text sniff rather than a full scope pass.
fn is_exported(node: &Node, source: &[u8], ext: &str) -> bool {
    let snippet_start = node.start_byte().saturating_sub(16);
    let prefix = std::str::from_utf8(&source[snippet_start..node.start_byte()]).unwrap_or("");
    match ext {
        "rs" => prefix.contains("pub "),
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => {
            prefix.contains("export ") || prefix.trim_end().ends_with("export")
        }
        "go" => extract_name(node, source)
            .and_then(|n| n.chars().next())
            .is_some_and(|c| c.is_uppercase()),
        _ => true,
    }
}

fn walk_node(node: &Node, source: &[u8], ext: &str, depth: usize, symbols: &mut Vec<Symbol>) {
    let kind = node.kind();
    if let Some(mut sym_type) = classify_node(kind) {
        if depth > 0 && matches!(sym_type, SymbolType::Function) {
            sym_type = SymbolType::Method;
        }
        let name = extract_name(node, source).unwrap_or_default();
        let scope = if is_exported(node, source, ext) {
            Scope::Export
        } else if depth > 0 {
            Scope::Local
        } else {
            Scope::Global
        };
        // Local variables are noise at retrieval time — a chunk's symbol
        // list should describe what it defines, not every binding inside
        // it — so they're dropped unless they escape their local scope.
        let drop_local_variable = matches!(sym_type, SymbolType::Variable) && scope == Scope::Local;
        if !name.is_empty() && !drop_local_variable {
            symbols.push(Symbol {
                name,
                kind: sym_type,
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
                scope: Some(scope),
            });
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            walk_node(&child, source, ext, depth + 1, symbols);
        }
    } else {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            walk_node(&child, source, ext, depth, symbols);
        }
    }
}

static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:from\s+([\w.]+)\s+import\s+([^\n]+)|import\s+([\w.]+))").unwrap());
static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:([\w{}*,\s]+)\s+from\s+)?['"]([^'"]+)['"]"#).unwrap()
});
static RUST_USE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*use\s+([\w:{}, ]+);").unwrap());
static GO_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*"([^"]+)""#).unwrap());
static JAVA_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+);").unwrap());
static CPP_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*#include\s+[<"]([^">]+)[>"]"#).unwrap());

static JS_EXPORT_NAMED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s+(?:default\s+)?(?:async\s+)?(?:function|class|const|let|var|interface|type)\s+(\w+)").unwrap());

fn extract_imports(content: &str, ext: &str) -> Vec<Import> {
    let mut imports = Vec::new();
    match ext {
        "py" | "pyi" => {
            for (i, line) in content.lines().enumerate() {
                if let Some(caps) = PY_IMPORT.captures(line) {
                    let module = caps
                        .get(1)
                        .or_else(|| caps.get(3))
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default();
                    let names = caps
                        .get(2)
                        .map(|m| {
                            m.as_str()
                                .split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect()
                        })
                        .unwrap_or_default();
                    if !module.is_empty() {
                        imports.push(Import { module, imported_names: names, line: i + 1 });
                    }
                }
            }
        }
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => {
            for (i, line) in content.lines().enumerate() {
                if let Some(caps) = JS_IMPORT.captures(line) {
                    let module = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
                    let names = caps
                        .get(1)
                        .map(|m| {
                            m.as_str()
                                .trim_matches(|c| c == '{' || c == '}')
                                .split(',')
                                .map(|s| s.trim().to_string())
                                .filter(|s| !s.is_empty())
                                .collect()
                        })
                        .unwrap_or_default();
                    if !module.is_empty() {
                        imports.push(Import { module, imported_names: names, line: i + 1 });
                    }
                }
            }
        }
        "rs" => {
            for (i, line) in content.lines().enumerate() {
                if let Some(caps) = RUST_USE.captures(line) {
                    let module = caps[1].trim().to_string();
                    imports.push(Import { module, imported_names: Vec::new(), line: i + 1 });
                }
            }
        }
        "go" => {
            let mut in_block = false;
            for (i, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.starts_with("import (") {
                    in_block = true;
                    continue;
                }
                if in_block && trimmed == ")" {
                    in_block = false;
                    continue;
                }
                if in_block || trimmed.starts_with("import ") {
                    if let Some(caps) = GO_IMPORT.captures(trimmed) {
                        imports.push(Import {
                            module: caps[1].to_string(),
                            imported_names: Vec::new(),
                            line: i + 1,
                        });
                    }
                }
            }
        }
        "java" => {
            for (i, line) in content.lines().enumerate() {
                if let Some(caps) = JAVA_IMPORT.captures(line) {
                    imports.push(Import {
                        module: caps[1].to_string(),
                        imported_names: Vec::new(),
                        line: i + 1,
                    });
                }
            }
        }
        "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => {
            for (i, line) in content.lines().enumerate() {
                if let Some(caps) = CPP_INCLUDE.captures(line) {
                    imports.push(Import {
                        module: caps[1].to_string(),
                        imported_names: Vec::new(),
                        line: i + 1,
                    });
                }
            }
        }
        _ => {}
    }
    imports
}

fn extract_exports(content: &str, ext: &str, symbols: &[Symbol]) -> Vec<String> {
    match ext {
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => {
            JS_EXPORT_NAMED.captures_iter(content).map(|c| c[1].to_string()).collect()
        }
        _ => symbols
            .iter()
            .filter(|s| matches!(s.scope, Some(Scope::Export)))
            .map(|s| s.name.clone())
            .collect(),
    }
}

/// Degraded regex-only fallback used when tree-sitter has no grammar for
/// `ext`, or fails to produce a tree at all. Recovers top-level `fn`/`def`
/// style declarations only; no nesting, no precise end lines.
fn regex_fallback(content: &str, ext: &str) -> FileAst {
    static GENERIC_DEF: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^\s*(?:pub\s+|export\s+|async\s+)*(?:function|fn|def|class|struct|interface)\s+(\w+)")
            .unwrap()
    });
    let symbols = GENERIC_DEF
        .captures_iter(content)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let line = content[..m.start()].matches('\n').count() + 1;
            Some(Symbol {
                name: caps[1].to_string(),
                kind: SymbolType::Function,
                start_line: line,
                end_line: line,
                scope: None,
            })
        })
        .collect::<Vec<_>>();
    let imports = extract_imports(content, ext);
    let exports = extract_exports(content, ext, &symbols);
    FileAst {
        symbols,
        imports,
        exports,
        parse_errors: vec!["tree-sitter unavailable; used regex fallback".to_string()],
    }
}

/// Parse `content` (a file of language `ext`) into symbols, imports, and
/// exports. Never fails outright — on parser error it degrades to
/// [`regex_fallback`] rather than dropping the file from the index.
pub fn extract(content: &str, ext: &str) -> FileAst {
    let Some(lang) = language_for_ext(ext) else {
        return regex_fallback(content, ext);
    };
    let mut parser = Parser::new();
    if parser.set_language(&lang).is_err() {
        return regex_fallback(content, ext);
    }
    let Some(tree) = parser.parse(content, None) else {
        return regex_fallback(content, ext);
    };

    let root = tree.root_node();
    let source = content.as_bytes();
    let mut symbols = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        walk_node(&child, source, ext, 0, &mut symbols);
    }

    let imports = extract_imports(content, ext);
    let exports = extract_exports(content, ext, &symbols);
    let parse_errors = if root.has_error() {
        vec!["syntax errors present; parse is best-effort".to_string()]
    } else {
        Vec::new()
    };

    FileAst { symbols, imports, exports, parse_errors }
}

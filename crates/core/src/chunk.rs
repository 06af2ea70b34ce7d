//! C5 — ChunkExtractor: turn a file's content + extracted AST into a set of
//! retrievable [`Chunk`]s. Top-level symbols each become their own chunk
//! (spanning their full line range); any source not covered by a top-level
//! symbol (module preamble, free-standing statements) is gathered into a
//! trailing "rest of file" chunk so no content is silently dropped. Oversized
//! classes are split into an overview chunk plus one chunk per method.
//! Files with no top-level declarations fall back to fixed 100-line windows.

use crate::model::{chunk_id, Chunk, FileAst, Import, Scope, Symbol, SymbolType};

/// Fallback window size (lines) for files without top-level declarations.
const WINDOW_SIZE: usize = 100;
/// Names treated as a class's constructor when splitting an oversized class.
const CONSTRUCTOR_NAMES: &[&str] = &["new", "constructor", "__init__", "__new__"];
/// Lines kept in a class overview chunk when no constructor can be found.
const OVERVIEW_FALLBACK_LINES: usize = 40;
/// Lines appended after a constructor's end before closing the overview chunk.
const OVERVIEW_BUFFER_LINES: usize = 3;

/// Build chunks for one file from its raw lines and C4's extraction result.
/// `relative_path` and `file_path` are threaded through unchanged onto every
/// chunk produced. `max_chars` is the same embedding-size cap C6 enforces;
/// it also gates whether an oversized class gets split hierarchically.
pub fn extract_chunks(
    file_path: &str,
    relative_path: &str,
    language: &str,
    content: &str,
    ast: &FileAst,
    max_chars: usize,
) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut top_level: Vec<&Symbol> =
        ast.symbols.iter().filter(|s| s.scope != Some(Scope::Local)).collect();
    top_level.sort_by_key(|s| s.start_line);

    if top_level.is_empty() {
        return window_chunks(file_path, relative_path, language, &lines, ast);
    }

    let mut chunks = Vec::new();
    let mut covered_through = 0usize; // 1-based line number, exclusive upper bound already emitted

    for sym in &top_level {
        let start = sym.start_line.max(covered_through + 1);
        if start > lines.len() {
            continue;
        }
        let end = sym.end_line.max(start).min(lines.len());
        let span_chars: usize = lines[start - 1..end].iter().map(|l| l.len() + 1).sum();

        if sym.kind == SymbolType::Class && span_chars > max_chars {
            chunks.extend(hierarchical_class_chunks(
                file_path,
                relative_path,
                language,
                &lines,
                ast,
                sym,
                start,
                end,
            ));
        } else {
            let attached = symbols_in_range(&ast.symbols, start, end);
            let imports = imports_in_range(ast, end);
            chunks.push(build_chunk(
                file_path,
                relative_path,
                language,
                &lines,
                start,
                end,
                attached,
                imports,
                ast.exports.clone(),
            ));
        }
        covered_through = end;
    }

    if covered_through < lines.len() {
        let start = covered_through + 1;
        let end = lines.len();
        let attached = symbols_in_range(&ast.symbols, start, end);
        let imports = imports_in_range(ast, end);
        let trailing = build_chunk(
            file_path,
            relative_path,
            language,
            &lines,
            start,
            end,
            attached,
            imports,
            ast.exports.clone(),
        );
        if !trailing.content.trim().is_empty() || chunks.is_empty() {
            chunks.push(trailing);
        }
    }

    chunks
}

/// Safe fallback for files with no top-level declarations (data files,
/// prose, unsupported languages): fixed-size windows covering the whole file.
fn window_chunks(
    file_path: &str,
    relative_path: &str,
    language: &str,
    lines: &[&str],
    ast: &FileAst,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut start = 1;
    while start <= lines.len() {
        let end = (start + WINDOW_SIZE - 1).min(lines.len());
        let attached = symbols_in_range(&ast.symbols, start, end);
        let imports = imports_in_range(ast, end);
        chunks.push(build_chunk(
            file_path,
            relative_path,
            language,
            lines,
            start,
            end,
            attached,
            imports,
            ast.exports.clone(),
        ));
        start = end + 1;
    }
    chunks
}

/// Split an oversized class into an overview chunk (class header through its
/// constructor, or a fixed number of lines when no constructor is found) plus
/// one chunk per method, named `<ClassName>.<methodName>` via `symbols[0]`.
#[allow(clippy::too_many_arguments)]
fn hierarchical_class_chunks(
    file_path: &str,
    relative_path: &str,
    language: &str,
    lines: &[&str],
    ast: &FileAst,
    class_symbol: &Symbol,
    start: usize,
    end: usize,
) -> Vec<Chunk> {
    let class_name = class_symbol.name.clone();
    let mut methods: Vec<&Symbol> = ast
        .symbols
        .iter()
        .filter(|s| {
            s.kind == SymbolType::Method && s.start_line >= start && s.end_line <= end
        })
        .collect();
    methods.sort_by_key(|s| s.start_line);

    let constructor = methods.iter().find(|m| CONSTRUCTOR_NAMES.contains(&m.name.as_str()));
    let overview_end = match constructor {
        Some(ctor) => (ctor.end_line + OVERVIEW_BUFFER_LINES).min(end),
        None => (start + OVERVIEW_FALLBACK_LINES - 1).min(end),
    };

    let mut out = Vec::new();
    let overview_attached = symbols_in_range(&ast.symbols, start, overview_end);
    let overview_imports = imports_in_range(ast, overview_end);
    out.push(build_chunk(
        file_path,
        relative_path,
        language,
        lines,
        start,
        overview_end,
        overview_attached,
        overview_imports,
        ast.exports.clone(),
    ));

    for method in methods {
        if method.end_line <= overview_end {
            continue; // already covered by the overview (e.g. the constructor)
        }
        let m_start = method.start_line.max(start).max(overview_end + 1);
        let m_end = method.end_line.min(end);
        if m_start > m_end {
            continue;
        }
        let mut attached = symbols_in_range(&ast.symbols, m_start, m_end);
        let qualified = format!("{class_name}.{}", method.name);
        match attached.iter_mut().find(|s| s.name == method.name) {
            Some(primary) => primary.name = qualified,
            None => attached.insert(
                0,
                Symbol {
                    name: qualified,
                    kind: SymbolType::Method,
                    start_line: m_start,
                    end_line: m_end,
                    scope: method.scope,
                },
            ),
        }
        let imports = imports_in_range(ast, m_end);
        out.push(build_chunk(
            file_path,
            relative_path,
            language,
            lines,
            m_start,
            m_end,
            attached,
            imports,
            ast.exports.clone(),
        ));
    }

    out
}

fn symbols_in_range(symbols: &[Symbol], start: usize, end: usize) -> Vec<Symbol> {
    symbols.iter().filter(|s| s.overlaps(start, end)).cloned().collect()
}

/// Imports are cumulative: every import declared at or before `end` is
/// attached, not just ones whose own line falls within the chunk's span —
/// a chunk starting mid-file still needs the names its content references.
fn imports_in_range(ast: &FileAst, end: usize) -> Vec<Import> {
    ast.imports.iter().filter(|i| i.line <= end).cloned().collect()
}

#[allow(clippy::too_many_arguments)]
fn build_chunk(
    file_path: &str,
    relative_path: &str,
    language: &str,
    lines: &[&str],
    start: usize,
    end: usize,
    symbols: Vec<Symbol>,
    imports: Vec<Import>,
    exports: Vec<String>,
) -> Chunk {
    let content = lines[start - 1..end].join("\n");
    let id = chunk_id(file_path, start, &content);
    Chunk {
        id,
        content,
        file_path: file_path.to_string(),
        relative_path: relative_path.to_string(),
        start_line: start,
        end_line: end,
        language: language.to_string(),
        symbols,
        imports,
        exports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols;

    const DEFAULT_MAX_CHARS: usize = 8000;

    #[test]
    fn chunks_cover_every_line_exactly_once() {
        let content = "use std::fmt;\n\npub fn a() {\n    1\n}\n\npub fn b() {\n    2\n}\n";
        let ast = symbols::extract(content, "rs");
        let chunks =
            extract_chunks("/repo/src/lib.rs", "src/lib.rs", "rust", content, &ast, DEFAULT_MAX_CHARS);
        assert!(!chunks.is_empty());
        let mut covered = 0;
        for c in &chunks {
            assert_eq!(c.start_line, covered + 1);
            covered = c.end_line;
        }
        assert_eq!(covered, content.lines().count());
    }

    #[test]
    fn chunk_ids_are_stable_for_identical_content() {
        let content = "pub fn a() {}\n";
        let ast = symbols::extract(content, "rs");
        let c1 =
            extract_chunks("/repo/src/lib.rs", "src/lib.rs", "rust", content, &ast, DEFAULT_MAX_CHARS);
        let c2 =
            extract_chunks("/repo/src/lib.rs", "src/lib.rs", "rust", content, &ast, DEFAULT_MAX_CHARS);
        assert_eq!(c1[0].id, c2[0].id);
    }

    #[test]
    fn file_with_no_symbols_becomes_single_chunk() {
        let content = "# just a readme-like text file\nwith no code symbols\n";
        let ast = FileAst::default();
        let chunks = extract_chunks("/repo/NOTES", "NOTES", "unknown", content, &ast, DEFAULT_MAX_CHARS);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 2);
    }

    #[test]
    fn file_with_no_top_level_declarations_windows_by_100_lines() {
        let content = (1..=250).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n") + "\n";
        let ast = FileAst::default();
        let chunks = extract_chunks("/repo/data.csv", "data.csv", "unknown", &content, &ast, DEFAULT_MAX_CHARS);
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 100));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (101, 200));
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (201, 250));
    }

    #[test]
    fn imports_are_attached_cumulatively_regardless_of_chunk_start() {
        let mut content = String::from("use std::fmt;\n\n");
        for i in 0..30 {
            content.push_str(&format!("pub fn f{i}() {{\n    {i}\n}}\n\n"));
        }
        let ast = symbols::extract(&content, "rs");
        let chunks =
            extract_chunks("/repo/src/lib.rs", "src/lib.rs", "rust", &content, &ast, DEFAULT_MAX_CHARS);
        // A chunk far from the top of the file still carries the early `use`.
        let later_chunk = chunks.last().unwrap();
        assert!(later_chunk.start_line > 1);
        assert!(later_chunk.imports.iter().any(|i| i.module == "std::fmt"));
    }

    #[test]
    fn oversized_class_splits_into_overview_and_per_method_chunks() {
        let mut body = String::from("pub struct Widget {\n    id: u32,\n}\n\n");
        body.push_str("impl Widget {\n");
        body.push_str("    pub fn new() -> Self {\n        Widget { id: 0 }\n    }\n\n");
        for i in 0..40 {
            body.push_str(&format!(
                "    pub fn method_{i}(&self) -> u32 {{\n        self.id + {i}\n    }}\n\n"
            ));
        }
        body.push_str("}\n");

        // Force the hierarchical path with a tiny cap regardless of actual size.
        let ast = symbols::extract(&body, "rs");
        let chunks = extract_chunks("/repo/src/widget.rs", "src/widget.rs", "rust", &body, &ast, 50);
        assert!(chunks.len() > 2, "expected an overview chunk plus several method chunks");
        let method_chunk = chunks
            .iter()
            .find(|c| c.symbols.iter().any(|s| s.name.contains('.')))
            .expect("at least one per-method chunk should exist");
        let qualified = &method_chunk.symbols[0].name;
        assert!(qualified.starts_with("Widget."));
    }
}

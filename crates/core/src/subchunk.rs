//! C6 — SubChunker: split any [`Chunk`] whose content exceeds the
//! embedding provider's size cap into smaller pieces that still carry a
//! derived, stable id and a line range within the parent chunk.
//!
//! Splits prefer a closing-brace line near the cap so a block isn't torn
//! mid-statement more than unavoidable; this is a best-effort pass, not a
//! second parse. Pieces are cut directly from the parent's byte content so
//! their concatenation reproduces it exactly, including every newline.

use crate::model::Chunk;

/// Split `chunk` into pieces no larger than `max_chars`. Returns `vec![chunk]`
/// unchanged when it already fits. The returned pieces' content, concatenated
/// in order, is byte-identical to `chunk.content`.
pub fn subchunk(chunk: Chunk, max_chars: usize) -> Vec<Chunk> {
    if chunk.content.len() <= max_chars || max_chars == 0 {
        return vec![chunk];
    }

    let mut pieces = Vec::new();
    let content = chunk.content.as_str();
    let mut cursor = 0usize;
    let mut line_no = chunk.start_line;

    while cursor < content.len() {
        let remaining = &content[cursor..];
        let split_len =
            if remaining.len() <= max_chars { remaining.len() } else { find_split_boundary(remaining, max_chars) };
        let piece_content = &remaining[..split_len];
        let num_newlines = piece_content.matches('\n').count();
        let (piece_end_line, next_line) = if piece_content.ends_with('\n') {
            let end = line_no + num_newlines - 1;
            (end, end + 1)
        } else {
            let end = line_no + num_newlines;
            (end, end)
        };
        pieces.push(make_piece(&chunk, piece_content, line_no, piece_end_line));
        cursor += split_len;
        line_no = next_line;
    }

    pieces
}

/// Pick where to cut `remaining` no later than `max_chars` bytes in: prefer
/// the rightmost line ending in `}`, else the rightmost newline, else a hard
/// split at the cap. The returned offset always includes any newline found
/// in the head piece, so concatenating pieces reproduces the input exactly.
fn find_split_boundary(remaining: &str, max_chars: usize) -> usize {
    let window = &remaining[..max_chars.min(remaining.len())];
    if let Some(pos) = window.rfind("}\n") {
        return pos + 2;
    }
    if let Some(pos) = window.rfind('\n') {
        return pos + 1;
    }
    let hard = floor_char_boundary(remaining, max_chars.min(remaining.len()));
    if hard == 0 {
        return remaining.chars().next().map(|c| c.len_utf8()).unwrap_or(remaining.len());
    }
    hard
}

fn make_piece(parent: &Chunk, content: &str, start_line: usize, end_line: usize) -> Chunk {
    Chunk {
        id: String::new(),
        content: content.to_string(),
        file_path: parent.file_path.clone(),
        relative_path: parent.relative_path.clone(),
        start_line,
        end_line,
        language: parent.language.clone(),
        symbols: parent.symbols.iter().filter(|s| s.overlaps(start_line, end_line)).cloned().collect(),
        imports: parent.imports.clone(),
        exports: parent.exports.clone(),
    }
    .with_fresh_id()
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chunk;

    fn sample_chunk(content: &str) -> Chunk {
        Chunk {
            id: "x".into(),
            content: content.to_string(),
            file_path: "/repo/a.rs".into(),
            relative_path: "a.rs".into(),
            start_line: 1,
            end_line: content.lines().count().max(1),
            language: "rust".into(),
            symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    #[test]
    fn leaves_small_chunks_untouched() {
        let chunk = sample_chunk("fn a() {}\n");
        let out = subchunk(chunk.clone(), 8000);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, chunk.id);
    }

    #[test]
    fn splits_oversized_chunk_into_multiple_pieces() {
        let big_line = "x".repeat(50);
        let content = std::iter::repeat(big_line).take(20).collect::<Vec<_>>().join("\n");
        let chunk = sample_chunk(&content);
        let out = subchunk(chunk, 200);
        assert!(out.len() > 1);
        for piece in &out {
            assert!(piece.content.len() <= 200);
        }
    }

    #[test]
    fn piece_ids_are_unique() {
        let big_line = "y".repeat(60);
        let content = std::iter::repeat(big_line).take(10).collect::<Vec<_>>().join("\n");
        let chunk = sample_chunk(&content);
        let out = subchunk(chunk, 150);
        let mut ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), out.len());
    }

    #[test]
    fn pieces_concatenate_back_to_the_original_content_exactly() {
        let mut content = String::new();
        for i in 0..30 {
            content.push_str(&format!("fn f{i}() {{\n    let x = {i};\n    x + 1\n}}\n\n"));
        }
        let chunk = sample_chunk(&content);
        let out = subchunk(chunk, 120);
        assert!(out.len() >= 5);
        let rebuilt: String = out.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn pieces_concatenate_exactly_with_no_brace_or_newline_boundaries() {
        let content = "x".repeat(1000);
        let chunk = sample_chunk(&content);
        let out = subchunk(chunk, 120);
        let rebuilt: String = out.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn prefers_a_closing_brace_boundary_over_a_plain_newline() {
        let content = "fn a() {\n    1\n}\nlet filler_line_to_push_past_the_cap_xxxx = 1;\n";
        let chunk = sample_chunk(content);
        let out = subchunk(chunk, 20);
        assert!(out[0].content.ends_with("}\n"));
    }
}

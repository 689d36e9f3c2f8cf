//! Book input loading and chapter chunking

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Chunk size ceiling in characters, roughly 400 tokens.
pub const MAX_CHUNK_CHARS: usize = 1200;

/// Tail carried into the next chunk so sentences are not cut blind.
pub const CHUNK_OVERLAP_CHARS: usize = 200;

/// One chapter of source material as loaded from the book JSON file
/// (a list of `{title, content}` objects).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterSource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Load a book's chapters from a JSON file.
pub fn load_book(path: &Path) -> Result<Vec<ChapterSource>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading book {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding book {}", path.display()))
}

/// Split chapter text into translatable chunks: paragraphs accumulate until
/// the character ceiling, and each new chunk starts with the tail of the
/// previous one so context is not lost at the boundary.
pub fn split_chapter_into_chunks(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split('\n') {
        if current.len() + paragraph.len() <= max_chars {
            current.push_str(paragraph);
            current.push('\n');
        } else {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            let tail = tail_chars(&current, overlap).to_string();
            current = tail;
            current.push_str(paragraph);
            current.push('\n');
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    chunks
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    let char_count = s.chars().count();
    if char_count <= n {
        return s;
    }
    let skip = char_count - n;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_chapter_into_chunks("one paragraph", MAX_CHUNK_CHARS, 10);
        assert_eq!(chunks, vec!["one paragraph"]);
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let p1 = "a".repeat(80);
        let p2 = "b".repeat(80);
        let p3 = "c".repeat(80);
        let text = format!("{p1}\n{p2}\n{p3}");

        let chunks = split_chapter_into_chunks(&text, 100, 20);
        assert!(chunks.len() >= 2);
        // Each later chunk starts with the tail of what came before.
        assert!(chunks[1].starts_with(&"a".repeat(19)));
        // Nothing was lost.
        let joined = chunks.join("");
        assert!(joined.contains(&"c".repeat(80)));
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        assert!(split_chapter_into_chunks("\n\n  \n", MAX_CHUNK_CHARS, 10).is_empty());
    }

    #[test]
    fn tail_is_char_boundary_safe() {
        let s = "héllo wörld";
        let tail = tail_chars(s, 4);
        assert_eq!(tail, "örld");
    }
}

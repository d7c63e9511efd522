//! Fixed-window character chunker with overlap.
//!
//! Windows are `chunk_chars` characters wide (Unicode scalar values, not
//! bytes) and advance by `max(1, chunk_chars - overlap)`. Each window is
//! trimmed and windows that are empty after trimming are dropped. `max_chunks`
//! caps the kept chunks. The chunker is a pure function of its arguments.
//!
//! [`build_chunks`] attaches indices and content-addressed ids to the
//! windows of one document.

use crate::identity;
use crate::models::Chunk;

/// Split `text` into overlapping windows.
///
/// `max_chunks == 0` means unlimited. Iteration stops once a window reaches
/// the end of the text or `max_chunks` chunks have been kept.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap: usize, max_chunks: usize) -> Vec<String> {
    if text.is_empty() || chunk_chars == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let step = chunk_chars.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let end = len.min(start + chunk_chars);
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= len {
            break;
        }
        if max_chunks > 0 && chunks.len() >= max_chunks {
            break;
        }
        start += step;
    }

    chunks
}

/// Number the windows of one document and derive their chunk ids.
pub fn build_chunks(doc_id: &str, chunker_version: &str, texts: Vec<String>) -> Vec<Chunk> {
    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            id: identity::chunk_id(doc_id, chunker_version, &text),
            doc_id: doc_id.to_string(),
            index,
            text,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_windows() {
        let chunks = chunk_text("abcdefghij", 4, 1, 0);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 4, 1, 0).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        assert_eq!(chunk_text("Hello, world!", 1200, 200, 0), vec!["Hello, world!"]);
    }

    #[test]
    fn test_windows_are_trimmed() {
        assert_eq!(chunk_text("ab  cd", 3, 0, 0), vec!["ab", "cd"]);
    }

    #[test]
    fn test_blank_windows_do_not_count_toward_cap() {
        let text = "ab    cd  ef";
        assert_eq!(chunk_text(text, 2, 0, 0), vec!["ab", "cd", "ef"]);
        assert_eq!(chunk_text(text, 2, 0, 2), vec!["ab", "cd"]);
    }

    #[test]
    fn test_max_chunks_cap() {
        let chunks = chunk_text("abcdefghij", 4, 1, 2);
        assert_eq!(chunks, vec!["abcd", "defg"]);
    }

    #[test]
    fn test_overlap_not_smaller_than_width_steps_by_one() {
        let chunks = chunk_text("abcd", 2, 5, 0);
        assert_eq!(chunks, vec!["ab", "bc", "cd"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunks = chunk_text("héllo wörld", 5, 0, 0);
        assert_eq!(chunks, vec!["héllo", "wörl", "d"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let a = chunk_text(text, 12, 4, 0);
        let b = chunk_text(text, 12, 4, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_chunks_indices_and_ids() {
        let chunks = build_chunks("doc1", "chars_v1", chunk_text("abcdefghij", 4, 1, 0));
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.doc_id, "doc1");
            assert_eq!(c.id, identity::chunk_id("doc1", "chars_v1", &c.text));
        }
    }
}

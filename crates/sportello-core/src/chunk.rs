//! Section-aware text chunker.
//!
//! Splits document text into bounded, optionally overlapping pieces ready
//! to be stored as [`Chunk`]s.
//!
//! # Algorithm
//!
//! 1. Empty text yields nothing; text shorter than `chunk_size` yields a
//!    single piece.
//! 2. If the text contains outline-numbered section headers (a newline,
//!    digits, whitespace, then an upper-case letter, e.g. `"\n13 CUP 2.0"`),
//!    split at the headers and greedily pack whole sections into pieces of
//!    at most `chunk_size` characters. A section longer than `chunk_size`
//!    is cut with the fixed-window algorithm below.
//! 3. Otherwise cut fixed windows of `chunk_size` characters, advancing by
//!    `chunk_size - overlap`.
//! 4. [`chunk_document`] trims every piece and drops those shorter than the
//!    configured minimum.
//!
//! All lengths are measured in characters, never bytes.
//!
//! # Example
//!
//! ```rust
//! use sportello_core::chunk::split_text;
//!
//! let pieces = split_text("breve testo", 1000, 200).unwrap();
//! assert_eq!(pieces, vec!["breve testo".to_string()]);
//! ```

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{Chunk, DocumentKind};

/// Chunking parameters for one document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Pieces whose trimmed length is below this are discarded as noise.
    pub min_chars: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunk window: chunk_size={chunk_size}, overlap={overlap} (overlap must be smaller than chunk_size)")]
    InvalidWindow { chunk_size: usize, overlap: usize },
}

fn section_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"\n\d+\s+[A-Z]").expect("static regex"))
}

fn check_window(chunk_size: usize, overlap: usize) -> Result<(), ChunkError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(ChunkError::InvalidWindow {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Split `text` into pieces of at most `chunk_size` characters, keeping
/// numbered sections intact when possible.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    check_window(chunk_size, overlap)?;

    if text.is_empty() {
        return Ok(Vec::new());
    }
    if text.chars().count() < chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let sections = split_sections(text);
    if sections.len() <= 1 {
        return split_simple(text, chunk_size, overlap);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for section in sections {
        let section_len = section.chars().count();
        if current_len + section_len <= chunk_size {
            current.push_str(section);
            current_len += section_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if section_len > chunk_size {
            chunks.extend(split_simple(section, chunk_size, overlap)?);
        } else {
            current.push_str(section);
            current_len = section_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}

/// Cut `text` into fixed windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one.
pub fn split_simple(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    check_window(chunk_size, overlap)?;

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += step;
    }

    Ok(chunks)
}

/// Split at numbered section headers.
///
/// Each header stays at the start of its own section; text before the first
/// header becomes a section of its own when it is not blank. Returns a single
/// element when no header is present.
fn split_sections(text: &str) -> Vec<&str> {
    let starts: Vec<usize> = section_header()
        .find_iter(text)
        .map(|m| m.start())
        .collect();

    if starts.is_empty() {
        return vec![text];
    }

    let mut sections = Vec::with_capacity(starts.len() + 1);
    let prefix = &text[..starts[0]];
    if !prefix.trim().is_empty() {
        sections.push(prefix);
    }
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        sections.push(&text[start..end]);
    }
    sections
}

/// Run [`split_text`] and keep only trimmed pieces of at least `min_chars`.
pub fn chunk_document(text: &str, params: &ChunkParams) -> Result<Vec<String>, ChunkError> {
    let pieces = split_text(text, params.chunk_size, params.overlap)?;
    Ok(filter_min_len(pieces, params.min_chars))
}

/// Trim every piece and drop those whose trimmed length is below `min_chars`.
pub fn filter_min_len(pieces: Vec<String>, min_chars: usize) -> Vec<String> {
    pieces
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && p.chars().count() >= min_chars)
        .collect()
}

/// Serialize one CSV row as `"column: value | column: value"`, skipping
/// empty values.
pub fn csv_row_text(headers: &[String], row: &[String]) -> String {
    headers
        .iter()
        .zip(row.iter())
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Wrap chunk texts into [`Chunk`]s with contiguous sequence indices.
pub fn make_chunks(source_id: &str, kind: DocumentKind, texts: Vec<String>) -> Vec<Chunk> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk::new(source_id, kind, i as i64, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorem(n: usize) -> String {
        "abcdefghij".chars().cycle().take(n).collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("Hello, world!", 100, 10).unwrap();
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_invalid_window_rejected() {
        assert_eq!(
            split_text("abc", 10, 10),
            Err(ChunkError::InvalidWindow {
                chunk_size: 10,
                overlap: 10
            })
        );
        assert!(split_simple("abc", 10, 25).is_err());
        assert!(split_text("abc", 0, 0).is_err());
    }

    #[test]
    fn test_simple_windows_and_overlap() {
        let text = lorem(250);
        let chunks = split_simple(&text, 100, 20).unwrap();
        // starts at 0, 80, 160, 240
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].chars().count(), 100);
        assert_eq!(chunks[3].chars().count(), 10);
        let tail: String = chunks[0].chars().skip(80).collect();
        let head: String = chunks[1].chars().take(20).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn test_no_overlap_reproduces_input() {
        let text = lorem(1234);
        let chunks = split_text(&text, 100, 0).unwrap();
        assert_eq!(chunks.concat(), text);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_multibyte_text_is_split_on_chars() {
        let text = "è".repeat(300);
        let chunks = split_text(&text, 100, 0).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() == 100));
    }

    #[test]
    fn test_sections_are_kept_whole() {
        let body = "x".repeat(60);
        let text = format!(
            "Premessa generale del manuale.\n12 ANAGRAFE\n{body}\n13 CUP 2.0\nIl CUP 2.0 è attivo 24/7. Telefono: 055-123456.\n14 CIS CARDIOLOGIA\n{body}"
        );
        let chunks = split_text(&text, 120, 20).unwrap();
        let cup = chunks
            .iter()
            .find(|c| c.contains("13 CUP 2.0"))
            .expect("CUP section present");
        assert!(cup.contains("Telefono: 055-123456."));
        for c in &chunks {
            assert!(c.chars().count() <= 120, "chunk too long: {}", c.len());
        }
        // nothing lost
        let joined = chunks.concat();
        assert!(joined.contains("Premessa generale"));
        assert!(joined.contains("14 CIS CARDIOLOGIA"));
    }

    #[test]
    fn test_sections_packed_greedily() {
        let text = "intro\n1 Alfa uno\n2 Beta due\n3 Gamma tre\n4 Delta quattro";
        let chunks = split_text(text, 30, 5).unwrap();
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.chars().count() <= 30);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_oversized_section_is_split() {
        let big = "y".repeat(250);
        let text = format!("\n1 Alfa\n{big}\n2 Beta breve");
        let chunks = split_text(&text, 100, 10).unwrap();
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
        assert!(chunks.iter().any(|c| c.contains("2 Beta breve")));
    }

    #[test]
    fn test_min_length_filter() {
        let params = ChunkParams {
            chunk_size: 100,
            overlap: 0,
            min_chars: 50,
        };
        let text = format!("{}{}", lorem(100), lorem(30));
        let chunks = chunk_document(&text, &params).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks.iter().all(|c| c.trim().chars().count() >= 50));
    }

    #[test]
    fn test_csv_row_text_skips_empty() {
        let headers = vec!["Reparto".to_string(), "Telefono".to_string(), "Note".to_string()];
        let row = vec!["Cardiologia".to_string(), "055-1".to_string(), "".to_string()];
        assert_eq!(csv_row_text(&headers, &row), "Reparto: Cardiologia | Telefono: 055-1");
    }

    #[test]
    fn test_make_chunks_indices() {
        let chunks = make_chunks(
            "doc.txt",
            DocumentKind::Text,
            vec!["uno".into(), "due".into(), "tre".into()],
        );
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i as i64);
            assert_eq!(c.id, format!("doc.txt_{}", i));
        }
    }
}

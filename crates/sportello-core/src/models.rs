//! Core data models shared by the loader, the retriever, and the answer
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of leading characters kept in [`Chunk::preview`].
pub const PREVIEW_CHARS: usize = 100;

/// The kind of source a document was loaded from.
///
/// Each variant has its own text extraction and chunking defaults, but all
/// of them feed the same chunk-and-store pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Csv,
    Pdf,
}

impl DocumentKind {
    /// Guess the kind from a file name extension (case-insensitive).
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(Self::Text),
            "csv" => Some(Self::Csv),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }

    /// Short upper-case label used in user-facing load reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "TXT",
            Self::Csv => "CSV",
            Self::Pdf => "PDF",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            other => anyhow::bail!("Unknown document kind: '{}'. Use text, csv, or pdf.", other),
        }
    }
}

/// A bounded piece of a source document, stored as an independently
/// retrievable unit.
///
/// Chunks are immutable once stored. Reloading a source deletes every chunk
/// with the same `source_id` and inserts a fresh set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Store key: `"{source_id}_{index}"` (`"{source_id}_row_{index}"` for CSV rows).
    pub id: String,
    pub text: String,
    pub source_id: String,
    pub sequence_index: i64,
    /// Length of `text` in characters.
    pub char_length: i64,
    pub created_at: DateTime<Utc>,
    /// First [`PREVIEW_CHARS`] characters of `text`.
    pub preview: String,
    pub kind: DocumentKind,
}

impl Chunk {
    pub fn new(source_id: &str, kind: DocumentKind, sequence_index: i64, text: String) -> Self {
        let id = match kind {
            DocumentKind::Csv => format!("{}_row_{}", source_id, sequence_index),
            _ => format!("{}_{}", source_id, sequence_index),
        };
        let preview = text.chars().take(PREVIEW_CHARS).collect();
        Self {
            id,
            char_length: text.chars().count() as i64,
            text,
            source_id: source_id.to_string(),
            sequence_index,
            created_at: Utc::now(),
            preview,
            kind,
        }
    }
}

/// Which query formulation produced a retrieved passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrigin {
    Primary,
    KeywordExpansion,
}

/// A chunk returned by the retriever together with its distance to the query.
///
/// Constructed per request and discarded once the answer is composed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub chunk: Chunk,
    /// Cosine distance, lower is more similar. Always `>= 0`.
    pub distance: f64,
    pub origin: QueryOrigin,
}

/// One question/answer exchange kept to prime later prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Summary of what the store currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_chunks: i64,
    /// Distinct source ids, sorted.
    pub sources: Vec<String>,
}

impl StoreStats {
    /// Human-readable one-line summary shown by `/stats` and `sportello stats`.
    pub fn summary(&self) -> String {
        if self.total_chunks == 0 {
            return "📊 Database vuoto.".to_string();
        }
        format!(
            "📊 Database: {} chunks da {} file(s): {}",
            self.total_chunks,
            self.sources.len(),
            self.sources.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(DocumentKind::from_path("documento.txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_path("elenco.CSV"), Some(DocumentKind::Csv));
        assert_eq!(DocumentKind::from_path("manuale.pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path("archivio.zip"), None);
        assert_eq!(DocumentKind::from_path("senza_estensione"), None);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("PDF".parse::<DocumentKind>().unwrap(), DocumentKind::Pdf);
        assert!("docx".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_chunk_ids_and_preview() {
        let long = "à".repeat(150);
        let c = Chunk::new("doc.txt", DocumentKind::Text, 3, long);
        assert_eq!(c.id, "doc.txt_3");
        assert_eq!(c.char_length, 150);
        assert_eq!(c.preview.chars().count(), PREVIEW_CHARS);

        let row = Chunk::new("elenco.csv", DocumentKind::Csv, 0, "a: b".to_string());
        assert_eq!(row.id, "elenco.csv_row_0");
    }

    #[test]
    fn test_stats_summary() {
        assert_eq!(StoreStats::default().summary(), "📊 Database vuoto.");
        let stats = StoreStats {
            total_chunks: 4,
            sources: vec!["a.txt".into(), "b.csv".into()],
        };
        assert_eq!(stats.summary(), "📊 Database: 4 chunks da 2 file(s): a.txt, b.csv");
    }
}

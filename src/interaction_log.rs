//! Append-only JSONL record of answered questions.
//!
//! One line per chat turn that went through retrieval, for offline review
//! of what was asked, what was retrieved, and how confident the answer was.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use sportello_core::answer::AnswerOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct PassageRef {
    pub source_id: String,
    pub sequence_index: i64,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub ts: DateTime<Utc>,
    pub session: String,
    pub question: String,
    pub answer: String,
    pub passages: Vec<PassageRef>,
    pub confidence: f64,
    pub strategy: String,
}

impl InteractionRecord {
    pub fn new(session: &str, question: &str, outcome: &AnswerOutcome) -> Self {
        Self {
            ts: Utc::now(),
            session: session.to_string(),
            question: question.to_string(),
            answer: outcome.text.clone(),
            passages: outcome
                .passages
                .iter()
                .map(|p| PassageRef {
                    source_id: p.chunk.source_id.clone(),
                    sequence_index: p.chunk.sequence_index,
                    distance: p.distance,
                })
                .collect(),
            confidence: outcome.confidence,
            strategy: outcome.strategy.as_str().to_string(),
        }
    }
}

/// Serializes appends to one JSONL file.
pub struct InteractionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &InteractionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open interaction log {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sportello_core::answer::AnswerStrategy;
    use sportello_core::models::{Chunk, DocumentKind, QueryOrigin, RetrievedPassage};

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = InteractionLog::new(dir.path().join("logs/interactions.jsonl"));
        let outcome = AnswerOutcome {
            text: "Il CUP è attivo 24/7.".into(),
            confidence: 0.82,
            strategy: AnswerStrategy::Generated,
            validated: None,
            passages: vec![RetrievedPassage {
                chunk: Chunk::new("documento.txt", DocumentKind::Text, 4, "testo".into()),
                distance: 0.25,
                origin: QueryOrigin::Primary,
            }],
        };

        log.append(&InteractionRecord::new("s1", "orari CUP?", &outcome)).await.unwrap();
        log.append(&InteractionRecord::new("s2", "altro?", &outcome)).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["session"], "s1");
        assert_eq!(first["strategy"], "generated");
        assert_eq!(first["passages"][0]["source_id"], "documento.txt");
        assert_eq!(first["passages"][0]["sequence_index"], 4);
        assert_eq!(first["confidence"], 0.82);
    }
}

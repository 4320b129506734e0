//! SQLite-backed [`Store`] implementation.
//!
//! One row per chunk in the `chunks` table, with its embedding stored as a
//! little-endian f32 BLOB next to the text. Queries are a brute-force cosine
//! scan over the vectors written by the current embedding model, which is
//! plenty for a handful of manuals.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use sportello_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob, Embedder};
use sportello_core::models::{Chunk, DocumentKind, StoreStats};
use sportello_core::store::{Store, StoreHit};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::{db, migrate};

/// SQLite implementation of the [`Store`] trait.
///
/// Embeds chunk text and queries with the configured [`Embedder`]; rows
/// written by a different model are ignored by [`Store::query`].
pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Connect, ensure the schema exists, and wrap the pool with the configured
/// embedder.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let embedder = create_embedder(&config.embedding)?;
    Ok(SqliteStore::new(pool, embedder))
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Store for SqliteStore {
    async fn delete_source(&self, source_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn add(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let model = self.embedder.model_name().to_string();
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_id, sequence_index, kind, text, char_length,
                                    created_at, preview, model, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source_id = excluded.source_id,
                    sequence_index = excluded.sequence_index,
                    kind = excluded.kind,
                    text = excluded.text,
                    char_length = excluded.char_length,
                    created_at = excluded.created_at,
                    preview = excluded.preview,
                    model = excluded.model,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(chunk.sequence_index)
            .bind(chunk.kind.as_str())
            .bind(&chunk.text)
            .bind(chunk.char_length)
            .bind(chunk.created_at.to_rfc3339())
            .bind(&chunk.preview)
            .bind(&model)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, text: &str, n: usize) -> Result<Vec<StoreHit>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        let rows = sqlx::query(
            r#"
            SELECT id, source_id, sequence_index, kind, text, char_length,
                   created_at, preview, embedding
            FROM chunks
            WHERE model = ?
            "#,
        )
        .bind(self.embedder.model_name())
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<StoreHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let kind: String = row.get("kind");
                let created_at: String = row.get("created_at");
                StoreHit {
                    distance: cosine_distance(&query_vec, &blob_to_vec(&blob)),
                    chunk: Chunk {
                        id: row.get("id"),
                        text: row.get("text"),
                        source_id: row.get("source_id"),
                        sequence_index: row.get("sequence_index"),
                        char_length: row.get("char_length"),
                        created_at: parse_ts(&created_at),
                        preview: row.get("preview"),
                        kind: kind.parse().unwrap_or(DocumentKind::Text),
                    },
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n);

        debug!(scanned = rows.len(), returned = hits.len(), "vector scan");
        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let sources: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT source_id FROM chunks ORDER BY source_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(StoreStats {
            total_chunks,
            sources,
        })
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

//! In-memory [`Store`] implementation for tests and embedding-free setups.
//!
//! Chunks and their vectors live in a `Vec` behind `std::sync::RwLock`.
//! Queries are brute-force cosine distance over everything stored.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_distance, Embedder, TrigramEmbedder};
use crate::models::{Chunk, StoreStats};

use super::{Store, StoreHit};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory store.
pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(TrigramEmbedder::default()))
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn delete_source(&self, source_id: &str) -> Result<u64> {
        let mut guard = self.chunks.write().map_err(poisoned)?;
        let before = guard.len();
        guard.retain(|sc| sc.chunk.source_id != source_id);
        Ok((before - guard.len()) as u64)
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

        let mut guard = self.chunks.write().map_err(poisoned)?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            guard.retain(|sc| sc.chunk.id != chunk.id);
            guard.push(StoredChunk {
                chunk: chunk.clone(),
                vector,
            });
        }
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
            .ok_or_else(|| anyhow!("embedder returned no vector for query"))?;

        let guard = self.chunks.read().map_err(poisoned)?;
        let mut hits: Vec<StoreHit> = guard
            .iter()
            .map(|sc| StoreHit {
                chunk: sc.chunk.clone(),
                distance: cosine_distance(&query_vec, &sc.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n);
        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let guard = self.chunks.read().map_err(poisoned)?;
        let sources: BTreeSet<String> = guard.iter().map(|sc| sc.chunk.source_id.clone()).collect();
        Ok(StoreStats {
            total_chunks: guard.len() as i64,
            sources: sources.into_iter().collect(),
        })
    }
}

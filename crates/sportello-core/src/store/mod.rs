//! Storage abstraction for Sportello.
//!
//! The [`Store`] trait is everything the loader and the retriever need from a
//! vector store. Stores embed text themselves, so callers only ever hand over
//! chunk text and query strings.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, StoreStats};

/// A stored chunk matched by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub chunk: Chunk,
    /// Cosine distance to the query, `>= 0`, lower is closer.
    pub distance: f64,
}

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`delete_source`](Store::delete_source) | Remove every chunk of one source |
/// | [`add`](Store::add) | Embed and insert a batch of chunks |
/// | [`query`](Store::query) | Nearest chunks to a text, closest first |
/// | [`stats`](Store::stats) | Chunk count and distinct sources |
#[async_trait]
pub trait Store: Send + Sync {
    /// Delete all chunks whose `source_id` matches. Returns how many were removed.
    async fn delete_source(&self, source_id: &str) -> Result<u64>;

    /// Embed and insert `chunks`. Existing ids are overwritten.
    async fn add(&self, chunks: &[Chunk]) -> Result<()>;

    /// Return up to `n` chunks nearest to `text`, sorted by ascending distance.
    /// An empty store returns an empty list.
    async fn query(&self, text: &str, n: usize) -> Result<Vec<StoreHit>>;

    async fn stats(&self) -> Result<StoreStats>;

    async fn count(&self) -> Result<i64> {
        Ok(self.stats().await?.total_chunks)
    }
}

//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every store uses to turn text into
//! vectors, the deterministic [`TrigramEmbedder`] used by default, and pure
//! helpers for vector serialization and similarity.
//!
//! Remote providers (OpenAI-compatible endpoints) live in the `sportello`
//! app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Default dimensionality of [`TrigramEmbedder`] vectors.
pub const DEFAULT_TRIGRAM_DIMS: usize = 384;

/// Turns texts into fixed-size vectors.
///
/// Implementations must return exactly one vector of [`dims`](Embedder::dims)
/// floats per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded next to stored vectors.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Hashed character-trigram embedder.
///
/// Needs no network and no model files, and gives stable vectors across
/// runs, so stored embeddings stay valid after a restart.
#[derive(Debug, Clone)]
pub struct TrigramEmbedder {
    dims: usize,
}

impl TrigramEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for TrigramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGRAM_DIMS)
    }
}

#[async_trait]
impl Embedder for TrigramEmbedder {
    fn model_name(&self) -> &str {
        "trigram-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| trigram_embedding(t, self.dims))
            .collect())
    }
}

// FNV-1a, stable across platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Embed `text` as an L2-normalized bag of hashed character trigrams plus
/// whole words.
///
/// Text is lower-cased and each word is padded with spaces so that word
/// boundaries contribute their own trigrams. All components are
/// non-negative, so cosine similarity between two embeddings lies in
/// `[0, 1]`. Empty text yields the zero vector.
pub fn trigram_embedding(text: &str, dims: usize) -> Vec<f32> {
    let dims = dims.max(1);
    let mut vec = vec![0.0f32; dims];
    let lowered = text.to_lowercase();

    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            let gram: String = window.iter().collect();
            let slot = (fnv1a(gram.as_bytes()) % dims as u64) as usize;
            vec[slot] += 1.0;
        }
        let slot = (fnv1a(word.as_bytes()) % dims as u64) as usize;
        vec[slot] += 2.0;
    }

    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut vec {
            *x /= norm;
        }
    }
    vec
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use sportello_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero, or
/// mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance `1 - cos`, clamped to be non-negative.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    (1.0 - f64::from(cosine_similarity(a, b))).max(0.0)
}

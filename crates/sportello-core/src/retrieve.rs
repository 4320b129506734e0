//! Passage retrieval: primary query, keyword expansion, merge, filter.
//!
//! # Pipeline
//!
//! ```text
//! question ──▶ store.query(question, k) ──────────────┐
//!     │                                                ├─▶ dedup ─▶ distance/length filter ─▶ sort ─▶ top k
//!     └─▶ 3 longest words ─▶ store.query(words, k/3) ──┘
//! ```
//!
//! The expansion pass recovers exact-term matches (department names,
//! acronyms) that the semantic query for the whole sentence ranks low.
//!
//! Near-duplicates are detected with the Jaccard similarity of the
//! lower-cased first-N-word sets of two passages. Candidates from both
//! queries are considered nearest first, and one that is a near-duplicate of
//! a passage already kept is dropped, so of two overlapping chunks the closer
//! one survives whichever query found it.

use std::collections::HashSet;

use anyhow::Result;
use tracing::debug;

use crate::models::{QueryOrigin, RetrievedPassage};
use crate::store::{Store, StoreHit};

/// Retrieval tuning knobs. Defaults match the production deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Candidates requested by the primary query and passages returned.
    pub k: usize,
    /// Passages farther than `min_distance + distance_margin` are dropped.
    pub distance_margin: f64,
    /// Absolute cut-off used when no finite distance is available.
    pub fallback_threshold: f64,
    /// Passages whose trimmed length is not above this are dropped.
    pub min_content_chars: usize,
    pub dedup_jaccard: f64,
    pub dedup_prefix_words: usize,
    pub expansion_words: usize,
    /// Only words strictly longer than this take part in expansion.
    pub expansion_min_word_chars: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 10,
            distance_margin: 0.4,
            fallback_threshold: 1.5,
            min_content_chars: 50,
            dedup_jaccard: 0.7,
            dedup_prefix_words: 20,
            expansion_words: 3,
            expansion_min_word_chars: 4,
        }
    }
}

/// Retrieve the passages most relevant to `question`, nearest first.
///
/// An empty store yields an empty list, never an error.
pub async fn search(
    store: &dyn Store,
    question: &str,
    params: &RetrievalParams,
) -> Result<Vec<RetrievedPassage>> {
    if params.k == 0 {
        return Ok(Vec::new());
    }

    let primary = store.query(question, params.k).await?;

    let keywords = keyword_expansion(question, params.expansion_words, params.expansion_min_word_chars);
    let secondary = if keywords.is_empty() {
        Vec::new()
    } else {
        let n = std::cmp::max(3, params.k / 3);
        store.query(&keywords.join(" "), n).await?
    };

    debug!(
        primary = primary.len(),
        secondary = secondary.len(),
        keywords = ?keywords,
        "retrieval candidates"
    );

    let merged = merge(primary, secondary, params);
    Ok(filter_and_rank(merged, params))
}

fn merge(primary: Vec<StoreHit>, secondary: Vec<StoreHit>, params: &RetrievalParams) -> Vec<RetrievedPassage> {
    let mut kept: Vec<RetrievedPassage> = Vec::with_capacity(primary.len() + secondary.len());
    let mut kept_words: Vec<HashSet<String>> = Vec::new();

    let mut tagged: Vec<(StoreHit, QueryOrigin)> = primary
        .into_iter()
        .map(|h| (h, QueryOrigin::Primary))
        .chain(secondary.into_iter().map(|h| (h, QueryOrigin::KeywordExpansion)))
        .collect();
    // stable: on ties the primary hit comes first
    tagged.sort_by(|(a, _), (b, _)| a.distance.total_cmp(&b.distance));

    for (hit, origin) in tagged {
        if kept.iter().any(|p| p.chunk.id == hit.chunk.id) {
            continue;
        }
        let words = prefix_words(&hit.chunk.text, params.dedup_prefix_words);
        if kept_words
            .iter()
            .any(|other| jaccard(&words, other) > params.dedup_jaccard)
        {
            continue;
        }
        kept_words.push(words);
        kept.push(RetrievedPassage {
            chunk: hit.chunk,
            distance: hit.distance,
            origin,
        });
    }
    kept
}

fn filter_and_rank(passages: Vec<RetrievedPassage>, params: &RetrievalParams) -> Vec<RetrievedPassage> {
    let min_distance = passages
        .iter()
        .map(|p| p.distance)
        .filter(|d| d.is_finite())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.min(d))));
    let threshold = match min_distance {
        Some(min) => min + params.distance_margin,
        None => params.fallback_threshold,
    };

    let mut relevant: Vec<RetrievedPassage> = passages
        .into_iter()
        .filter(|p| p.distance <= threshold)
        .filter(|p| p.chunk.text.trim().chars().count() > params.min_content_chars)
        .collect();

    relevant.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    relevant.truncate(params.k);
    relevant
}

/// The `n` longest distinct words of `question` longer than `min_chars`
/// characters, longest first.
pub fn keyword_expansion(question: &str, n: usize, min_chars: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut words: Vec<&str> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > min_chars)
        .filter(|w| seen.insert(w.to_lowercase()))
        .collect();
    // stable: equal lengths keep question order
    words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    words.into_iter().take(n).map(str::to_string).collect()
}

fn prefix_words(text: &str, n: usize) -> HashSet<String> {
    text.split_whitespace()
        .take(n)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`; `0.0` when both sets are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Jaccard similarity of the lower-cased first `n` words of two texts.
pub fn prefix_jaccard(a: &str, b: &str, n: usize) -> f64 {
    jaccard(&prefix_words(a, n), &prefix_words(b, n))
}

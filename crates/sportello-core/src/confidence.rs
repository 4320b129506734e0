//! Answer reliability heuristic derived from retrieval quality.

use crate::models::RetrievedPassage;

const DISTANCE_WEIGHT: f64 = 0.6;
const COUNT_WEIGHT: f64 = 0.3;
const LENGTH_WEIGHT: f64 = 0.1;
/// Passage count at which the count component saturates.
const FULL_COUNT: f64 = 5.0;
/// Average passage length (chars) at which the length component saturates.
const FULL_LENGTH: f64 = 500.0;

/// Score in `[0, 1]`, rounded to two decimals.
///
/// `0.6·max(0, 1 − avg_distance) + 0.3·min(1, count/5) + 0.1·min(1, avg_len/500)`.
/// An empty slice scores `0.0`.
pub fn score(passages: &[RetrievedPassage]) -> f64 {
    if passages.is_empty() {
        return 0.0;
    }

    let n = passages.len() as f64;
    let avg_distance = passages.iter().map(|p| p.distance).sum::<f64>() / n;
    let avg_len = passages
        .iter()
        .map(|p| p.chunk.text.chars().count() as f64)
        .sum::<f64>()
        / n;

    let distance_score = (1.0 - avg_distance).max(0.0);
    let count_score = (n / FULL_COUNT).min(1.0);
    let length_score = (avg_len / FULL_LENGTH).min(1.0);

    let raw = DISTANCE_WEIGHT * distance_score + COUNT_WEIGHT * count_score + LENGTH_WEIGHT * length_score;
    if !raw.is_finite() {
        return 0.0;
    }
    ((raw * 100.0).round() / 100.0).clamp(0.0, 1.0)
}

/// Confidence as a whole percentage, for display.
pub fn as_percent(confidence: f64) -> u32 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, DocumentKind, QueryOrigin};

    fn passage(len: usize, distance: f64) -> RetrievedPassage {
        RetrievedPassage {
            chunk: Chunk::new("doc.txt", DocumentKind::Text, 0, "a".repeat(len)),
            distance,
            origin: QueryOrigin::Primary,
        }
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(score(&[]), 0.0);
    }

    #[test]
    fn test_known_value() {
        // distance 0.2 → 0.48, 1 of 5 → 0.06, 250/500 → 0.05
        let s = score(&[passage(250, 0.2)]);
        assert!((s - 0.59).abs() < 1e-9);
    }

    #[test]
    fn test_saturates_at_one() {
        let ps: Vec<_> = (0..8).map(|_| passage(800, 0.0)).collect();
        assert_eq!(score(&ps), 1.0);
    }

    #[test]
    fn test_bounds_with_large_distance() {
        let s = score(&[passage(10, 1.9)]);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn test_monotonic_in_distance() {
        let mut last = -1.0;
        for d in [1.2, 1.0, 0.8, 0.5, 0.3, 0.1, 0.0] {
            let s = score(&[passage(300, d), passage(300, d)]);
            assert!(s >= last, "score decreased at distance {d}");
            last = s;
        }
    }

    #[test]
    fn test_percent() {
        assert_eq!(as_percent(0.59), 59);
        assert_eq!(as_percent(1.0), 100);
    }
}

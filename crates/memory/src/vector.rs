//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity and brute-force top-k search over stored
//! vector records.

use weft_core::store::{VectorFilter, VectorMatch, VectorRecord};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records by cosine similarity to a query vector.
///
/// Only records whose metadata passes `filter` are considered. Returns at
/// most `top_k` matches sorted by descending similarity; ties keep insertion
/// order.
pub fn vector_search(
    records: &[VectorRecord],
    query: &[f32],
    top_k: usize,
    filter: &VectorFilter,
) -> Vec<VectorMatch> {
    let mut scored: Vec<VectorMatch> = records
        .iter()
        .filter(|record| filter.matches(&record.metadata))
        .map(|record| VectorMatch {
            id: record.id.clone(),
            score: Some(cosine_similarity(&record.vector, query)),
            metadata: record.metadata.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .partial_cmp(&a.score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

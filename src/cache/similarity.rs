//! # Similarity Matching
//!
//! Two-phase approximate lookup for near-duplicate queries: a coarse bucket
//! score narrows candidates via the sorted index, then true cosine
//! similarity decides.
//!
//! The bucket score is the mean of a fixed prefix of embedding dimensions —
//! deliberately pinned to the source heuristic for fixture compatibility.
//! Known limitation: vectors whose leading dimensions differ can be missed
//! even when overall cosine similarity clears the threshold. A production
//! index (LSH, HNSW) can replace this behind `ScoredIndexService`.

use serde::{Deserialize, Serialize};

/// Stored payload for a similarity-indexed entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityEntry {
    pub payload: String,
    pub embedding: Vec<f32>,
    /// Secondary parameter that must match exactly for a hit
    pub result_count: u32,
}

/// Coarse bucket score: mean of the first `prefix_dims` dimensions
pub fn bucket_score(embedding: &[f32], prefix_dims: usize) -> f64 {
    if embedding.is_empty() {
        return 0.0;
    }
    let n = prefix_dims.min(embedding.len());
    embedding[..n].iter().map(|v| f64::from(*v)).sum::<f64>() / n as f64
}

/// True cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    dot / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_score_prefix_mean() {
        let embedding = vec![0.2, 0.4, 0.6, 0.8];
        assert!((bucket_score(&embedding, 2) - 0.3).abs() < 1e-9);
        // Prefix longer than the vector uses every dimension
        assert!((bucket_score(&embedding, 8) - 0.5).abs() < 1e-9);
        assert_eq!(bucket_score(&[], 8), 0.0);
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_similarity_entry_round_trip() {
        let entry = SimilarityEntry {
            payload: "cached artifact".to_string(),
            embedding: vec![0.5, 0.5],
            result_count: 3,
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        let back: SimilarityEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.payload, entry.payload);
        assert_eq!(back.result_count, 3);
    }
}

use domain::models::EmbeddedChunk;
use std::cmp::Ordering;

pub struct SearchEngine;

impl SearchEngine {
    /// Cosine similarity; 0.0 when either vector has zero norm.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot_product / (norm_a * norm_b)
    }

    /// Indices of the `top_k` closest entries with their scores, best first.
    /// Equal scores keep insertion order.
    pub fn rank(query_embedding: &[f32], entries: &[EmbeddedChunk], top_k: usize) -> Vec<(usize, f32)> {
        let mut similarities: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, Self::cosine_similarity(query_embedding, &entry.vector)))
            .collect();

        similarities.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        similarities.truncate(top_k);
        similarities
    }
}

//! Embedder collaborator (§6.1): maps a string to a dense vector.
//!
//! Ships two concrete implementations behind a common trait: a `FastEmbed`
//! semantic embedder (feature-gated, ONNX-based) and a deterministic
//! hash-based fallback used when the feature is disabled or the model fails
//! to load. Ingestion (out of scope) is expected to have used a matching
//! embedder so that stored vectors and query-time vectors live in the same
//! space.

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::FallbackEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use crate::error::Result;

/// Default embedding dimensionality (all-MiniLM-L6-v2).
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators. Must be deterministic for a fixed model
/// so that retrieval results are reproducible.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensionality this embedder produces.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts. The default implementation
    /// embeds sequentially; implementations may override for batch
    /// optimization.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Creates the default embedder based on available features.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FastEmbedEmbedder::new()?))
}

/// Creates the default embedder based on available features.
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)))
}

/// Computes cosine similarity between two embedding vectors, in `[-1, 1]`.
/// Returns `0.0` for mismatched lengths or zero-magnitude vectors rather
/// than panicking.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_different_lengths() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_create_embedder() {
        let embedder = create_embedder().unwrap();
        assert_eq!(embedder.dimensions(), DEFAULT_DIMENSIONS);
    }
}

//! Hash-based fallback embedder.
//!
//! Produces deterministic pseudo-embeddings from lexical overlap (word and
//! character-trigram hashing) when `FastEmbed` is unavailable. Not semantic
//! similarity -- useful for tests and for keeping the pipeline runnable
//! without a model download.

use crate::Result;
use crate::embedding::Embedder;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Consecutive-word spans hashed alongside single words, so that phrase
/// order contributes a weaker signal without a second feature space.
const BIGRAM_WEIGHT: f32 = 0.4;

/// Deterministic, model-free embedder built on the hashing trick: terms are
/// weighted by inverse term frequency within the document (repeated words
/// contribute diminishing marginal signal) and hashed into buckets alongside
/// their adjacent-word bigrams, then the result is unit-normalized.
///
/// Not semantic similarity -- this clusters on lexical overlap, which is
/// enough to keep retrieval functional without a model download.
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Creates a new fallback embedder with the specified dimensionality.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_term(seed: u64, term: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        term.hash(&mut hasher);
        hasher.finish()
    }

    fn bucket(&self, hash: u64) -> (usize, f32) {
        let idx = (hash as usize) % self.dimensions;
        let sign = if (hash >> 40) & 1 == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }

    #[allow(clippy::cast_precision_loss)]
    fn tokenize(text: &str) -> Vec<String> {
        text.chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let words = Self::tokenize(text);
        if words.is_empty() {
            return embedding;
        }

        let mut term_counts: HashMap<&str, u32> = HashMap::new();
        for word in &words {
            *term_counts.entry(word.as_str()).or_insert(0) += 1;
        }

        for word in &words {
            let count = term_counts[word.as_str()];
            // Repeated terms still contribute, but each repeat's marginal
            // weight shrinks so one dominant word can't swamp the vector.
            let weight = 1.0 / (count as f32).sqrt();
            let (idx, sign) = self.bucket(Self::hash_term(0, word));
            embedding[idx] += sign * weight;
        }

        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            let (idx, sign) = self.bucket(Self::hash_term(1, &bigram));
            embedding[idx] += sign * BIGRAM_WEIGHT;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

impl Embedder for FallbackEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        use rayon::prelude::*;
        Ok(texts
            .par_iter()
            .map(|text| self.generate_embedding(text))
            .collect())
    }
}

//! `FastEmbed`-based semantic embedder (all-MiniLM-L6-v2, 384 dimensions).
//!
//! Only compiled when the `fastembed-embeddings` feature is enabled.

use crate::Result;
use crate::embedding::{DEFAULT_DIMENSIONS, Embedder};
use crate::error::{Error, StorageError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, OnceLock};

/// Holds the load outcome rather than the bare model, so first-use
/// initialization never races: `OnceLock::get_or_init` runs the loader
/// exactly once no matter how many threads call it concurrently, and a
/// failed load is cached as an error instead of being retried forever.
static EMBEDDING_MODEL: OnceLock<Mutex<std::result::Result<fastembed::TextEmbedding, String>>> = OnceLock::new();

/// `FastEmbed` embedder using all-MiniLM-L6-v2.
pub struct FastEmbedEmbedder {
    model_name: &'static str,
}

impl FastEmbedEmbedder {
    /// Creates a new embedder handle. The model itself loads lazily on the
    /// first `embed` call.
    #[allow(clippy::missing_const_for_fn, clippy::unnecessary_wraps)]
    pub fn new() -> Result<Self> {
        Ok(Self {
            model_name: "all-MiniLM-L6-v2",
        })
    }

    /// Returns the underlying model name, for audit/debug reporting.
    #[must_use]
    pub const fn model_name(&self) -> &'static str {
        self.model_name
    }

    /// Runs `f` against the cached model under its lock, isolating the
    /// ONNX runtime's panics (it can panic on malformed input) and mapping
    /// load/lock/panic failures onto a single error type.
    fn with_model<T, E: std::fmt::Display>(f: impl FnOnce(&mut fastembed::TextEmbedding) -> std::result::Result<T, E>) -> Result<T> {
        let cell = EMBEDDING_MODEL.get_or_init(|| {
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
            Mutex::new(fastembed::TextEmbedding::try_new(options).map_err(|e| e.to_string()))
        });
        let mut guard = cell.lock().map_err(|e| StorageError::Embedding(format!("failed to lock embedding model: {e}")))?;
        let model = guard.as_mut().map_err(|load_error| StorageError::Embedding(format!("failed to load embedding model: {load_error}")))?;

        catch_unwind(AssertUnwindSafe(|| f(model)))
            .map_err(|panic_info| StorageError::Embedding(format!("ONNX runtime panic: {}", panic_message(&panic_info))))?
            .map_err(|e| Error::Storage(StorageError::Embedding(format!("embedding failed: {e}"))))
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(Error::UserInput("cannot embed empty text".to_string()));
        }

        let embeddings = Self::with_model(|model| model.embed([text], None))?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Storage(StorageError::Embedding("no embedding returned".into())))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(Error::UserInput("cannot embed empty text".to_string()));
        }

        Self::with_model(|model| model.embed(texts, None))
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    panic_info
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic_info.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_creation() {
        let embedder = FastEmbedEmbedder::new().unwrap();
        assert_eq!(embedder.dimensions(), DEFAULT_DIMENSIONS);
        assert_eq!(embedder.model_name(), "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_embed_empty_fails() {
        let embedder = FastEmbedEmbedder::new().unwrap();
        assert!(embedder.embed("").is_err());
    }

    #[test]
    fn test_embed_batch_empty_list() {
        let embedder = FastEmbedEmbedder::new().unwrap();
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }

    #[test]
    #[ignore = "requires fastembed model download"]
    fn test_embed_success() {
        let embedder = FastEmbedEmbedder::new().unwrap();
        let result = embedder.embed("Hello, world!").unwrap();
        assert_eq!(result.len(), DEFAULT_DIMENSIONS);
    }
}

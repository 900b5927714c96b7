//! Error types for the query pipeline.
//!
//! A closed `thiserror` taxonomy mirroring the error kinds a caller needs to
//! map onto HTTP status codes: user input, auth, throttling, upstream
//! failures, timeouts, and internal invariants. A `Refusal` is deliberately
//! not modeled here -- refusing to answer is a successful `QueryResult`, not
//! an `Err`.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error taxonomy for the query pipeline and its HTTP surface.
#[derive(Error, Debug)]
pub enum Error {
    /// Empty/whitespace question, unknown source, malformed options.
    #[error("invalid input: {0}")]
    UserInput(String),

    /// Missing/invalid bearer token, invalid or expired chat signature.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded for the calling credential.
    #[error("rate limited")]
    Throttled,

    /// Both vector and lexical indexes are unavailable for every requested source.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Reranker or answer-generator upstream failure not recoverable by fallback.
    #[error("upstream LLM error: {0}")]
    UpstreamLlm(#[from] LlmError),

    /// Request deadline was hit before the pipeline reached an answer.
    #[error("request timed out")]
    TimedOut,

    /// Unexpected condition the pipeline cannot make sense of, e.g. a chunk
    /// referenced by an index but absent from the store.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Storage-layer error (`SQLite`, schema, serialization).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration was present but malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure (audit file writes, ingest manifest reads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors for the chunk/definitions/index layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Store has not been initialized (schema not created / no corpus loaded).
    #[error("store not initialized; run: licentia ingest")]
    NotInitialized,

    /// Chunk not found by ID.
    #[error("chunk not found: {id}")]
    ChunkNotFound {
        /// Chunk ID that was not found.
        id: String,
    },

    /// Unknown source tag.
    #[error("unknown source: {source_tag}")]
    UnknownSource {
        /// The source tag that was not recognized.
        source_tag: String,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(String),
}

/// Typed LLM collaborator errors, distinguishing recoverable-per-call
/// failures from outright transport failures.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// The call exceeded its wall-clock deadline.
    #[error("LLM call timed out")]
    Timeout,

    /// The provider signaled a rate limit.
    #[error("LLM provider rate limited the request")]
    RateLimited,

    /// Network/transport-level failure talking to the provider.
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// The provider responded but the response could not be parsed into the
    /// expected shape.
    #[error("LLM response parse error: {0}")]
    Parse(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UserInput("empty question".to_string());
        assert_eq!(err.to_string(), "invalid input: empty question");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotInitialized;
        assert!(err.to_string().contains("licentia ingest"));

        let err = StorageError::ChunkNotFound {
            id: "cme-1#0001".to_string(),
        };
        assert_eq!(err.to_string(), "chunk not found: cme-1#0001");
    }

    #[test]
    fn test_llm_error_variants() {
        assert_eq!(LlmError::Timeout.to_string(), "LLM call timed out");
        assert!(LlmError::Transport("refused".into()).to_string().contains("refused"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    fn test_error_from_llm_error() {
        let err: Error = LlmError::RateLimited.into();
        assert!(matches!(err, Error::UpstreamLlm(LlmError::RateLimited)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("bad").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(
            err,
            Error::Storage(StorageError::Serialization(_))
        ));
    }
}

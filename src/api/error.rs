//! Maps pipeline errors and API-front-local failures onto the HTTP error
//! envelope and status codes from the component design's error code table.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{Error, LlmError, StorageError};

/// Every error the API front can return, each carrying its own status code
/// and wire-format code string.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request body or options.
    Validation(String),
    /// Question was empty or all whitespace.
    EmptyQuestion,
    /// Missing or invalid bearer token / chat signature.
    Unauthorized(String),
    /// Authenticated but not permitted for this action.
    Forbidden(String),
    /// Requested source tag is not known to the store.
    SourceNotFound(String),
    /// Sliding-window rate limit exceeded; retry after the given seconds.
    RateLimited {
        /// Seconds until the caller's window resets.
        retry_after_secs: u64,
    },
    /// Unhandled internal failure.
    Internal(String),
    /// The reranker or answer-generation call failed upstream.
    UpstreamLlm(String),
    /// The service cannot currently accept new requests (e.g. persistent
    /// audit-write failure, or retrieval unavailable for every source).
    ServiceUnavailable(String),
}

impl ApiError {
    const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::EmptyQuestion => "EMPTY_QUESTION",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::UpstreamLlm(_) => "LLM_UPSTREAM_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::EmptyQuestion => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::SourceNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamLlm(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(m) | Self::Unauthorized(m) | Self::Forbidden(m) | Self::SourceNotFound(m) | Self::Internal(m) | Self::UpstreamLlm(m) | Self::ServiceUnavailable(m) => m.clone(),
            Self::EmptyQuestion => "question must not be empty".to_string(),
            Self::RateLimited { retry_after_secs } => format!("rate limit exceeded, retry after {retry_after_secs}s"),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::UserInput(m) => Self::Validation(m),
            Error::Unauthorized(m) => Self::Unauthorized(m),
            Error::Throttled => Self::RateLimited { retry_after_secs: 60 },
            Error::RetrievalUnavailable(m) => Self::ServiceUnavailable(m),
            Error::UpstreamLlm(LlmError::Timeout) => Self::ServiceUnavailable("upstream LLM call timed out".to_string()),
            Error::UpstreamLlm(inner) => Self::UpstreamLlm(inner.to_string()),
            Error::TimedOut => Self::ServiceUnavailable("request deadline exceeded".to_string()),
            Error::Storage(StorageError::UnknownSource { source_tag }) => Self::SourceNotFound(source_tag),
            Error::Storage(StorageError::NotInitialized) => Self::ServiceUnavailable(err.to_string()),
            Error::InternalInvariant(m) | Error::Config(m) => Self::Internal(m),
            Error::Storage(inner) => Self::Internal(inner.to_string()),
            Error::Io(inner) => Self::Internal(inner.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
    #[serde(rename = "requestID")]
    request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        let status = self.status();
        let retry_after = if let Self::RateLimited { retry_after_secs } = &self {
            Some(*retry_after_secs)
        } else {
            None
        };
        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code(),
                message: self.message(),
            },
            request_id,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(HeaderName::from_static("retry-after"), value);
            }
        }
        response
    }
}

/// Shared success envelope, `{success: true, data, requestID}`.
#[derive(Serialize)]
pub struct SuccessEnvelope<T> {
    success: bool,
    data: T,
    #[serde(rename = "requestID")]
    request_id: String,
}

impl<T> SuccessEnvelope<T> {
    /// Wraps `data` with a freshly generated request identifier.
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Convenience alias for handler return types.
pub type ApiResult<T> = Result<T, ApiError>;

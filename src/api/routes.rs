//! Handlers for every route the router wires up. Each mirrors the shape of
//! the component design's endpoint table: a thin extraction/auth layer in
//! front of the orchestrator, chunk store, and audit sink.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::body::Bytes;
use axum::Json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::auth::{verify_bearer, verify_chat_signature};
use super::error::{ApiError, ApiResult, SuccessEnvelope};
use super::ratelimit::RateLimitDecision;
use super::AppState;
use crate::model::{QueryResult, SearchMode};
use crate::orchestrator::QueryRequest;

const DEFAULT_DEADLINE_MS: u64 = 30_000;
const MAX_DEADLINE_MS: u64 = 120_000;

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
}

/// `GET /health` -- liveness only, never touches the store or the LLM.
pub async fn health() -> Json<SuccessEnvelope<HealthBody>> {
    Json(SuccessEnvelope::new(HealthBody { status: "ok" }))
}

#[derive(Serialize)]
struct ReadyBody {
    ready: bool,
    sources_loaded: usize,
    llm_configured: bool,
    compliance_audit_degraded: bool,
}

/// `GET /ready` -- reports whether the service can currently serve `/query`:
/// at least one source is loaded, the answer LLM is configured, and the
/// compliance audit stream has not failed persistently.
pub async fn ready(State(state): State<Arc<AppState>>) -> Response {
    let sources_loaded = state.chunk_store.list_sources().map(|s| s.len()).unwrap_or(0);
    let degraded = state.audit.compliance_degraded();
    let ready = sources_loaded > 0 && state.llm_configured && !degraded;
    let body = SuccessEnvelope::new(ReadyBody {
        ready,
        sources_loaded,
        llm_configured: state.llm_configured,
        compliance_audit_degraded: degraded,
    });
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body)).into_response()
}

#[derive(Serialize)]
pub struct VersionBody {
    version: &'static str,
}

/// `GET /version`.
pub async fn version() -> Json<SuccessEnvelope<VersionBody>> {
    Json(SuccessEnvelope::new(VersionBody {
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequestBody {
    question: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    mode: Option<SearchMode>,
    #[serde(default)]
    deadline_ms: Option<u64>,
}

fn rate_limit_headers(limit: u32, decision: RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("x-ratelimit-limit", limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_epoch.to_string()),
    ] {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            headers.insert(name, value);
        }
    }
    headers
}

fn hashed_credential(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// `POST /query` -- the authenticated, rate-limited entry point into the
/// orchestrator.
pub async fn query(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(body): Json<QueryRequestBody>) -> ApiResult<Response> {
    verify_bearer(&headers, state.config.bearer_token.as_deref())?;

    let credential_id = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| "unknown".to_string(), hashed_credential);

    let decision = state.rate_limiter.allow(&credential_id);
    let rate_headers = rate_limit_headers(state.config.rate_limit_per_min, decision);
    if !decision.allowed {
        return Err(ApiError::RateLimited { retry_after_secs: 60 });
    }

    if state.audit.compliance_degraded() {
        return Err(ApiError::ServiceUnavailable("compliance audit stream is degraded".to_string()));
    }

    let question = body.question.trim();
    if question.is_empty() {
        return Err(ApiError::EmptyQuestion);
    }
    if body.sources.is_empty() {
        return Err(ApiError::Validation("at least one source must be requested".to_string()));
    }

    let deadline_ms = body.deadline_ms.unwrap_or(DEFAULT_DEADLINE_MS).min(MAX_DEADLINE_MS);
    let request = QueryRequest {
        question: question.to_string(),
        sources: body.sources,
        mode: body.mode.unwrap_or(SearchMode::Hybrid),
        deadline: Duration::from_millis(deadline_ms),
    };

    let result: QueryResult = state.pipeline.run(request).await?;
    let response = (rate_headers, Json(SuccessEnvelope::new(result))).into_response();
    Ok(response)
}

#[derive(Serialize)]
pub struct SourceSummary {
    source: String,
    document_count: usize,
}

/// `GET /sources`.
pub async fn list_sources(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<SuccessEnvelope<Vec<SourceSummary>>>> {
    verify_bearer(&headers, state.config.bearer_token.as_deref())?;
    let sources = state.chunk_store.list_sources()?;
    let summaries = sources
        .into_iter()
        .map(|source| {
            let document_count = state.chunk_store.document_count(&source).unwrap_or(0);
            SourceSummary { source, document_count }
        })
        .collect();
    Ok(Json(SuccessEnvelope::new(summaries)))
}

#[derive(Serialize)]
pub struct SourceDetail {
    source: String,
    documents: Vec<String>,
}

/// `GET /sources/{name}`.
pub async fn source_detail(State(state): State<Arc<AppState>>, headers: HeaderMap, Path(name): Path<String>) -> ApiResult<Json<SuccessEnvelope<SourceDetail>>> {
    verify_bearer(&headers, state.config.bearer_token.as_deref())?;
    let documents = state.chunk_store.list_documents(&name)?;
    if documents.is_empty() {
        return Err(ApiError::SourceNotFound(name));
    }
    Ok(Json(SuccessEnvelope::new(SourceDetail { source: name, documents })))
}

#[derive(Debug, Deserialize)]
struct SlackCommandForm {
    text: String,
    user_id: String,
    response_url: String,
    #[serde(default)]
    channel_id: String,
}

#[derive(Serialize)]
struct SlackAck {
    response_type: &'static str,
    text: String,
}

/// `POST /slack/command` -- verifies the chat-platform signature, acks
/// immediately, and posts the real answer back to `response_url`
/// asynchronously once the pipeline finishes.
pub async fn slack_command(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> ApiResult<Response> {
    let secret = state
        .config
        .chat_signing_secret
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("chat signing is not configured".to_string()))?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    verify_chat_signature(secret, &headers, &body, now)?;

    let form: SlackCommandForm = serde_urlencoded::from_bytes(&body).map_err(|e| ApiError::Validation(format!("malformed command payload: {e}")))?;
    let question = form.text.trim();
    if question.is_empty() {
        return Err(ApiError::EmptyQuestion);
    }

    tracing::info!(user_hash = %hashed_credential(&form.user_id), channel_id = %form.channel_id, "slack command accepted");

    let sources = state.chunk_store.list_sources()?;
    if sources.is_empty() {
        return Err(ApiError::ServiceUnavailable("no sources are loaded".to_string()));
    }

    let pipeline = Arc::clone(&state.pipeline);
    let request = QueryRequest {
        question: question.to_string(),
        sources,
        mode: SearchMode::Hybrid,
        deadline: Duration::from_secs(30),
    };
    let response_url = form.response_url.clone();
    tokio::spawn(async move {
        let reply = match pipeline.run(request).await {
            Ok(result) => SlackAck {
                response_type: "in_channel",
                text: result.answer,
            },
            Err(_) => SlackAck {
                response_type: "ephemeral",
                text: "Something went wrong answering that question.".to_string(),
            },
        };
        let client = reqwest::Client::new();
        let _ = client.post(&response_url).json(&reply).send().await;
    });

    let ack = SlackAck {
        response_type: "ephemeral",
        text: "Looking that up...".to_string(),
    };
    Ok((StatusCode::OK, Json(ack)).into_response())
}

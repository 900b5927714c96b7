//! End-to-end tests driving the HTTP front through `axum::Router` directly,
//! exercising auth, rate limiting, and the chat-platform signature check the
//! way a real client would.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use licentia::api::{build_router, AppState, Pipeline};
use licentia::config::ApiConfig;
use licentia::error::Result as CoreResult;
use licentia::model::QueryResult;
use licentia::orchestrator::QueryRequest;
use licentia::store::SqliteStore;
use licentia::AuditSink;
use sha2::Sha256;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

struct StubPipeline;

#[async_trait]
impl Pipeline for StubPipeline {
    async fn run(&self, request: QueryRequest) -> CoreResult<QueryResult> {
        Ok(QueryResult {
            query_id: "test-query".to_string(),
            original_question: request.question.clone(),
            normalized_question: request.question,
            sources: request.sources,
            answer: "## Answer\nYes.\n## Supporting Clauses\nnone\n## Citations\nnone".to_string(),
            refused: false,
            refusal_reason: None,
            citations: Vec::new(),
            definitions_linked: Vec::new(),
            chunks_retrieved: 1,
            chunks_used: 1,
            input_tokens: 10,
            output_tokens: 5,
            latency_ms: 1,
            search_mode: request.mode,
            effective_search_mode: request.mode,
            scores_are_reranked: true,
        })
    }
}

fn build_state(config: ApiConfig) -> AppState {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store
        .ingest_chunks(&[licentia::IngestRecord {
            chunk_id: "cme#0001".to_string(),
            source: "cme".to_string(),
            document_path: "license.txt".to_string(),
            section: None,
            page_start: 1,
            page_end: 1,
            text: "placeholder chunk".to_string(),
            token_count: 3,
            is_definitions: false,
            relative_path: None,
            word_count: None,
            embedding: vec![0.1; 384],
        }])
        .unwrap();
    let audit_dir = tempdir().unwrap();
    let audit = Arc::new(AuditSink::open(audit_dir.path().join("audit.ndjson"), None, Default::default()).unwrap());
    AppState::new(Arc::new(StubPipeline), store, audit, config, true)
}

#[tokio::test]
async fn health_requires_no_auth() {
    let router = build_router(build_state(ApiConfig::default()));
    let response = router.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn query_without_bearer_token_is_rejected() {
    let config = ApiConfig {
        bearer_token: Some("secret-token".to_string()),
        ..ApiConfig::default()
    };
    let router = build_router(build_state(config));

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"question":"Can a subscriber terminate?","sources":["cme"]}"#))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn query_with_correct_bearer_token_succeeds() {
    let config = ApiConfig {
        bearer_token: Some("secret-token".to_string()),
        ..ApiConfig::default()
    };
    let router = build_router(build_state(config));

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .header("authorization", "Bearer secret-token")
        .body(Body::from(r#"{"question":"Can a subscriber terminate?","sources":["cme"]}"#))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["refused"], false);
}

#[tokio::test]
async fn exceeding_the_rate_limit_returns_429_with_retry_after() {
    let config = ApiConfig {
        bearer_token: Some("secret-token".to_string()),
        rate_limit_per_min: 1,
        ..ApiConfig::default()
    };
    let router = build_router(build_state(config));

    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .header("authorization", "Bearer secret-token")
            .body(Body::from(r#"{"question":"Can a subscriber terminate?","sources":["cme"]}"#))
            .unwrap()
    };

    let first = router.clone().oneshot(make_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router.oneshot(make_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn slack_command_with_a_stale_timestamp_is_rejected() {
    let config = ApiConfig {
        chat_signing_secret: Some("slack-secret".to_string()),
        ..ApiConfig::default()
    };
    let router = build_router(build_state(config));

    let body = "text=terminate%3F&user_id=U123&response_url=https%3A%2F%2Fexample.com%2Fhook";
    let stale_timestamp = "1000000000";
    let mut mac = Hmac::<Sha256>::new_from_slice(b"slack-secret").unwrap();
    mac.update(b"v0:");
    mac.update(stale_timestamp.as_bytes());
    mac.update(b":");
    mac.update(body.as_bytes());
    let signature = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

    let request = Request::builder()
        .method("POST")
        .uri("/slack/command")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-request-timestamp", stale_timestamp)
        .header("x-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

//! HTTP front for the query pipeline: health/readiness/version probes, the
//! authenticated `/query` and `/sources` endpoints, and the signed
//! `/slack/command` webhook. Grounded on the router/state/layering shape
//! used by this codebase's other Axum-based front end, generalized from a
//! single monitoring dashboard to a multi-tenant, authenticated API.

pub mod auth;
pub mod error;
pub mod ratelimit;
pub mod routes;

use crate::audit::AuditSink;
use crate::config::ApiConfig;
use crate::embedding::Embedder;
use crate::error::Result as CoreResult;
use crate::model::QueryResult;
use crate::orchestrator::{QueryOrchestrator, QueryRequest};
use crate::store::traits::{ChunkStore, DefinitionsStore, LexicalIndex, VectorIndex};
use async_trait::async_trait;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult, SuccessEnvelope};
pub use ratelimit::RateLimiter;

/// Type-erases a `QueryOrchestrator` so the API front can hold one without
/// naming its four collaborator type parameters.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Runs a single query end to end.
    async fn run(&self, request: QueryRequest) -> CoreResult<QueryResult>;
}

#[async_trait]
impl<V, L, E, S> Pipeline for QueryOrchestrator<V, L, E, S>
where
    V: VectorIndex + 'static,
    L: LexicalIndex + 'static,
    E: Embedder + ?Sized + 'static,
    S: ChunkStore + DefinitionsStore + 'static,
{
    async fn run(&self, request: QueryRequest) -> CoreResult<QueryResult> {
        self.execute(request).await
    }
}

/// Shared state handed to every handler.
pub struct AppState {
    pub(crate) pipeline: Arc<dyn Pipeline>,
    pub(crate) chunk_store: Arc<dyn ChunkStore>,
    pub(crate) audit: Arc<AuditSink>,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) config: ApiConfig,
    pub(crate) llm_configured: bool,
}

impl AppState {
    /// Builds the shared state the router closes over.
    #[must_use]
    pub fn new(pipeline: Arc<dyn Pipeline>, chunk_store: Arc<dyn ChunkStore>, audit: Arc<AuditSink>, config: ApiConfig, llm_configured: bool) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_per_min);
        Self {
            pipeline,
            chunk_store,
            audit,
            rate_limiter,
            config,
            llm_configured,
        }
    }
}

/// Builds the full router: unauthenticated probes plus the authenticated
/// query, sources, and chat-webhook surfaces.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<_> = state.config.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins).allow_methods([Method::GET, Method::POST]).allow_headers(Any)
    };

    Router::new()
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        .route("/version", get(routes::version))
        .route("/query", post(routes::query))
        .route("/sources", get(routes::list_sources))
        .route("/sources/{name}", get(routes::source_detail))
        .route("/slack/command", post(routes::slack_command))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

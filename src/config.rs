//! Process-wide configuration: the closed set of options recognized at
//! startup, loaded once from environment variables (`LICENTIA_*`) with
//! documented defaults.
//!
//! Ingestion, deployment, and the concrete vendor credentials beyond the
//! ones named here remain out of scope; this module only owns the knobs the
//! query pipeline itself reads.

use crate::error::{Error, Result};

/// Retrieval-stage configuration (§6.3 "Retrieval").
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Top-K results requested from the vector index, per source.
    pub top_k_vector: usize,
    /// Top-K results requested from the lexical index, per source.
    pub top_k_lexical: usize,
    /// Global cap on the fused candidate pool after RRF.
    pub max_candidates: usize,
    /// RRF rank-fusion constant.
    pub rrf_k: u32,
    /// Default search mode when a caller does not specify one.
    pub search_mode_default: crate::model::SearchMode,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_vector: 10,
            top_k_lexical: 10,
            max_candidates: 12,
            rrf_k: 60,
            search_mode_default: crate::model::SearchMode::Hybrid,
        }
    }
}

/// Reranker configuration (§6.3 "Reranker").
#[derive(Debug, Clone, PartialEq)]
pub struct RerankConfig {
    /// Bounded worker pool size for concurrent scoring calls.
    pub workers: usize,
    /// Per-call wall-clock timeout.
    pub timeout_ms: u64,
    /// Chunk text is truncated to this many characters before prompting.
    pub max_chars: usize,
    /// Minimum score (inclusive) to keep a chunk after reranking.
    pub min_score: u8,
    /// Maximum number of chunks to keep after reranking.
    pub max_kept: usize,
    /// Whether to ask the LLM for a one-line explanation alongside the score.
    pub include_explanations: bool,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            timeout_ms: 30_000,
            max_chars: 2000,
            min_score: 2,
            max_kept: 10,
            include_explanations: false,
        }
    }
}

/// Confidence-gate configuration (§6.3 "Gate").
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Whether the gate runs at all; when false, the pipeline never refuses
    /// on confidence grounds (still subject to the empty-context guard).
    pub enabled: bool,
    /// Tier 1: minimum reranked score to avoid `top_below_threshold`.
    pub relevance_threshold: f64,
    /// Tier 1: minimum number of chunks clearing `relevance_threshold`.
    pub min_chunks_required: usize,
    /// Tier 2: top retrieval score must exceed this (strictly) to pass.
    pub retrieval_min_score: f64,
    /// Tier 2: ratio of top1/top2 retrieval scores required to avoid `no_clear_winner`.
    pub retrieval_min_ratio: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            relevance_threshold: 2.0,
            min_chunks_required: 1,
            retrieval_min_score: 0.05,
            retrieval_min_ratio: 1.2,
        }
    }
}

/// Token-budget configuration (§6.3 "Budget").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetConfig {
    /// Hard ceiling on total context tokens supplied to the answer LLM.
    pub max_context_tokens: u32,
    /// Tokens reserved for the immutable system prompt.
    pub system_prompt_tokens: u32,
    /// Tokens reserved for the question/answer template scaffolding.
    pub qa_template_tokens: u32,
    /// Tokens reserved for the model's own answer.
    pub answer_buffer_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 60_000,
            system_prompt_tokens: 500,
            qa_template_tokens: 200,
            answer_buffer_tokens: 2048,
        }
    }
}

/// Audit-sink configuration (§6.3 "Audit").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuditConfig {
    /// Compliance stream rotation size.
    pub audit_max_bytes: u64,
    /// Number of rotated compliance backups to keep.
    pub audit_backups: u32,
    /// Debug stream rotation size.
    pub debug_max_bytes: u64,
    /// Number of rotated debug backups to keep.
    pub debug_backups: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            audit_max_bytes: 50 * 1024 * 1024,
            audit_backups: 10,
            debug_max_bytes: 10 * 1024 * 1024,
            debug_backups: 5,
        }
    }
}

/// API-front configuration (§6.3 "API").
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Shared-secret bearer token accepted by `POST /query`.
    pub bearer_token: Option<String>,
    /// HMAC signing secret for `POST /slack/command`.
    pub chat_signing_secret: Option<String>,
    /// Sliding-window rate limit, requests per 60s, per credential.
    pub rate_limit_per_min: u32,
    /// Whether to trust `X-Forwarded-For`/`X-Real-IP` when no credential is present.
    pub trust_proxy_headers: bool,
    /// Allowed CORS origins; empty means CORS is disabled.
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            chat_signing_secret: None,
            rate_limit_per_min: 100,
            trust_proxy_headers: false,
            cors_origins: Vec::new(),
        }
    }
}

/// The complete, closed configuration set for one process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Retrieval-stage options.
    pub retrieval: RetrievalConfig,
    /// Reranker options.
    pub rerank: RerankConfig,
    /// Confidence-gate options.
    pub gate: GateConfig,
    /// Token-budget options.
    pub budget: BudgetConfig,
    /// Audit-sink options.
    pub audit: AuditConfig,
    /// API-front options.
    pub api: ApiConfig,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(format!("LICENTIA_{key}")).ok()
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_string(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("LICENTIA_{key} is not valid: {raw:?}"))),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_string(key) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("LICENTIA_{key} is not a boolean: {raw:?}"))),
        },
    }
}

impl Settings {
    /// Loads settings from `LICENTIA_*` environment variables, applying the
    /// documented default for anything unset.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the offending key when a value is
    /// present but cannot be parsed into the expected type.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let search_mode_default = match env_string("SEARCH_MODE_DEFAULT").as_deref() {
            None => defaults.retrieval.search_mode_default,
            Some("vector") => crate::model::SearchMode::Vector,
            Some("lexical") => crate::model::SearchMode::Lexical,
            Some("hybrid") => crate::model::SearchMode::Hybrid,
            Some(other) => {
                return Err(Error::Config(format!(
                    "LICENTIA_SEARCH_MODE_DEFAULT must be vector|lexical|hybrid, got {other:?}"
                )));
            }
        };

        let retrieval = RetrievalConfig {
            top_k_vector: env_parsed("TOP_K_VECTOR", defaults.retrieval.top_k_vector)?,
            top_k_lexical: env_parsed("TOP_K_LEXICAL", defaults.retrieval.top_k_lexical)?,
            max_candidates: env_parsed("MAX_CANDIDATES", defaults.retrieval.max_candidates)?,
            rrf_k: env_parsed("RRF_K", defaults.retrieval.rrf_k)?,
            search_mode_default,
        };

        let rerank = RerankConfig {
            workers: env_parsed("RERANK_WORKERS", defaults.rerank.workers)?,
            timeout_ms: env_parsed("RERANK_TIMEOUT_MS", defaults.rerank.timeout_ms)?,
            max_chars: env_parsed("RERANK_MAX_CHARS", defaults.rerank.max_chars)?,
            min_score: env_parsed("RERANK_MIN_SCORE", defaults.rerank.min_score)?,
            max_kept: env_parsed("RERANK_MAX_KEPT", defaults.rerank.max_kept)?,
            include_explanations: env_bool(
                "RERANK_INCLUDE_EXPLANATIONS",
                defaults.rerank.include_explanations,
            )?,
        };

        let gate = GateConfig {
            enabled: env_bool("GATE_ENABLED", defaults.gate.enabled)?,
            relevance_threshold: env_parsed(
                "RELEVANCE_THRESHOLD",
                defaults.gate.relevance_threshold,
            )?,
            min_chunks_required: env_parsed(
                "MIN_CHUNKS_REQUIRED",
                defaults.gate.min_chunks_required,
            )?,
            retrieval_min_score: env_parsed(
                "RETRIEVAL_MIN_SCORE",
                defaults.gate.retrieval_min_score,
            )?,
            retrieval_min_ratio: env_parsed(
                "RETRIEVAL_MIN_RATIO",
                defaults.gate.retrieval_min_ratio,
            )?,
        };

        let budget = BudgetConfig {
            max_context_tokens: env_parsed(
                "MAX_CONTEXT_TOKENS",
                defaults.budget.max_context_tokens,
            )?,
            system_prompt_tokens: env_parsed(
                "SYSTEM_PROMPT_TOKENS",
                defaults.budget.system_prompt_tokens,
            )?,
            qa_template_tokens: env_parsed(
                "QA_TEMPLATE_TOKENS",
                defaults.budget.qa_template_tokens,
            )?,
            answer_buffer_tokens: env_parsed(
                "ANSWER_BUFFER_TOKENS",
                defaults.budget.answer_buffer_tokens,
            )?,
        };

        let audit = AuditConfig {
            audit_max_bytes: env_parsed("AUDIT_MAX_BYTES", defaults.audit.audit_max_bytes)?,
            audit_backups: env_parsed("AUDIT_BACKUPS", defaults.audit.audit_backups)?,
            debug_max_bytes: env_parsed("DEBUG_MAX_BYTES", defaults.audit.debug_max_bytes)?,
            debug_backups: env_parsed("DEBUG_BACKUPS", defaults.audit.debug_backups)?,
        };

        let cors_origins = env_string("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let api = ApiConfig {
            bearer_token: env_string("API_BEARER_TOKEN"),
            chat_signing_secret: env_string("CHAT_SIGNING_SECRET"),
            rate_limit_per_min: env_parsed("RATE_LIMIT_PER_MIN", defaults.api.rate_limit_per_min)?,
            trust_proxy_headers: env_bool(
                "TRUST_PROXY_HEADERS",
                defaults.api.trust_proxy_headers,
            )?,
            cors_origins,
        };

        Ok(Self {
            retrieval,
            rerank,
            gate,
            budget,
            audit,
            api,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.retrieval.rrf_k, 60);
        assert_eq!(s.retrieval.max_candidates, 12);
        assert_eq!(s.rerank.workers, 5);
        assert_eq!(s.rerank.timeout_ms, 30_000);
        assert_eq!(s.gate.relevance_threshold, 2.0);
        assert_eq!(s.gate.retrieval_min_score, 0.05);
        assert_eq!(s.gate.retrieval_min_ratio, 1.2);
        assert_eq!(s.budget.max_context_tokens, 60_000);
        assert_eq!(s.audit.audit_max_bytes, 50 * 1024 * 1024);
        assert_eq!(s.api.rate_limit_per_min, 100);
    }

    #[test]
    fn env_bool_accepts_common_spellings() {
        assert!(env_bool("__LICENTIA_TEST_NONEXISTENT__", true).unwrap());
    }

    #[test]
    fn from_env_with_no_vars_set_matches_defaults() {
        // SAFETY: test runs serially within the crate's own test binary and
        // does not touch any LICENTIA_* variable shared with other tests.
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.retrieval, RetrievalConfig::default());
    }
}

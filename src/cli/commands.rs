//! CLI command implementations.
//!
//! Contains the business logic for each CLI command: loading an ingest
//! manifest, answering a single question, listing sources, and starting the
//! HTTP API server.

use crate::cli::output::{format_query_result, format_sources, OutputFormat};
use crate::cli::parser::{Cli, Commands};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::model::SearchMode;
use crate::orchestrator::{QueryOrchestrator, QueryRequest};
use crate::store::{IngestDefinition, IngestRecord, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(serde::Deserialize)]
struct IngestManifest {
    #[serde(default)]
    chunks: Vec<IngestRecord>,
    #[serde(default)]
    definitions: Vec<IngestDefinition>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".licentia").join("corpus.db")
}

fn open_store(cli: &Cli) -> Result<SqliteStore> {
    let path = cli.db_path.clone().unwrap_or_else(default_db_path);
    SqliteStore::open(path)
}

fn parse_search_mode(raw: &str) -> Result<SearchMode> {
    match raw.to_lowercase().as_str() {
        "vector" => Ok(SearchMode::Vector),
        "lexical" => Ok(SearchMode::Lexical),
        "hybrid" => Ok(SearchMode::Hybrid),
        other => Err(Error::UserInput(format!("mode must be vector|lexical|hybrid, got {other:?}"))),
    }
}

/// Executes the parsed CLI invocation, returning the text to print on stdout.
///
/// # Errors
/// Propagates any pipeline, storage, or configuration error encountered
/// while executing the requested subcommand; the caller is responsible for
/// formatting it for display.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    run(cli, format).await
}

async fn run(cli: &Cli, format: OutputFormat) -> Result<String> {
    match &cli.command {
        Commands::Ingest { manifest } => ingest(cli, manifest),
        Commands::Query {
            question,
            sources,
            mode,
            deadline_ms,
        } => query(cli, question, sources, mode, *deadline_ms, format).await,
        Commands::Sources => sources_list(cli, format),
        Commands::Serve { bind } => serve(cli, bind).await,
    }
}

fn ingest(cli: &Cli, manifest_path: &std::path::Path) -> Result<String> {
    let raw = std::fs::read_to_string(manifest_path)?;
    let manifest: IngestManifest = serde_json::from_str(&raw).map_err(crate::error::StorageError::from)?;
    let store = open_store(cli)?;
    let chunks = store.ingest_chunks(&manifest.chunks)?;
    let definitions = store.ingest_definitions(&manifest.definitions)?;
    Ok(format!("ingested {chunks} chunk(s) and {definitions} definition(s)\n"))
}

fn sources_list(cli: &Cli, format: OutputFormat) -> Result<String> {
    use crate::store::traits::ChunkStore;
    let store = open_store(cli)?;
    let sources = store.list_sources()?;
    let pairs: Vec<(String, usize)> = sources
        .into_iter()
        .map(|s| {
            let count = store.document_count(&s).unwrap_or(0);
            (s, count)
        })
        .collect();
    Ok(format_sources(&pairs, format))
}

fn build_pipeline(store: Arc<SqliteStore>, settings: &Settings) -> Result<QueryOrchestrator<SqliteStore, SqliteStore, dyn crate::embedding::Embedder, SqliteStore>> {
    use crate::answer::AnswerGenerator;
    use crate::budget::Budgeter;
    use crate::embedding::Embedder;
    use crate::gate::ConfidenceGate;
    use crate::llm::openai::{OpenAiClient, OpenAiConfig};
    use crate::llm::prompts::PromptSet;
    use crate::rerank::Reranker;
    use crate::retrieval::HybridRetriever;
    use crate::tokenizer::{ApproximateTokenizer, TiktokenTokenizer, Tokenizer};

    let embedder: Arc<dyn Embedder> = Arc::from(crate::embedding::create_embedder()?);

    let openai_config = OpenAiConfig::from_env();
    let llm = Arc::new(OpenAiClient::new(openai_config));
    let prompts = Arc::new(PromptSet::load(None, settings.rerank.include_explanations));

    let tokenizer: Arc<dyn Tokenizer> = TiktokenTokenizer::new().map_or_else(|_| Arc::new(ApproximateTokenizer) as Arc<dyn Tokenizer>, |t| Arc::new(t) as Arc<dyn Tokenizer>);

    let retriever = Arc::new(HybridRetriever::new(Arc::clone(&store), Arc::clone(&store), embedder, settings.retrieval.clone()));
    let reranker = Arc::new(Reranker::new(llm.clone(), Arc::clone(&store), Arc::clone(&prompts), settings.rerank.clone()));
    let gate = ConfidenceGate::new(settings.gate.clone());
    let budgeter = Budgeter::new(settings.budget);
    let answer_generator = Arc::new(AnswerGenerator::new(llm, prompts, Duration::from_millis(settings.rerank.timeout_ms)));

    let audit = Arc::new(crate::audit::AuditSink::open(
        PathBuf::from(".licentia").join("audit").join("queries.ndjson"),
        None,
        settings.audit,
    )?);

    Ok(QueryOrchestrator::new(retriever, reranker, gate, budgeter, answer_generator, tokenizer, store, audit, true))
}

async fn query(cli: &Cli, question: &str, sources: &[String], mode: &str, deadline_ms: u64, format: OutputFormat) -> Result<String> {
    if question.trim().is_empty() {
        return Err(Error::UserInput("question must not be empty".to_string()));
    }
    let mode = parse_search_mode(mode)?;
    let settings = Settings::from_env()?;
    let store = Arc::new(open_store(cli)?);
    let pipeline = build_pipeline(store, &settings)?;

    let request = QueryRequest {
        question: question.to_string(),
        sources: sources.to_vec(),
        mode,
        deadline: Duration::from_millis(deadline_ms),
    };
    let result = pipeline.execute(request).await?;
    Ok(format_query_result(&result, format))
}

async fn serve(cli: &Cli, bind: &str) -> Result<String> {
    use crate::api::{build_router, AppState, Pipeline};
    use crate::store::traits::ChunkStore;

    let settings = Settings::from_env()?;
    let store = Arc::new(open_store(cli)?);
    let pipeline: Arc<dyn Pipeline> = Arc::new(build_pipeline(Arc::clone(&store), &settings)?);
    let chunk_store: Arc<dyn ChunkStore> = store;
    let audit = Arc::new(crate::audit::AuditSink::open(
        PathBuf::from(".licentia").join("audit").join("queries.ndjson"),
        None,
        settings.audit,
    )?);
    let llm_configured = !crate::llm::openai::OpenAiConfig::from_env().api_key.is_empty();

    let state = AppState::new(pipeline, chunk_store, audit, settings.api, llm_configured);
    let router = build_router(state);

    let addr: std::net::SocketAddr = bind.parse().map_err(|e| Error::Config(format!("invalid bind address {bind:?}: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "licentia API listening");
    axum::serve(listener, router).await?;

    Ok(String::new())
}

//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// licentia: a deterministic retrieval-and-refusal query engine for a fixed
/// corpus of legal and licensing documents.
#[derive(Parser, Debug)]
#[command(name = "licentia")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the `SQLite` store file.
    ///
    /// Defaults to `.licentia/corpus.db` in the current directory.
    #[arg(short, long, env = "LICENTIA_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Loads a pre-chunked, pre-embedded ingest manifest into the store.
    Ingest {
        /// Path to a JSON manifest: `{"chunks": [...], "definitions": [...]}`.
        manifest: PathBuf,
    },

    /// Answers a single question against one or more sources.
    Query {
        /// The question to ask.
        question: String,

        /// Source tags to search, e.g. `cme`.
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,

        /// Search mode: vector, lexical, or hybrid.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Request deadline, in milliseconds.
        #[arg(long, default_value_t = 30_000)]
        deadline_ms: u64,
    },

    /// Lists known sources and their document counts.
    Sources,

    /// Starts the HTTP API server.
    Serve {
        /// Address to bind, e.g. `0.0.0.0:8080`.
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

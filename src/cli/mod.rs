//! CLI layer for licentia.
//!
//! Provides the command-line interface using clap, with subcommands for
//! ingesting a pre-chunked manifest, answering a single question, listing
//! sources, and starting the HTTP API server.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};

//! Binary entry point for licentia.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use licentia::cli::output::OutputFormat;
use licentia::cli::{execute, Cli};
use std::io::{self, Write};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);

    match execute(&cli).await {
        Ok(output) => {
            if !output.is_empty()
                && let Err(e) = write!(io::stdout(), "{output}")
                && e.kind() != io::ErrorKind::BrokenPipe
            {
                eprintln!("Error writing to stdout: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error_output = licentia::cli::output::format_error(&e, format);
            match format {
                OutputFormat::Json => println!("{error_output}"),
                OutputFormat::Text => eprintln!("Error: {error_output}"),
            }
            ExitCode::FAILURE
        }
    }
}

//! Plume CLI - stream a chat completion for one prompt to the terminal.
//!
//! Sends the prompt to an OpenAI-compatible endpoint with `"stream": true`,
//! prints each text fragment the moment it arrives, and mirrors the
//! fragments into a scratch temp file that is removed when the run ends.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

mod error;
mod sink;

use clap::Parser;
use error::{CliError, Result};
use futures::StreamExt;
use plume::client::{API_KEY_ENV, API_KEY_FALLBACK_ENV};
use plume::{ChatClient, ChatMessage, ChatStream};
use sink::ScratchSink;
use std::env;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Stream a chat completion for one prompt to the terminal
#[derive(Parser, Debug)]
#[command(name = "plume")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Prompt to send to the model
    prompt: String,

    /// Model to use
    #[arg(short = 'M', long, env = "PLUME_MODEL", default_value = "gpt-4o")]
    model: String,

    /// API base URL (e.g. a proxy or a local OpenAI-compatible server)
    #[arg(long, env = "PLUME_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout in seconds (no timeout by default)
    #[arg(long)]
    timeout: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    // Usage problems must exit 1; --help and --version still exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Initialize logging based on verbosity
    init_logging(cli.verbose);

    // Run the async main
    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
///
/// Diagnostics go to stderr; stdout carries nothing but the response.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "plume={level},plume_cli={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    // The scratch file is acquired before any network activity and removed
    // on drop, whatever happens in between.
    let mut sink = ScratchSink::create().map_err(CliError::Sink)?;
    tracing::debug!(path = %sink.path().display(), "scratch sink ready");

    let client = build_client(&cli)?;
    let model = client.completion_model(cli.model.as_str());

    let mut stream = model.stream(vec![ChatMessage::user(cli.prompt)]).await?;

    tokio::select! {
        result = stream_response(&mut stream, &mut sink) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, abandoning stream");
        }
    }

    println!();
    sink.flush().map_err(CliError::Sink)?;
    Ok(())
}

/// Build the client from environment credentials and CLI overrides.
fn build_client(cli: &Cli) -> Result<ChatClient> {
    let api_key = env::var(API_KEY_ENV)
        .or_else(|_| env::var(API_KEY_FALLBACK_ENV))
        .map_err(|_| {
            CliError::config(format!(
                "no API key: set {API_KEY_ENV} or {API_KEY_FALLBACK_ENV}"
            ))
        })?;

    let mut builder = ChatClient::builder().api_key(api_key);
    if let Some(base_url) = &cli.base_url {
        builder = builder.base_url(base_url.clone());
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout_secs(secs);
    }
    Ok(builder.build()?)
}

/// Drain the fragment stream, mirroring each fragment to stdout and the
/// scratch sink in arrival order.
async fn stream_response(stream: &mut ChatStream, sink: &mut ScratchSink) -> Result<()> {
    let mut stdout = io::stdout();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                stdout.write_all(fragment.as_bytes())?;
                stdout.flush()?;
                sink.append(&fragment).map_err(CliError::Sink)?;
            }
            Err(e) => {
                // The transport failed mid-stream; everything printed so
                // far stands and the run is not turned into a failure.
                tracing::error!("stream aborted: {e}");
                break;
            }
        }
    }
    Ok(())
}

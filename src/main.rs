#![forbid(unsafe_code)]

//! `fingerprint-worker`: line-delimited JSON fingerprinting worker.
//!
//! Loads the signature dataset, then answers one JSON request per stdin line
//! with one JSON response per stdout line until stdin closes. Logs go to
//! stderr so stdout carries protocol lines only.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use fingerprint_worker::fingerprint::SignatureEngine;
use fingerprint_worker::worker::{run_worker, EXIT_STARTUP_FAILURE, EXIT_STREAM_FATAL};
use fingerprint_worker::{AppError, Result, WorkerConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "fingerprint-worker", about = "Line-delimited JSON technology fingerprinting worker", version, long_about = None)]
struct Cli {
    /// Path to a fingerprints JSON dataset that supersedes embedded entries.
    #[arg(long)]
    fingerprints: Option<PathBuf>,

    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Largest accepted input line in bytes.
    #[arg(long)]
    max_record_bytes: Option<usize>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    // Argument errors exit with the startup status, not clap's default of 2.
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() {
                EXIT_STARTUP_FAILURE
            } else {
                0
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("fingerprint-worker: {err}");
        return ExitCode::from(EXIT_STARTUP_FAILURE);
    }

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "startup failed");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

/// Bootstrap the engine and drive the loop over stdin/stdout.
///
/// Startup failures are returned; the loop's own outcome is mapped to an
/// exit status here because it has already been logged.
fn run(args: Cli) -> Result<ExitCode> {
    let mut config = match args.config {
        Some(ref path) => WorkerConfig::load_from_path(path)?,
        None => WorkerConfig::default(),
    };
    config.apply_overrides(args.fingerprints, args.max_record_bytes)?;
    let limits = config.limits();

    let engine = SignatureEngine::load(config.fingerprints.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    info!(
        max_record_bytes = limits.max_record_bytes,
        "fingerprint worker ready"
    );
    let outcome = runtime.block_on(run_worker(
        &engine,
        tokio::io::stdin(),
        tokio::io::stdout(),
        limits,
    ));

    Ok(match outcome {
        Ok(summary) => {
            info!(
                records = summary.records_read,
                responses = summary.responses_written,
                decode_failures = summary.decode_failures,
                encode_failures = summary.encode_failures,
                "input exhausted, shutting down"
            );
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::from(EXIT_STREAM_FATAL),
    })
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

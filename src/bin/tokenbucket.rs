//! Entry point for the `tokenbucket` command line client.
//!
//! Parses arguments, builds a [`Client`] and runs one command. All protocol
//! work lives in the library; this file only owns process setup (logging,
//! Ctrl-C, argument parsing) and turns the result into an exit status.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokenbucket_client::{Client, ClientConfig, TokenBucketError};
use tracing_subscriber::EnvFilter;

/// Talk to a token bucket rate limiting server.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Server host (overrides the config file).
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port (overrides the config file).
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give up after this many seconds.
    #[arg(long)]
    deadline: Option<f64>,

    /// Give up after this many requests.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Consume one token, waiting as long as the server asks.
    Consume { bucket: String },
    /// Consume one token and lock the bucket.
    Lock { bucket: String },
    /// Release a bucket lock.
    Release { bucket: String },
    /// Set a bucket's refill rate (tokens per second).
    Rate { bucket: String, rate: f64 },
    /// Set a bucket's capacity.
    Capacity { bucket: String, capacity: u64 },
    /// Show a bucket's tokens, rate and capacity.
    Stats { bucket: String },
    /// Show the status of every bucket.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Diagnostics go to stderr; set RUST_LOG to control verbosity.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), TokenBucketError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(secs) = cli.deadline {
        let deadline = Duration::try_from_secs_f64(secs)
            .map_err(|e| TokenBucketError::Config(format!("deadline: {}", e)))?;
        config.deadline = Some(deadline);
    }
    if cli.max_attempts.is_some() {
        config.max_attempts = cli.max_attempts;
    }

    let client = Client::builder().with_config(config).build()?;

    let cancel = client.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let json = cli.json;
    match cli.command {
        Cmd::Consume { bucket } => {
            let grant = client.acquire(&bucket).await?;
            report(json, &bucket, "granted", grant.attempts, &grant.detail);
        }
        Cmd::Lock { bucket } => {
            let grant = client.lock(&bucket).await?;
            report(json, &bucket, "locked", grant.attempts, &grant.detail);
        }
        Cmd::Release { bucket } => print_detail(json, client.release(&bucket).await?),
        Cmd::Rate { bucket, rate } => print_detail(json, client.set_rate(&bucket, rate).await?),
        Cmd::Capacity { bucket, capacity } => {
            print_detail(json, client.set_capacity(&bucket, capacity).await?)
        }
        Cmd::Stats { bucket } => {
            let stats = client.stats(&bucket).await?;
            if json {
                println!("{}", serde_json::to_string(&stats)?);
            } else {
                println!(
                    "{}: tokens={} rate={} capacity={}",
                    bucket, stats.tokens, stats.rate, stats.capacity
                );
            }
        }
        Cmd::Status => print_detail(json, client.status().await?),
    }

    Ok(())
}

fn report(json: bool, bucket: &str, outcome: &str, attempts: u32, detail: &str) {
    if json {
        let value = serde_json::json!({
            "bucket": bucket,
            "outcome": outcome,
            "attempts": attempts,
            "detail": detail,
        });
        println!("{}", value);
    } else {
        println!("OK! Token {} for {} after {} attempt(s)", outcome, bucket, attempts);
    }
}

fn print_detail(json: bool, detail: String) {
    if json {
        println!("{}", serde_json::json!({ "detail": detail }));
    } else {
        println!("{}", detail);
    }
}

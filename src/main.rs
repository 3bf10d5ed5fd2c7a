//! chartflow-executor - applies or deletes one HelmRelease and waits for it
//!
//! Every task of a chartflow workflow runs this binary with a base64 YAML
//! release payload. Any failure is printed and turned into exit status 1 so
//! the workflow engine marks the task failed.

use anyhow::{Context, Result};
use chartflow::cli::{ExecutorRequest, execute, init_logging};
use chartflow::config::{ConfigLoader, parse_duration};
use chartflow::kube::{KubeStore, create_client};
use chartflow::models::ExecutorAction;
use clap::Parser;
use std::path::PathBuf;

/// Apply or delete one HelmRelease and wait for the outcome
#[derive(Parser, Debug)]
#[command(name = "chartflow-executor", version)]
#[command(about = "Apply or delete one HelmRelease and wait for the outcome", long_about = None)]
struct Args {
    /// Base64 encoded YAML HelmRelease
    #[arg(long, env = "CHARTFLOW_SPEC")]
    spec: String,

    /// How long to wait for the release (Go duration, e.g. 2m)
    #[arg(long)]
    timeout: Option<String>,

    /// What to do with the release
    #[arg(long, default_value = "install")]
    action: ExecutorAction,

    /// Poll interval (Go duration)
    #[arg(long)]
    interval: Option<String>,

    /// Configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'd')]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        tracing::error!("Executor failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ConfigLoader::load(args.config.as_deref()).context("Failed to load configuration")?;

    let timeout = args
        .timeout
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(config.executor.timeout.as_str());
    let interval = args
        .interval
        .as_deref()
        .unwrap_or(config.executor.poll_interval.as_str());

    let request = ExecutorRequest {
        spec: args.spec,
        action: args.action,
        interval: parse_duration(interval)
            .with_context(|| format!("Invalid poll interval {}", interval))?,
        timeout: parse_duration(timeout).with_context(|| format!("Invalid timeout {}", timeout))?,
    };

    let client = create_client().await?;
    let store = KubeStore::new(client);

    execute(&store, &store, &request)
        .await
        .with_context(|| format!("Failed to {} release", request.action))
}

//! RalphWorks service entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration** — flags and environment variables via `clap`;
//!    secrets (webhook secret, API key) are environment-only in deployment.
//! 2. **Wire observability** — configure `tracing-subscriber` with an
//!    env-filter and either human-readable or JSON output. All `tracing`
//!    spans and structured events emitted by every crate in the workspace
//!    flow through this layer.
//! 3. **Construct infrastructure** — create the concrete adapters
//!    (`GithubConnector`, `AnthropicProvider`) and inject them into the
//!    [`dispatch::Dispatcher`].
//! 4. **Serve** — run the webhook listener until a shutdown signal arrives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dispatch::dispatcher::Dispatcher;
use dispatch::identifiers::AppId;
use github::{AppCredentials, GithubConnector};
use llm::{AnthropicConfig, AnthropicProvider};

#[derive(Parser, Debug)]
#[command(
    name = "ralphd",
    about = "GitHub App webhook service answering /ralph commands on issues and pull requests"
)]
struct Args {
    /// Address to bind the webhook listener on.
    #[arg(long, env = "RALPH_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: SocketAddr,

    /// Shared secret used to verify webhook delivery signatures.
    #[arg(long, env = "RALPH_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: String,

    /// GitHub App id (the `iss` claim of the App assertion).
    #[arg(long, env = "RALPH_APP_ID")]
    app_id: u64,

    /// Path to the App's RSA private key in PEM form.
    #[arg(long, env = "RALPH_PRIVATE_KEY_PATH")]
    private_key_path: PathBuf,

    /// GitHub REST API base.
    #[arg(long, env = "RALPH_GITHUB_API_BASE", default_value = github::GITHUB_API_BASE)]
    github_api_base: String,

    /// Anthropic API key.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: String,

    /// Anthropic Messages API base.
    #[arg(long, env = "RALPH_ANTHROPIC_API_BASE", default_value = llm::ANTHROPIC_API_BASE)]
    anthropic_api_base: String,

    /// Model id for analysis calls.
    #[arg(long, env = "RALPH_MODEL", default_value = llm::DEFAULT_MODEL)]
    model: String,

    /// Emit logs as JSON instead of human-readable lines.
    #[arg(long, env = "RALPH_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let private_key_pem = std::fs::read_to_string(&args.private_key_path)
        .with_context(|| format!("failed to read {}", args.private_key_path.display()))?;

    let connector = GithubConnector::new(
        args.github_api_base,
        AppCredentials {
            app_id: AppId::new(args.app_id),
            private_key_pem,
        },
    )
    .context("failed to construct the GitHub connector")?;

    let completions = AnthropicProvider::new(AnthropicConfig {
        api_base: args.anthropic_api_base,
        api_key: args.anthropic_api_key,
        model: args.model,
    })
    .context("failed to construct the completion provider")?;

    let dispatcher = Arc::new(Dispatcher::new(
        args.webhook_secret,
        Arc::new(connector),
        Arc::new(completions),
    ));

    listener::serve(args.listen_addr, dispatcher, shutdown_signal())
        .await
        .context("webhook listener failed")?;
    Ok(())
}

//! judge-agent - HTTP remote execution agent.
//!
//! Usage:
//!   judge-agent [--port 8080] [--command <cmd>] [--arguments a,b] [--shell <line>]
//!               [--working-directory <dir>] [--artifacts x,y] [--timeout <secs>]

use anyhow::{Context, Result};
use clap::Parser;
use judge_agent::cli::Args;
use judge_agent::state::{AppState, AGENT_ID_ENV};
use judge_agent::{config, http_server, workspace};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let agent_id = uuid::Uuid::new_v4().to_string();
    // Published before the runtime spawns its worker threads; every command
    // the agent starts inherits it.
    std::env::set_var(AGENT_ID_ENV, &agent_id);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let span = info_span!("agent", agent_id = %agent_id);
    runtime.block_on(run(args, agent_id.clone()).instrument(span))
}

async fn run(args: Args, agent_id: String) -> Result<()> {
    info!("Starting");

    let config = config::resolve(&config::candidate_files(), args.overrides());
    info!(
        port = config.port,
        command = %config.command,
        arguments = ?config.arguments,
        working_root = %config.working_root.display(),
        artifacts = ?config.artifacts,
        timeout = ?config.timeout,
        "Resolved configuration"
    );

    let requests_root = workspace::prepare_root(&config.working_root)
        .context("Failed to prepare the working directory")?;

    let state = AppState::new(&agent_id, config, requests_root);
    http_server::run_server(state)
        .await
        .context("HTTP server failed")
}

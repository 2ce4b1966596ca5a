//! HTTP server implementation using Axum.

use crate::error::{AgentError, Result};
use crate::executor;
use crate::files::{self, InputFiles};
use crate::state::AppState;
use crate::workspace::Workspace;
use axum::{
    body::Bytes,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    #[serde(default)]
    files: Option<InputFiles>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process", post(process))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured port on all interfaces and serve until the listener fails.
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    info!("Starting HTTP server on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn process(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("request", agent_id = %state.agent_id, request_id = %request_id);

    // Runs detached from the connection so a client hanging up cannot cut
    // the run short or skip workspace removal.
    tokio::spawn(handle(state, request_id, body).instrument(span))
        .await
        .map_err(|e| {
            error!(error = %e, "Request task failed");
            AgentError::Task(e)
        })?
}

async fn handle(state: AppState, request_id: String, body: Bytes) -> Result<Response> {
    info!("Handling request");

    let workspace = {
        let requests_root = state.requests_root.clone();
        let id = request_id.clone();
        tokio::task::spawn_blocking(move || Workspace::create(&requests_root, &id)).await??
    };

    let request: ProcessRequest = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Failed to parse the request body");
        AgentError::InvalidBody(e)
    })?;

    let input = request.files.unwrap_or_default();
    let dir = workspace.path().to_path_buf();
    tokio::task::spawn_blocking(move || files::write_files(&input, &dir)).await??;

    let result = executor::run(&state.config, workspace.path()).await;

    let body = serde_json::to_vec(&result);
    workspace.close().await;
    let body = body.map_err(|e| {
        error!(error = %e, "Failed to create a response body");
        AgentError::Serialize(e)
    })?;

    info!(status = result.status, "Request completed");
    Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
}

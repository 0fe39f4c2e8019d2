use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use poll_core::{cast_vote, current_tally, handle_interaction, PollContext};
use serde::Deserialize;
use shared::{
    domain::VoterId,
    error::{ApiError, ErrorCode},
    protocol::{FrameInput, FrameView, TallyResponse},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Clone)]
struct AppState {
    poll: PollContext,
}

#[derive(Debug, Deserialize)]
struct CastVoteRequest {
    candidate: String,
    #[serde(default)]
    voter_id: Option<VoterId>,
}

const MAX_FRAME_BODY_BYTES: usize = 16 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let poll = settings.open_context().await.map_err(|error| {
        error!(%error, storage = %settings.storage, "failed to open poll state");
        error
    })?;

    let app = build_router(Arc::new(AppState { poll }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "poll frame listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("poll frame stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/frame", get(frame_intro).post(frame_interaction))
        .route("/tally", get(tally))
        .route("/votes", post(http_cast_vote))
        .layer(RequestBodyLimitLayer::new(MAX_FRAME_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn frame_intro(State(state): State<Arc<AppState>>) -> Json<FrameView> {
    Json(handle_interaction(&state.poll, FrameInput::default()).await)
}

/// Accepts any body: malformed payloads are logged and answered with the
/// intro card instead of a rejection.
async fn frame_interaction(State(state): State<Arc<AppState>>, body: Bytes) -> Json<FrameView> {
    let input = if body.is_empty() {
        FrameInput::default()
    } else {
        serde_json::from_slice::<FrameInput>(&body).unwrap_or_else(|error| {
            warn!(%error, bytes = body.len(), "malformed frame payload");
            FrameInput::default()
        })
    };
    Json(handle_interaction(&state.poll, input).await)
}

async fn tally(State(state): State<Arc<AppState>>) -> Json<TallyResponse> {
    Json(current_tally(&state.poll).await)
}

async fn http_cast_vote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CastVoteRequest>,
) -> Result<Json<TallyResponse>, (StatusCode, Json<ApiError>)> {
    let response = cast_vote(&state.poll, &req.candidate, req.voter_id.as_ref())
        .await
        .map_err(|e| (status_for(e.code), Json(e)))?;
    Ok(Json(response))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::AlreadyVoted => StatusCode::CONFLICT,
        ErrorCode::InvalidCandidate => StatusCode::BAD_REQUEST,
        ErrorCode::VoterIdRequired => StatusCode::UNAUTHORIZED,
        ErrorCode::StorageWrite => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use coordinator::Coordinator;
use execution::{PistonConfig, PistonExecutor};
use registry::SessionRegistry;
use serde::{Deserialize, Serialize};
use shared::domain::{LanguageMode, ParticipantName, SessionKey};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod ws;

use app_state::AppState;
use config::load_settings;

#[derive(Debug, Serialize, Deserialize)]
struct SessionSummaryResponse {
    session_key: SessionKey,
    members: Vec<ParticipantName>,
    language: LanguageMode,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    let executor = PistonExecutor::new(PistonConfig {
        endpoint: settings.execution_url.clone(),
        timeout: Duration::from_secs(settings.execution_timeout_secs),
    })
    .context("failed to build execution service client")?;
    let coordinator = Coordinator::new(SessionRegistry::new(), Arc::new(executor));
    let state = AppState::new(coordinator, settings.max_frame_bytes);
    let app = build_router(Arc::new(state), settings.static_dir.as_deref());

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    info!(
        %addr,
        execution_url = %settings.execution_url,
        static_dir = ?settings.static_dir,
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/sessions", get(list_sessions))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router,
    };
    router.layer(CorsLayer::permissive())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummaryResponse>> {
    let sessions = state
        .coordinator
        .registry()
        .summaries()
        .await
        .into_iter()
        .map(|summary| SessionSummaryResponse {
            session_key: summary.session_key,
            members: summary.members,
            language: summary.language,
        })
        .collect();
    Json(sessions)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max_frame_bytes = state.max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| ws::serve_connection(state, socket))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

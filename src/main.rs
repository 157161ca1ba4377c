//! Study Buddy · AI study-content backend
//!
//! - Axum JSON API: explanations, summaries, flashcards and quizzes generated by AI
//! - Primary/backup engines (Gemini, OpenRouter) with retries and automatic failover
//! - Quiz grading, XP, levels and badges, per-user history and leaderboard
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   GEMINI_API_KEY      : primary engine credentials
//!   GEMINI_MODEL        : default "gemini-flash-latest"
//!   GEMINI_BASE_URL     : default "https://generativelanguage.googleapis.com/v1beta"
//!   OPENROUTER_API_KEY  : backup engine credentials
//!   OPENROUTER_MODEL    : default "openai/gpt-3.5-turbo"
//!   OPENROUTER_BASE_URL : default "https://openrouter.ai/api/v1"
//!   REQUEST_TIMEOUT     : per-attempt timeout in seconds (default 25)
//!   STUDY_CONFIG_PATH   : path to TOML config (prompts, retry, xp, quiz policy)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod prompt;
mod providers;
mod retry;
mod orchestrator;
mod quiz;
mod scoring;
mod xp;
mod store;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config, engines and an empty progress store.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "study_buddy", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "study_buddy", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "study_buddy", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}

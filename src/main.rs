//! LinguaQuest · Level Progression Backend
//!
//! - Axum JSON API for locations, levels (theory, trial, boss), accounts and the wishing well
//! - Guest progress in a cookie-addressed session, account progress in SQLite
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT            : u16 (default 3000)
//!   DATABASE_PATH   : SQLite file (default "linguaquest.db", ":memory:" allowed)
//!   CATALOG_PATH    : TOML catalog; built-in seeds are used when unset or invalid
//!   SECURE_COOKIES  : "1"/"true" marks the session cookie Secure
//!   STATIC_DIR      : frontend directory (default "./static")
//!   SESSION_TTL_SECS: idle seconds before a session is dropped (default 14 days)
//!   LOG_LEVEL       : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default), "compact" or "json"

mod account;
mod catalog;
mod config;
mod db;
mod domain;
mod engine;
mod error;
mod extractors;
mod progress;
mod protocol;
mod rank;
mod routes;
mod seeds;
mod session;
mod shop;
mod slug;
mod state;
mod telemetry;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

const SESSION_SWEEP_SECS: u64 = 600;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = AppConfig::from_env();

  // Database, catalog and session store.
  let state = Arc::new(AppState::new(&cfg)?);

  // Sweep idle sessions in the background.
  let sessions = state.sessions.clone();
  tokio::spawn(async move {
    let mut tick = tokio::time::interval(Duration::from_secs(SESSION_SWEEP_SECS));
    loop {
      tick.tick().await;
      sessions.purge_expired().await;
    }
  });

  let app = build_router(state.clone(), &cfg.static_dir);

  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "linguaquest", %addr, db = %cfg.database_path, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "linguaquest", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "linguaquest", "Shutting down");
}

//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,progress=debug,linguaquest=debug,tower_http=info,axum=info").
//! - LOG_FORMAT selects "pretty" (default), "compact" for one line per event,
//!   or "json" structured logs.
//!
//! Targets in use: `linguaquest` (startup, sessions, storage), `progress`
//! (level transitions, rewards, merges), `catalog`, `account`.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,progress=debug,linguaquest=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        Ok("compact") => {
            builder.compact().init();
        }
        _ => {
            builder.init();
        }
    }
}

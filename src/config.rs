//! Runtime configuration (env variables) and the TOML catalog schema.
//!
//! See `AppConfig` and `CatalogCfg` for the expected inputs.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::LevelKind;

/// Process-level settings read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub port: u16,
  /// SQLite file for accounts and progress; ":memory:" keeps everything in RAM.
  pub database_path: String,
  pub catalog_path: Option<String>,
  pub secure_cookies: bool,
  pub static_dir: String,
  /// Idle time after which a session is forgotten.
  pub session_ttl_secs: u64,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      database_path: "linguaquest.db".into(),
      catalog_path: None,
      secure_cookies: false,
      static_dir: "./static".into(),
      session_ttl_secs: crate::session::DEFAULT_SESSION_TTL.as_secs(),
    }
  }
}

impl AppConfig {
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      port: std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(defaults.port),
      database_path: std::env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
      catalog_path: std::env::var("CATALOG_PATH").ok().filter(|p| !p.is_empty()),
      secure_cookies: std::env::var("SECURE_COOKIES")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(defaults.secure_cookies),
      static_dir: std::env::var("STATIC_DIR").unwrap_or(defaults.static_dir),
      session_ttl_secs: std::env::var("SESSION_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(defaults.session_ttl_secs),
    }
  }
}

/// Whole catalog as written in TOML: locations with their levels inline.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct CatalogCfg {
  #[serde(default)]
  pub locations: Vec<LocationCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LocationCfg {
  pub title: String,
  /// Derived from the title when absent.
  #[serde(default)] pub slug: Option<String>,
  #[serde(default)] pub desc: String,
  #[serde(default)] pub levels: Vec<LevelCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LevelCfg {
  pub title: String,
  #[serde(default)] pub slug: Option<String>,
  #[serde(default)] pub desc: String,
  pub kind: LevelKind,
  /// Defaults to the level's 1-based position in the location.
  #[serde(default)] pub order: Option<u32>,
  #[serde(default)] pub exp_reward: u32,
  #[serde(default)] pub coins_reward: u32,
  #[serde(default)] pub questions: Vec<QuestionCfg>,
  #[serde(default)] pub boss: Option<BossCfg>,
}

/// A question inlined into a level. Questions sharing a `key` are the same
/// entity; later occurrences may omit the answers.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  #[serde(default)] pub key: Option<String>,
  pub text: String,
  #[serde(default)] pub images: Vec<String>,
  #[serde(default)] pub answers: Vec<AnswerCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AnswerCfg {
  pub text: String,
  #[serde(default)] pub correct: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BossCfg {
  pub name: String,
  pub hp: i32,
  #[serde(default)] pub exp_reward: u32,
  #[serde(default)] pub coins_reward: u32,
  #[serde(default)] pub words: Vec<String>,
}

/// Read and parse a catalog file. On any IO/parse error, logs and returns None.
pub fn load_catalog_config(path: &str) -> Option<CatalogCfg> {
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<CatalogCfg>(&s) {
      Ok(cfg) => {
        info!(target: "catalog", %path, locations = cfg.locations.len(), "Loaded catalog config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "catalog", %path, error = %e, "Failed to parse TOML catalog");
        None
      }
    },
    Err(e) => {
      error!(target: "catalog", %path, error = %e, "Failed to read TOML catalog file");
      None
    }
  }
}

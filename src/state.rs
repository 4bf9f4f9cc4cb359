//! Application state: the immutable catalog, the account database, the session
//! store, and the per-request player context built from them.

use std::{sync::Arc, time::Duration};

use tracing::{info, instrument, warn};

use crate::catalog::Catalog;
use crate::config::{load_catalog_config, AppConfig};
use crate::db::Db;
use crate::error::AppError;
use crate::progress::PlayerCtx;
use crate::seeds::seed_catalog;
use crate::session::{keys, SessionData, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub db: Db,
    pub sessions: SessionStore,
    pub secure_cookies: bool,
}

impl AppState {
    /// Build state from config: open the database and load the catalog (TOML
    /// when configured and valid, built-in seeds otherwise).
    #[instrument(level = "info", skip_all)]
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let db = Db::open(&cfg.database_path)?;
        let catalog = load_catalog(cfg.catalog_path.as_deref())?;
        let mut state = Self::with_parts(catalog, db, cfg.secure_cookies);
        state.sessions = SessionStore::with_ttl(Duration::from_secs(cfg.session_ttl_secs));
        Ok(state)
    }

    pub fn with_parts(catalog: Catalog, db: Db, secure_cookies: bool) -> Self {
        Self {
            catalog: Arc::new(catalog),
            db,
            sessions: SessionStore::default(),
            secure_cookies,
        }
    }

    /// Account context when the session is linked to an existing user, guest
    /// context otherwise. A link to a vanished user is dropped.
    pub fn player_ctx(&self, mut session: SessionData) -> Result<PlayerCtx, AppError> {
        if let Some(user_id) = session.auth_user_id() {
            if self.db.get_user(user_id)?.is_some() {
                return Ok(PlayerCtx::account(session, self.db.clone(), user_id));
            }
            warn!(target: "account", user_id, "Session points at a missing user; continuing as guest");
            session.remove(keys::AUTH_USER_ID);
        }
        Ok(PlayerCtx::guest(session))
    }
}

fn load_catalog(path: Option<&str>) -> Result<Catalog, AppError> {
    if let Some(path) = path {
        if let Some(cfg) = load_catalog_config(path) {
            match Catalog::from_config(&cfg) {
                Ok(catalog) => {
                    info!(target: "catalog", %path, locations = catalog.locations().len(), "Catalog loaded from TOML");
                    return Ok(catalog);
                }
                Err(e) => warn!(target: "catalog", %path, error = %e, "Invalid catalog; using built-in seeds"),
            }
        }
    }
    let catalog = Catalog::from_config(&seed_catalog()).map_err(|e| AppError::Internal(e.to_string()))?;
    info!(target: "catalog", locations = catalog.locations().len(), "Using built-in seed catalog");
    Ok(catalog)
}

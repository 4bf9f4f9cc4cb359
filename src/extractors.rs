//! Request extractors.

use std::{convert::Infallible, sync::Arc};

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::session::{SessionData, SessionStore, SESSION_COOKIE_NAME};
use crate::state::AppState;

/// The visitor's session, loaded from the cookie or freshly started.
/// Handlers hand it back through `SessionStore::commit` when they are done;
/// nothing is stored until the session holds something.
pub struct PlayerSession {
    pub id: String,
    pub data: SessionData,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for PlayerSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(id) = jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string()) {
            if let Some(data) = state.sessions.load(&id).await {
                return Ok(Self { id, data });
            }
        }
        let id = SessionStore::new_id();
        debug!(target: "linguaquest", session = %id, "New visitor session");
        Ok(Self { id, data: SessionData::default() })
    }
}

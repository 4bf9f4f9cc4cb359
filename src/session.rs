//! Browser session storage: a string → JSON map per visitor, held in memory and
//! addressed by a UUID cookie.
//!
//! The progression core only touches the keys defined in `keys`.

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::Id;

pub const SESSION_COOKIE_NAME: &str = "linguaquest_session";
/// Two weeks without a request and a session is gone.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Session key namespace.
pub mod keys {
  /// Slugs of levels a guest has passed.
  pub const PASSED_LEVELS: &str = "passed_levels";
  pub const GUEST_EXP: &str = "guest_exp";
  pub const GUEST_COINS: &str = "guest_coins";
  pub const AUTH_USER_ID: &str = "_auth_user_id";
  pub const STEPS_PREFIX: &str = "steps:";

  /// Completed step indices of a level (guest only).
  pub fn steps(slug: &str) -> String {
    format!("{STEPS_PREFIX}{slug}")
  }

  /// Wrong-answer counter of one trial step.
  pub fn trial_attempts(slug: &str, step: u32) -> String {
    format!("trial_attempts:{slug}:{step}")
  }

  /// Ongoing boss fight state.
  pub fn boss(slug: &str) -> String {
    format!("boss:{slug}")
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionData {
  values: Map<String, Value>,
}

impl SessionData {
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
    self.values
      .get(key)
      .map(|v| serde_json::from_value(v.clone()))
      .transpose()
  }

  pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, serde_json::Error> {
    Ok(self.get(key)?.unwrap_or_default())
  }

  pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), serde_json::Error> {
    self.values.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(())
  }

  pub fn remove(&mut self, key: &str) -> Option<Value> {
    self.values.remove(key)
  }

  /// Remove and decode in one go.
  pub fn pop<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, serde_json::Error> {
    self.values.remove(key).map(serde_json::from_value).transpose()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.values.contains_key(key)
  }

  pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
    self.values.keys().filter(|k| k.starts_with(prefix)).cloned().collect()
  }

  pub fn auth_user_id(&self) -> Option<Id> {
    self.values.get(keys::AUTH_USER_ID).and_then(Value::as_i64)
  }

  pub fn clear(&mut self) {
    self.values.clear();
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

struct Entry {
  data: SessionData,
  touched: Instant,
}

/// Sessions live until `ttl` passes without a commit. Empty sessions are
/// never stored.
#[derive(Clone)]
pub struct SessionStore {
  inner: Arc<RwLock<HashMap<String, Entry>>>,
  ttl: Duration,
}

impl Default for SessionStore {
  fn default() -> Self {
    Self::with_ttl(DEFAULT_SESSION_TTL)
  }
}

impl SessionStore {
  pub fn with_ttl(ttl: Duration) -> Self {
    Self { inner: Arc::default(), ttl }
  }

  pub fn new_id() -> String {
    Uuid::new_v4().to_string()
  }

  pub async fn load(&self, id: &str) -> Option<SessionData> {
    let sessions = self.inner.read().await;
    let entry = sessions.get(id)?;
    (entry.touched.elapsed() < self.ttl).then(|| entry.data.clone())
  }

  /// Store the session and hand back the cookie that addresses it. An empty
  /// session drops the stored entry, and the cookie with it if there was one.
  #[instrument(level = "debug", skip(self, data))]
  pub async fn commit(&self, id: String, data: SessionData, secure: bool) -> CookieJar {
    if data.is_empty() {
      if self.inner.write().await.remove(&id).is_none() {
        return CookieJar::new();
      }
      debug!(target: "linguaquest", "Session emptied; entry dropped");
      let mut gone = Cookie::build((SESSION_COOKIE_NAME, "")).path("/").build();
      gone.make_removal();
      return CookieJar::new().add(gone);
    }

    debug!(target: "linguaquest", keys = data.values.len(), "Session saved");
    self.inner.write().await.insert(id.clone(), Entry { data, touched: Instant::now() });
    let cookie = Cookie::build((SESSION_COOKIE_NAME, id))
      .path("/")
      .http_only(true)
      .same_site(SameSite::Lax)
      .secure(secure);
    CookieJar::new().add(cookie)
  }

  /// Retire `old` and return a fresh id for the same visitor; the caller
  /// commits the data under the new id.
  pub async fn rotate(&self, old: &str) -> String {
    self.inner.write().await.remove(old);
    Self::new_id()
  }

  /// Drop every session idle for longer than the TTL. Returns how many went.
  pub async fn purge_expired(&self) -> usize {
    let mut sessions = self.inner.write().await;
    let before = sessions.len();
    sessions.retain(|_, e| e.touched.elapsed() < self.ttl);
    let purged = before - sessions.len();
    if purged > 0 {
      info!(target: "linguaquest", purged, remaining = sessions.len(), "Expired sessions purged");
    }
    purged
  }

  #[cfg(test)]
  pub async fn len(&self) -> usize {
    self.inner.read().await.len()
  }
}

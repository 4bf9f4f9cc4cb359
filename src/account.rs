//! Accounts: registration, login (with the one-time guest merge) and logout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::catalog::Catalog;
use crate::db::Db;
use crate::domain::{Id, User};
use crate::error::AppError;
use crate::session::{keys, SessionData};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, Debug, Deserialize)]
pub struct RegisterForm {
  pub name: String,
  pub email: String,
  pub password: String,
  pub password_confirm: String,
}

/// What a login carried over from the guest session.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct MergeReport {
  pub levels_passed: usize,
  pub levels_in_progress: usize,
  pub exp: i64,
  pub coins: i64,
}

/// Trim, and lowercase the domain part.
pub fn normalize_email(email: &str) -> String {
  let email = email.trim();
  match email.rsplit_once('@') {
    Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
    None => email.to_string(),
  }
}

/// Create an account. Every problem is reported per field, duplicates included.
#[instrument(level = "info", skip(db, form), fields(email = %form.email))]
pub fn register(db: &Db, form: &RegisterForm) -> Result<User, AppError> {
  let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
  let mut push = |field: &str, msg: &str| errors.entry(field.to_string()).or_default().push(msg.to_string());

  let name = form.name.trim();
  let email = normalize_email(&form.email);
  if name.is_empty() {
    push("name", "Name is required.");
  }
  match email.split_once('@') {
    Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
    _ => push("email", "Enter a valid email address."),
  }
  if form.password.chars().count() < MIN_PASSWORD_LEN {
    push("password", "Password must be at least 8 characters.");
  }
  if form.password != form.password_confirm {
    push("password_confirm", "Passwords do not match.");
  }
  if !email.is_empty() && db.email_exists(&email)? {
    push("email", "A user with this email already exists. Try logging in.");
  }

  if !errors.is_empty() {
    info!(target: "account", fields = ?errors.keys().collect::<Vec<_>>(), "Registration rejected");
    return Err(AppError::Validation(errors));
  }
  db.create_user(name, &email, &form.password)
}

/// Verify credentials, attach the account to the session and fold guest
/// progress into it.
#[instrument(level = "info", skip(db, catalog, session, password))]
pub fn login(
  db: &Db,
  catalog: &Catalog,
  session: &mut SessionData,
  email: &str,
  password: &str,
) -> Result<(User, MergeReport), AppError> {
  let email = normalize_email(email);
  let Some(user) = db.verify_user_password(&email, password)? else {
    info!(target: "account", %email, "Login failed");
    return Err(AppError::Unauthorized("invalid email or password".into()));
  };
  session.set(keys::AUTH_USER_ID, &user.id)?;
  let report = merge_guest_progress(db, catalog, session, user.id)?;
  info!(target: "account", user_id = user.id, ?report, "Logged in");
  // Re-read so the wallet reflects the merged resources.
  let user = db.get_user(user.id)?.unwrap_or(user);
  Ok((user, report))
}

/// Move guest progress into persisted rows: every passed slug gets a passed
/// row, recorded step lists are copied where the row has none, and guest
/// exp/coins are added to the account. The guest keys are consumed.
#[instrument(level = "info", skip(db, catalog, session))]
pub fn merge_guest_progress(
  db: &Db,
  catalog: &Catalog,
  session: &mut SessionData,
  user_id: Id,
) -> Result<MergeReport, AppError> {
  let mut report = MergeReport::default();

  let passed: Vec<String> = session.pop(keys::PASSED_LEVELS)?.unwrap_or_default();
  for slug in &passed {
    let Some(level) = catalog.level_by_slug(slug) else {
      warn!(target: "progress", %slug, "Guest passed an unknown level; skipping");
      continue;
    };
    db.get_or_create_progress(user_id, level.id)?;
    db.mark_passed(user_id, level.id)?;
    report.levels_passed += 1;
  }

  for key in session.keys_with_prefix(keys::STEPS_PREFIX) {
    let steps: Vec<u32> = session.pop(&key)?.unwrap_or_default();
    let slug = &key[keys::STEPS_PREFIX.len()..];
    let Some(level) = catalog.level_by_slug(slug) else {
      continue;
    };
    if steps.is_empty() {
      continue;
    }
    db.set_steps_if_empty(user_id, level.id, &steps)?;
    if !passed.iter().any(|p| p == slug) {
      report.levels_in_progress += 1;
    }
  }

  report.exp = session.pop(keys::GUEST_EXP)?.unwrap_or(0);
  report.coins = session.pop(keys::GUEST_COINS)?.unwrap_or(0);
  if report.exp != 0 || report.coins != 0 {
    db.add_resources(user_id, report.exp, report.coins)?;
  }

  info!(
    target: "progress",
    user_id,
    levels_passed = report.levels_passed,
    levels_in_progress = report.levels_in_progress,
    exp = report.exp,
    coins = report.coins,
    "Guest progress merged"
  );
  Ok(report)
}

/// Drop everything the session holds, account link included.
pub fn logout(session: &mut SessionData) {
  if let Some(user_id) = session.auth_user_id() {
    info!(target: "account", user_id, "Logged out");
  }
  session.clear();
}

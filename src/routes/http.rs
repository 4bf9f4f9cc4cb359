//! HTTP endpoint handlers. These are thin wrappers that forward to the engine,
//! account and shop modules, then persist the session and return its cookie.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, Json, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tracing::{info, instrument};

use crate::account::{self, RegisterForm};
use crate::catalog::Catalog;
use crate::domain::Level;
use crate::engine::{self, BossOutcome, LocationMap, StepOutcome};
use crate::error::AppError;
use crate::extractors::PlayerSession;
use crate::progress::PlayerCtx;
use crate::protocol::*;
use crate::rank::calc_rank;
use crate::session::keys;
use crate::shop::{self, TossOutcome, TOSS_COST};
use crate::state::AppState;

type Reply<T> = Result<(CookieJar, Json<T>), AppError>;

fn find_level<'a>(catalog: &'a Catalog, slug: &str) -> Result<&'a Level, AppError> {
  catalog.level_by_slug(slug).ok_or_else(|| AppError::NotFound(format!("level '{slug}'")))
}

/// Store the (possibly updated) session and attach its cookie to the reply.
async fn reply<T: Serialize>(state: &AppState, id: String, ctx: PlayerCtx, body: T) -> Reply<T> {
  let jar = state.sessions.commit(id, ctx.into_session(), state.secure_cookies).await;
  Ok((jar, Json(body)))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, session))]
pub async fn http_me(State(state): State<Arc<AppState>>, session: PlayerSession) -> Reply<MeOut> {
  let mut ctx = state.player_ctx(session.data)?;
  let wallet = ctx.progress().wallet()?;
  let (user, levels_passed) = match ctx.user_id() {
    Some(id) => {
      let passed = state.db.progress_rows(id)?.iter().filter(|r| r.passed).count();
      (state.db.get_user(id)?, passed)
    }
    None => {
      let passed: Vec<String> = ctx.session.get_or_default(keys::PASSED_LEVELS)?;
      (None, passed.len())
    }
  };
  let out = MeOut {
    guest: ctx.is_guest(),
    name: user.as_ref().map(|u| u.name.clone()),
    email: user.map(|u| u.email),
    wallet,
    rank: calc_rank(wallet.exp),
    levels_passed,
  };
  reply(&state, session.id, ctx, out).await
}

#[instrument(level = "info", skip(state))]
pub async fn http_locations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let out: Vec<LocationOut> = state.catalog.locations().iter().map(LocationOut::from).collect();
  Json(out)
}

#[instrument(level = "info", skip(state, session))]
pub async fn http_location(
  State(state): State<Arc<AppState>>,
  Path(slug): Path<String>,
  session: PlayerSession,
) -> Reply<LocationMap> {
  let catalog = state.catalog.clone();
  let location = catalog
    .location_by_slug(&slug)
    .ok_or_else(|| AppError::NotFound(format!("location '{slug}'")))?;
  let mut ctx = state.player_ctx(session.data)?;
  let map = engine::location_map(&catalog, &mut ctx, location)?;
  reply(&state, session.id, ctx, map).await
}

/// Map of the first location: where a new player starts.
#[instrument(level = "info", skip(state, session))]
pub async fn http_map(State(state): State<Arc<AppState>>, session: PlayerSession) -> Reply<LocationMap> {
  let catalog = state.catalog.clone();
  let location = catalog
    .first_location()
    .ok_or_else(|| AppError::NotFound("no locations configured".into()))?;
  let mut ctx = state.player_ctx(session.data)?;
  let map = engine::location_map(&catalog, &mut ctx, location)?;
  reply(&state, session.id, ctx, map).await
}

#[instrument(level = "info", skip(state, session), fields(step = ?q.step))]
pub async fn http_get_level(
  State(state): State<Arc<AppState>>,
  Path(slug): Path<String>,
  Query(q): Query<LevelQuery>,
  session: PlayerSession,
) -> Reply<LevelOut> {
  let catalog = state.catalog.clone();
  let level = find_level(&catalog, &slug)?;
  let mut ctx = state.player_ctx(session.data)?;
  let view = engine::view_level(&catalog, &mut ctx, level, q.step)?;
  let out = LevelOut {
    slug: level.slug.clone(),
    title: level.title.clone(),
    desc: level.desc.clone(),
    kind: level.kind,
    location: catalog.location(level.location_id).map(|l| l.slug.clone()).unwrap_or_default(),
    view,
  };
  reply(&state, session.id, ctx, out).await
}

#[instrument(level = "info", skip(state, session, body), fields(step = body.step, answer_id = ?body.answer_id))]
pub async fn http_post_theory(
  State(state): State<Arc<AppState>>,
  Path(slug): Path<String>,
  session: PlayerSession,
  Json(body): Json<TheoryIn>,
) -> Reply<StepOutcome> {
  let catalog = state.catalog.clone();
  let level = find_level(&catalog, &slug)?;
  let mut ctx = state.player_ctx(session.data)?;
  let out = engine::submit_theory(&catalog, &mut ctx, level, body.step, body.answer_id)?;
  reply(&state, session.id, ctx, out).await
}

#[instrument(level = "info", skip(state, session, body), fields(step = body.step, answer_len = body.answer.len()))]
pub async fn http_post_trial(
  State(state): State<Arc<AppState>>,
  Path(slug): Path<String>,
  session: PlayerSession,
  Json(body): Json<TrialIn>,
) -> Reply<StepOutcome> {
  let catalog = state.catalog.clone();
  let level = find_level(&catalog, &slug)?;
  let mut ctx = state.player_ctx(session.data)?;
  let out = engine::submit_trial(&catalog, &mut ctx, level, body.step, &body.answer)?;
  reply(&state, session.id, ctx, out).await
}

#[instrument(level = "info", skip(state, session, body), fields(word = %body.word))]
pub async fn http_post_boss(
  State(state): State<Arc<AppState>>,
  Path(slug): Path<String>,
  session: PlayerSession,
  Json(body): Json<BossIn>,
) -> Reply<BossOutcome> {
  let catalog = state.catalog.clone();
  let level = find_level(&catalog, &slug)?;
  let mut ctx = state.player_ctx(session.data)?;
  let out = engine::submit_word(&catalog, &mut ctx, level, &body.word)?;
  reply(&state, session.id, ctx, out).await
}

/// Create the account and sign straight in, which also merges guest progress.
#[instrument(level = "info", skip(state, session, form), fields(email = %form.email))]
pub async fn http_register(
  State(state): State<Arc<AppState>>,
  session: PlayerSession,
  Json(form): Json<RegisterForm>,
) -> Reply<AuthOut> {
  let user = account::register(&state.db, &form)?;
  info!(target: "account", user_id = user.id, "Registered");
  let mut data = session.data;
  let (user, merged) = account::login(&state.db, &state.catalog, &mut data, &user.email, &form.password)?;
  let ctx = state.player_ctx(data)?;
  let id = state.sessions.rotate(&session.id).await;
  reply(&state, id, ctx, AuthOut { user: user.into(), merged: Some(merged) }).await
}

#[instrument(level = "info", skip(state, session, body), fields(email = %body.email))]
pub async fn http_login(
  State(state): State<Arc<AppState>>,
  session: PlayerSession,
  Json(body): Json<LoginIn>,
) -> Reply<AuthOut> {
  let mut data = session.data;
  let (user, merged) = account::login(&state.db, &state.catalog, &mut data, &body.email, &body.password)?;
  let ctx = state.player_ctx(data)?;
  // Fresh id once signed in; the pre-login cookie stops working.
  let id = state.sessions.rotate(&session.id).await;
  reply(&state, id, ctx, AuthOut { user: user.into(), merged: Some(merged) }).await
}

#[instrument(level = "info", skip(state, session))]
pub async fn http_logout(State(state): State<Arc<AppState>>, session: PlayerSession) -> Reply<LogoutOut> {
  let mut data = session.data;
  account::logout(&mut data);
  reply(&state, session.id, PlayerCtx::guest(data), LogoutOut { ok: true }).await
}

#[instrument(level = "info", skip(state, session))]
pub async fn http_toss_coin(State(state): State<Arc<AppState>>, session: PlayerSession) -> Reply<TossOutcome> {
  let mut ctx = state.player_ctx(session.data)?;
  let out = shop::toss_coin(&mut ctx, TOSS_COST)?;
  reply(&state, session.id, ctx, out).await
}

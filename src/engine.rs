//! Level progression: access gate, theory/trial step machines, boss fights and
//! the completion bookkeeping shared by all three.
//!
//! Everything here works against `PlayerCtx`, so guests and accounts follow the
//! same transitions. Declined states (access denied, wrong answer, fail) are
//! ordinary outcomes, never errors.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::catalog::Catalog;
use crate::domain::{Id, Level, LevelKind, Location, Reward, Wallet};
use crate::error::AppError;
use crate::progress::PlayerCtx;
use crate::protocol::location_path;
use crate::session::keys;
use crate::slug::normalize_answer;

/// Wrong answers allowed on one trial step before the attempt fails.
pub const TRIAL_MAX_ATTEMPTS: u32 = 3;
/// Player hit points at the start of every boss fight.
pub const PLAYER_START_HP: i32 = 5;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Access {
  Granted,
  /// The previous level has to be passed first; `redirect` points at the map.
  Denied { required_level: String, redirect: String },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CompletionSummary {
  pub level: String,
  pub reward: Reward,
  pub repeat: bool,
  pub wallet: Wallet,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AnswerView {
  pub id: Id,
  pub text: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct QuestionView {
  pub id: Id,
  pub text: String,
  pub images: Vec<String>,
  /// Empty for trial levels (free text) and reading steps.
  pub answers: Vec<AnswerView>,
}

/// What a GET on a level shows.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LevelView {
  AccessDenied { required_level: String, redirect: String },
  Question { step: u32, total: u32, question: QuestionView },
  /// Every step is behind the player (or the level has none).
  Finished { total: u32, passed: bool },
  InvalidStep { step: u32, max_step: u32 },
  BossFight { boss: String, boss_hp: i32, boss_max_hp: i32, player_hp: i32, used_words: Vec<String> },
}

/// Result of submitting a theory or trial step.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
  AccessDenied { required_level: String, redirect: String },
  InvalidStep { step: u32, max_step: u32 },
  Advanced { next_step: u32, total: u32 },
  /// `attempts_left` is only reported on trial levels.
  WrongAnswer { step: u32, attempts_left: Option<u32> },
  /// Trial retry budget exhausted; the counter starts over.
  Failed { step: u32, attempts: u32 },
  Completed(CompletionSummary),
}

/// Combat state kept in the session between requests.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BossFight {
  pub boss_hp: i32,
  pub player_hp: i32,
  pub used_words: Vec<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BossOutcome {
  AccessDenied { required_level: String, redirect: String },
  Hit { word: String, boss_hp: i32, player_hp: i32 },
  Miss { word: String, boss_hp: i32, player_hp: i32 },
  /// Word already landed in this fight; nothing changes.
  AlreadyUsed { word: String, boss_hp: i32, player_hp: i32 },
  Victory(CompletionSummary),
  Defeat { boss_hp: i32 },
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LevelMapEntry {
  pub slug: String,
  pub title: String,
  pub kind: LevelKind,
  pub order: u32,
  pub passed: bool,
  pub accessible: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LocationMap {
  pub slug: String,
  pub title: String,
  pub desc: String,
  pub levels: Vec<LevelMapEntry>,
}

// ---------------------------------------------------------------------------
// Access gate
// ---------------------------------------------------------------------------

/// A level is open when it is first in its location or its predecessor is passed.
#[instrument(level = "debug", skip(catalog, ctx, level), fields(level = %level.slug))]
pub fn check_access(catalog: &Catalog, ctx: &mut PlayerCtx, level: &Level) -> Result<Access, AppError> {
  let Some(prev) = catalog.previous_level(level) else {
    return Ok(Access::Granted);
  };
  if ctx.progress().is_passed(prev)? {
    return Ok(Access::Granted);
  }
  let location = catalog.location(level.location_id).map(|l| l.slug.as_str()).unwrap_or_default();
  info!(target: "progress", level = %level.slug, required = %prev.slug, "Access denied");
  Ok(Access::Denied { required_level: prev.slug.clone(), redirect: location_path(location) })
}

#[instrument(level = "debug", skip(catalog, ctx, location), fields(location = %location.slug))]
pub fn location_map(catalog: &Catalog, ctx: &mut PlayerCtx, location: &Location) -> Result<LocationMap, AppError> {
  let mut levels = Vec::new();
  let mut prev_passed = true;
  for level in catalog.levels_of(location.id) {
    let passed = ctx.progress().is_passed(level)?;
    levels.push(LevelMapEntry {
      slug: level.slug.clone(),
      title: level.title.clone(),
      kind: level.kind,
      order: level.order,
      passed,
      accessible: prev_passed,
    });
    prev_passed = passed;
  }
  Ok(LocationMap {
    slug: location.slug.clone(),
    title: location.title.clone(),
    desc: location.desc.clone(),
    levels,
  })
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Check repeat status, then compute the reward, then persist "passed" and
/// credit the wallet. `reward_for` is `Level::reward` or `Boss::reward`.
/// The run's step list is cleared so a replay starts over at step 0.
#[instrument(level = "info", skip(ctx, level, reward_for), fields(level = %level.slug))]
fn complete_level(
  ctx: &mut PlayerCtx,
  level: &Level,
  reward_for: impl FnOnce(bool) -> Reward,
) -> Result<CompletionSummary, AppError> {
  let mut store = ctx.progress();
  let repeat = store.is_passed(level)?;
  let reward = reward_for(repeat);
  store.mark_passed(level)?;
  store.reset_steps(level)?;
  store.add_resources(reward)?;
  let wallet = store.wallet()?;
  info!(
    target: "progress",
    level = %level.slug,
    repeat,
    exp = reward.exp,
    coins = reward.coins,
    total_exp = wallet.exp,
    total_coins = wallet.coins,
    "Level completed"
  );
  Ok(CompletionSummary { level: level.slug.clone(), reward, repeat, wallet })
}

// ---------------------------------------------------------------------------
// Theory / trial step machines
// ---------------------------------------------------------------------------

/// Furthest step the player may be on: the first step not yet completed.
fn first_open_step(completed: &[u32], total: u32) -> u32 {
  (0..total).find(|s| !completed.contains(s)).unwrap_or(total)
}

/// `None` when `step` is reachable. Steps past the first open one are locked,
/// replays included: a completed run leaves no steps behind.
fn check_step(ctx: &mut PlayerCtx, level: &Level, step: u32, total: u32) -> Result<Option<(u32, u32)>, AppError> {
  let max_step = first_open_step(&ctx.progress().completed_steps(level)?, total);
  if step > max_step {
    return Ok(Some((step, max_step)));
  }
  Ok(None)
}

fn expect_kind(level: &Level, kind: LevelKind) -> Result<(), AppError> {
  if level.kind != kind {
    return Err(AppError::BadRequest(format!(
      "level '{}' is a {:?} level, not {:?}",
      level.slug, level.kind, kind
    )));
  }
  Ok(())
}

/// Mark `step` done and either move on or finish the level.
fn advance(ctx: &mut PlayerCtx, level: &Level, step: u32, total: u32) -> Result<StepOutcome, AppError> {
  ctx.progress().mark_step_completed(level, step)?;
  let next_step = step + 1;
  if next_step >= total {
    let summary = complete_level(ctx, level, |repeat| level.reward(repeat))?;
    return Ok(StepOutcome::Completed(summary));
  }
  info!(target: "progress", level = %level.slug, next_step, total, "Step advanced");
  Ok(StepOutcome::Advanced { next_step, total })
}

/// Shared prologue of step submissions: access gate and step validation.
/// Returns the declined outcome if one applies.
fn gate_step(
  catalog: &Catalog,
  ctx: &mut PlayerCtx,
  level: &Level,
  step: u32,
  total: u32,
) -> Result<Option<StepOutcome>, AppError> {
  if let Access::Denied { required_level, redirect } = check_access(catalog, ctx, level)? {
    return Ok(Some(StepOutcome::AccessDenied { required_level, redirect }));
  }
  if let Some((step, max_step)) = check_step(ctx, level, step, total)? {
    return Ok(Some(StepOutcome::InvalidStep { step, max_step }));
  }
  // The terminal step of a level with questions is reached by answering, not by submitting it.
  if step == total && total > 0 {
    return Ok(Some(StepOutcome::InvalidStep { step, max_step: total - 1 }));
  }
  Ok(None)
}

/// Theory submission: the chosen answer must be the correct one; steps without
/// answers are pure reading and always advance.
#[instrument(level = "info", skip(catalog, ctx, level), fields(level = %level.slug))]
pub fn submit_theory(
  catalog: &Catalog,
  ctx: &mut PlayerCtx,
  level: &Level,
  step: u32,
  answer_id: Option<Id>,
) -> Result<StepOutcome, AppError> {
  expect_kind(level, LevelKind::Theory)?;
  let questions = catalog.questions_for(level);
  let total = questions.len() as u32;
  if let Some(declined) = gate_step(catalog, ctx, level, step, total)? {
    return Ok(declined);
  }
  if total == 0 {
    let summary = complete_level(ctx, level, |repeat| level.reward(repeat))?;
    return Ok(StepOutcome::Completed(summary));
  }

  let question = questions[step as usize];
  let answers = catalog.answers_for(question.id);
  if !answers.is_empty() {
    let correct = answer_id.is_some_and(|id| answers.iter().any(|a| a.id == id && a.is_correct));
    if !correct {
      info!(target: "progress", level = %level.slug, step, ?answer_id, "Wrong theory answer");
      return Ok(StepOutcome::WrongAnswer { step, attempts_left: None });
    }
  }
  advance(ctx, level, step, total)
}

/// Trial submission: free text compared in normalized form against every
/// accepted answer, with `TRIAL_MAX_ATTEMPTS` tries per step.
#[instrument(level = "info", skip(catalog, ctx, level, text), fields(level = %level.slug, text_len = text.len()))]
pub fn submit_trial(
  catalog: &Catalog,
  ctx: &mut PlayerCtx,
  level: &Level,
  step: u32,
  text: &str,
) -> Result<StepOutcome, AppError> {
  expect_kind(level, LevelKind::Trial)?;
  let questions = catalog.questions_for(level);
  let total = questions.len() as u32;
  if let Some(declined) = gate_step(catalog, ctx, level, step, total)? {
    return Ok(declined);
  }
  if total == 0 {
    let summary = complete_level(ctx, level, |repeat| level.reward(repeat))?;
    return Ok(StepOutcome::Completed(summary));
  }

  let question = questions[step as usize];
  let given = normalize_answer(text);
  let mut accepted = catalog.answers_for(question.id).iter().filter(|a| a.is_correct).peekable();
  let correct = accepted.peek().is_none() || (!given.is_empty() && accepted.any(|a| normalize_answer(&a.text) == given));

  let attempts_key = keys::trial_attempts(&level.slug, step);
  if correct {
    ctx.session.remove(&attempts_key);
    return advance(ctx, level, step, total);
  }

  let attempts = ctx.session.get_or_default::<u32>(&attempts_key)? + 1;
  if attempts >= TRIAL_MAX_ATTEMPTS {
    ctx.session.remove(&attempts_key);
    warn!(target: "progress", level = %level.slug, step, attempts, "Trial attempts exhausted");
    return Ok(StepOutcome::Failed { step, attempts });
  }
  ctx.session.set(&attempts_key, &attempts)?;
  info!(target: "progress", level = %level.slug, step, attempts, "Wrong trial answer");
  Ok(StepOutcome::WrongAnswer { step, attempts_left: Some(TRIAL_MAX_ATTEMPTS - attempts) })
}

// ---------------------------------------------------------------------------
// Boss fight
// ---------------------------------------------------------------------------

fn load_fight(ctx: &PlayerCtx, level: &Level, boss_hp: i32) -> Result<BossFight, AppError> {
  Ok(ctx.session.get(&keys::boss(&level.slug))?.unwrap_or(BossFight {
    boss_hp,
    player_hp: PLAYER_START_HP,
    used_words: Vec::new(),
  }))
}

/// Submit one word against the level's boss.
#[instrument(level = "info", skip(catalog, ctx, level), fields(level = %level.slug))]
pub fn submit_word(catalog: &Catalog, ctx: &mut PlayerCtx, level: &Level, word: &str) -> Result<BossOutcome, AppError> {
  expect_kind(level, LevelKind::Boss)?;
  let word = word.trim().to_lowercase();
  if word.is_empty() {
    return Err(AppError::field("word", "must not be empty"));
  }
  if let Access::Denied { required_level, redirect } = check_access(catalog, ctx, level)? {
    return Ok(BossOutcome::AccessDenied { required_level, redirect });
  }
  let boss = catalog
    .boss_for(level)
    .ok_or_else(|| AppError::NotFound(format!("boss for level '{}'", level.slug)))?;

  let key = keys::boss(&level.slug);
  let mut fight = load_fight(ctx, level, boss.hp)?;

  if fight.used_words.contains(&word) {
    warn!(target: "progress", level = %level.slug, %word, "Word already used in this fight");
    ctx.session.set(&key, &fight)?;
    return Ok(BossOutcome::AlreadyUsed { word, boss_hp: fight.boss_hp, player_hp: fight.player_hp });
  }

  let hit = catalog.words_for(boss).iter().any(|w| w.text.trim().to_lowercase() == word);
  if hit {
    fight.boss_hp -= 1;
    fight.used_words.push(word.clone());
  } else {
    fight.player_hp -= 1;
  }

  if fight.boss_hp <= 0 {
    ctx.session.remove(&key);
    let summary = complete_level(ctx, level, |repeat| boss.reward(repeat))?;
    info!(target: "progress", level = %level.slug, boss = %boss.name, "Boss defeated");
    return Ok(BossOutcome::Victory(summary));
  }
  if fight.player_hp <= 0 {
    ctx.session.remove(&key);
    info!(target: "progress", level = %level.slug, boss = %boss.name, boss_hp = fight.boss_hp, "Player defeated");
    return Ok(BossOutcome::Defeat { boss_hp: fight.boss_hp });
  }

  ctx.session.set(&key, &fight)?;
  let (boss_hp, player_hp) = (fight.boss_hp, fight.player_hp);
  Ok(if hit {
    BossOutcome::Hit { word, boss_hp, player_hp }
  } else {
    BossOutcome::Miss { word, boss_hp, player_hp }
  })
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Current screen of a level. `step` defaults to the first open step.
#[instrument(level = "debug", skip(catalog, ctx, level), fields(level = %level.slug))]
pub fn view_level(catalog: &Catalog, ctx: &mut PlayerCtx, level: &Level, step: Option<u32>) -> Result<LevelView, AppError> {
  if let Access::Denied { required_level, redirect } = check_access(catalog, ctx, level)? {
    return Ok(LevelView::AccessDenied { required_level, redirect });
  }

  if level.kind == LevelKind::Boss {
    let boss = catalog
      .boss_for(level)
      .ok_or_else(|| AppError::NotFound(format!("boss for level '{}'", level.slug)))?;
    let fight = load_fight(ctx, level, boss.hp)?;
    return Ok(LevelView::BossFight {
      boss: boss.name.clone(),
      boss_hp: fight.boss_hp,
      boss_max_hp: boss.hp,
      player_hp: fight.player_hp,
      used_words: fight.used_words,
    });
  }

  let questions = catalog.questions_for(level);
  let total = questions.len() as u32;
  let step = match step {
    Some(s) => s,
    None => first_open_step(&ctx.progress().completed_steps(level)?, total),
  };
  if let Some((step, max_step)) = check_step(ctx, level, step, total)? {
    return Ok(LevelView::InvalidStep { step, max_step });
  }
  if step >= total {
    let passed = ctx.progress().is_passed(level)?;
    return Ok(LevelView::Finished { total, passed });
  }

  let question = questions[step as usize];
  let answers = match level.kind {
    LevelKind::Theory => catalog
      .answers_for(question.id)
      .iter()
      .map(|a| AnswerView { id: a.id, text: a.text.clone() })
      .collect(),
    _ => Vec::new(),
  };
  Ok(LevelView::Question {
    step,
    total,
    question: QuestionView {
      id: question.id,
      text: question.text.clone(),
      images: catalog.images_for(question.id).iter().map(|i| i.url.clone()).collect(),
      answers,
    },
  })
}

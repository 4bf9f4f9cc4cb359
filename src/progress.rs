//! Progress storage behind one capability, so the level state machines are
//! written once for guests (session keys) and accounts (database rows).

use tracing::debug;

use crate::db::Db;
use crate::domain::{Id, Level, Reward, Wallet};
use crate::error::AppError;
use crate::session::{keys, SessionData};

pub trait ProgressStore {
  fn is_passed(&self, level: &Level) -> Result<bool, AppError>;
  /// Monotonic: once passed, always passed.
  fn mark_passed(&mut self, level: &Level) -> Result<(), AppError>;
  fn completed_steps(&self, level: &Level) -> Result<Vec<u32>, AppError>;
  /// Idempotent.
  fn mark_step_completed(&mut self, level: &Level, step: u32) -> Result<(), AppError>;
  /// Forget the recorded steps of a finished run; the passed flag stays.
  fn reset_steps(&mut self, level: &Level) -> Result<(), AppError>;
  fn add_resources(&mut self, reward: Reward) -> Result<(), AppError>;
  fn wallet(&self) -> Result<Wallet, AppError>;
  /// `false` when the balance does not cover `cost`; nothing is deducted then.
  fn spend_coins(&mut self, cost: u32) -> Result<bool, AppError>;
}

/// Guest progress kept in the browser session.
pub struct SessionProgress<'a> {
  session: &'a mut SessionData,
}

impl<'a> SessionProgress<'a> {
  pub fn new(session: &'a mut SessionData) -> Self {
    Self { session }
  }
}

impl ProgressStore for SessionProgress<'_> {
  fn is_passed(&self, level: &Level) -> Result<bool, AppError> {
    let passed: Vec<String> = self.session.get_or_default(keys::PASSED_LEVELS)?;
    Ok(passed.contains(&level.slug))
  }

  fn mark_passed(&mut self, level: &Level) -> Result<(), AppError> {
    let mut passed: Vec<String> = self.session.get_or_default(keys::PASSED_LEVELS)?;
    if !passed.contains(&level.slug) {
      passed.push(level.slug.clone());
      self.session.set(keys::PASSED_LEVELS, &passed)?;
    }
    Ok(())
  }

  fn completed_steps(&self, level: &Level) -> Result<Vec<u32>, AppError> {
    Ok(self.session.get_or_default(&keys::steps(&level.slug))?)
  }

  fn mark_step_completed(&mut self, level: &Level, step: u32) -> Result<(), AppError> {
    let key = keys::steps(&level.slug);
    let mut steps: Vec<u32> = self.session.get_or_default(&key)?;
    if steps.contains(&step) {
      return Ok(());
    }
    steps.push(step);
    steps.sort_unstable();
    self.session.set(&key, &steps)?;
    Ok(())
  }

  fn reset_steps(&mut self, level: &Level) -> Result<(), AppError> {
    self.session.remove(&keys::steps(&level.slug));
    Ok(())
  }

  fn add_resources(&mut self, reward: Reward) -> Result<(), AppError> {
    let exp: i64 = self.session.get_or_default(keys::GUEST_EXP)?;
    let coins: i64 = self.session.get_or_default(keys::GUEST_COINS)?;
    self.session.set(keys::GUEST_EXP, &(exp + i64::from(reward.exp)))?;
    self.session.set(keys::GUEST_COINS, &(coins + i64::from(reward.coins)))?;
    Ok(())
  }

  fn wallet(&self) -> Result<Wallet, AppError> {
    Ok(Wallet {
      exp: self.session.get_or_default(keys::GUEST_EXP)?,
      coins: self.session.get_or_default(keys::GUEST_COINS)?,
    })
  }

  fn spend_coins(&mut self, cost: u32) -> Result<bool, AppError> {
    let coins: i64 = self.session.get_or_default(keys::GUEST_COINS)?;
    if coins < i64::from(cost) {
      return Ok(false);
    }
    self.session.set(keys::GUEST_COINS, &(coins - i64::from(cost)))?;
    Ok(true)
  }
}

/// Account progress in the database.
pub struct AccountProgress<'a> {
  db: &'a Db,
  user_id: Id,
}

impl<'a> AccountProgress<'a> {
  pub fn new(db: &'a Db, user_id: Id) -> Self {
    Self { db, user_id }
  }
}

impl ProgressStore for AccountProgress<'_> {
  fn is_passed(&self, level: &Level) -> Result<bool, AppError> {
    Ok(self.db.progress(self.user_id, level.id)?.is_some_and(|p| p.passed))
  }

  fn mark_passed(&mut self, level: &Level) -> Result<(), AppError> {
    self.db.mark_passed(self.user_id, level.id)
  }

  fn completed_steps(&self, level: &Level) -> Result<Vec<u32>, AppError> {
    Ok(self.db.progress(self.user_id, level.id)?.map(|p| p.completed_steps).unwrap_or_default())
  }

  fn mark_step_completed(&mut self, level: &Level, step: u32) -> Result<(), AppError> {
    self.db.mark_step(self.user_id, level.id, step)
  }

  fn reset_steps(&mut self, level: &Level) -> Result<(), AppError> {
    self.db.clear_steps(self.user_id, level.id)
  }

  fn add_resources(&mut self, reward: Reward) -> Result<(), AppError> {
    self.db.add_resources(self.user_id, i64::from(reward.exp), i64::from(reward.coins))
  }

  fn wallet(&self) -> Result<Wallet, AppError> {
    self.db.wallet(self.user_id)
  }

  fn spend_coins(&mut self, cost: u32) -> Result<bool, AppError> {
    self.db.spend_coins(self.user_id, i64::from(cost))
  }
}

/// Who is playing.
#[derive(Clone)]
pub enum Identity {
  Guest,
  Account { db: Db, user_id: Id },
}

/// Per-request player context: the session (scratch keys such as attempt
/// counters and boss state live there for everyone) plus the identity that
/// decides where progress is stored.
pub struct PlayerCtx {
  pub session: SessionData,
  identity: Identity,
}

impl PlayerCtx {
  pub fn guest(session: SessionData) -> Self {
    Self { session, identity: Identity::Guest }
  }

  pub fn account(session: SessionData, db: Db, user_id: Id) -> Self {
    Self { session, identity: Identity::Account { db, user_id } }
  }

  pub fn is_guest(&self) -> bool {
    matches!(self.identity, Identity::Guest)
  }

  pub fn user_id(&self) -> Option<Id> {
    match &self.identity {
      Identity::Guest => None,
      Identity::Account { user_id, .. } => Some(*user_id),
    }
  }

  /// Progress store for the current identity.
  pub fn progress(&mut self) -> Box<dyn ProgressStore + '_> {
    match &self.identity {
      Identity::Guest => Box::new(SessionProgress::new(&mut self.session)),
      Identity::Account { db, user_id } => {
        debug!(target: "progress", user_id, "Using account progress");
        Box::new(AccountProgress::new(db, *user_id))
      }
    }
  }

  pub fn into_session(self) -> SessionData {
    self.session
  }
}

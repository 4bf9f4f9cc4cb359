//! Domain models: catalog entities (locations, levels, questions, bosses, words),
//! accounts, per-level progress, and the reward rule.

use serde::{Deserialize, Serialize};

pub type Id = i64;

/// What kind of level is this?
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
  /// Ordered quiz: questions with one correct answer, or pure reading steps.
  #[serde(alias = "TH")]
  Theory,
  /// Free-text answers compared after normalization, with a retry budget.
  #[serde(alias = "TR")]
  Trial,
  /// Word-based combat against the location's boss.
  #[serde(alias = "BS")]
  Boss,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Location {
  pub id: Id,
  pub title: String,
  pub desc: String,
  pub slug: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Level {
  pub id: Id,
  pub location_id: Id,
  pub title: String,
  pub desc: String,
  pub kind: LevelKind,
  /// Position inside the location; the predecessor gates access.
  pub order: u32,
  pub exp_reward: u32,
  /// Always zero for theory levels.
  pub coins_reward: u32,
  pub slug: String,
}

impl Level {
  pub fn reward(&self, repeat: bool) -> Reward {
    Reward::for_completion(self.exp_reward, self.coins_reward, repeat)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: Id,
  pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionImage {
  pub id: Id,
  pub question_id: Id,
  pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Answer {
  pub id: Id,
  pub question_id: Id,
  pub text: String,
  pub is_correct: bool,
}

/// Ordered join between a level and a question, unique per pair.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelQuestion {
  pub level_id: Id,
  pub question_id: Id,
  pub order: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Boss {
  pub id: Id,
  pub level_id: Id,
  pub name: String,
  pub hp: i32,
  pub exp_reward: u32,
  pub coins_reward: u32,
}

impl Boss {
  pub fn reward(&self, repeat: bool) -> Reward {
    Reward::for_completion(self.exp_reward, self.coins_reward, repeat)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Word {
  pub id: Id,
  pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BossWord {
  pub boss_id: Id,
  pub word_id: Id,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
  pub id: Id,
  pub name: String,
  pub email: String,
  pub exp: i64,
  pub coins: i64,
}

/// Persisted per (user, level) progress row.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressRecord {
  pub level_id: Id,
  pub completed_steps: Vec<u32>,
  pub passed: bool,
}

/// Cumulative experience and coins of the current identity.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
  pub exp: i64,
  pub coins: i64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reward {
  pub exp: u32,
  pub coins: u32,
}

impl Reward {
  /// Full reward on the first completion; half the experience (floored) and no
  /// coins on every later one.
  pub fn for_completion(exp: u32, coins: u32, repeat: bool) -> Self {
    if repeat {
      Reward { exp: exp / 2, coins: 0 }
    } else {
      Reward { exp, coins }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_completion_pays_in_full() {
    assert_eq!(Reward::for_completion(50, 10, false), Reward { exp: 50, coins: 10 });
  }

  #[test]
  fn repeat_completion_halves_exp_and_drops_coins() {
    assert_eq!(Reward::for_completion(50, 10, true), Reward { exp: 25, coins: 0 });
    assert_eq!(Reward::for_completion(51, 10, true), Reward { exp: 25, coins: 0 });
    assert_eq!(Reward::for_completion(1, 3, true), Reward { exp: 0, coins: 0 });
  }

  #[test]
  fn level_kind_accepts_legacy_codes() {
    #[derive(Deserialize)]
    struct Holder {
      kind: LevelKind,
    }
    let h: Holder = toml::from_str(r#"kind = "BS""#).expect("legacy code");
    assert_eq!(h.kind, LevelKind::Boss);
    let h: Holder = toml::from_str(r#"kind = "trial""#).expect("snake case");
    assert_eq!(h.kind, LevelKind::Trial);
  }
}

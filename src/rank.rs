//! Player level derived from cumulative experience.

use serde::Serialize;

/// Experience needed to reach level 1, 2, ... in order.
pub const RANK_THRESHOLDS: [i64; 5] = [0, 25, 75, 150, 300];

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Rank {
  pub level: u32,
  pub exp: i64,
  /// `None` at the maximum level.
  pub exp_left: Option<i64>,
  pub progress_percent: u32,
  pub next_level_exp: i64,
  pub tooltip: String,
}

pub fn calc_rank(exp: i64) -> Rank {
  let level = RANK_THRESHOLDS.iter().take_while(|t| exp >= **t).count().max(1);

  if level == RANK_THRESHOLDS.len() {
    return Rank {
      level: level as u32,
      exp,
      exp_left: None,
      progress_percent: 100,
      next_level_exp: exp,
      tooltip: "Maximum level reached".into(),
    };
  }

  let prev_exp = RANK_THRESHOLDS[level - 1];
  let next_exp = RANK_THRESHOLDS[level];
  let progress = ((exp - prev_exp).max(0) * 100 / (next_exp - prev_exp)) as u32;
  Rank {
    level: level as u32,
    exp,
    exp_left: Some(next_exp - exp),
    progress_percent: progress,
    next_level_exp: next_exp,
    tooltip: format!("{exp}/{next_exp} exp"),
  }
}

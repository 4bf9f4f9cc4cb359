//! Wishing well: spend a coin, get a phrase.

use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::progress::PlayerCtx;
use crate::seeds::WELL_PHRASES;

pub const TOSS_COST: u32 = 1;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TossOutcome {
  Success { phrase: String, coins: i64 },
  InsufficientFunds { coins: i64, cost: u32 },
}

#[instrument(level = "info", skip(ctx), fields(guest = ctx.is_guest()))]
pub fn toss_coin(ctx: &mut PlayerCtx, cost: u32) -> Result<TossOutcome, AppError> {
  let mut store = ctx.progress();
  if !store.spend_coins(cost)? {
    let coins = store.wallet()?.coins;
    info!(target: "progress", coins, cost, "Not enough coins for the well");
    return Ok(TossOutcome::InsufficientFunds { coins, cost });
  }
  let coins = store.wallet()?.coins;
  let phrase = WELL_PHRASES
    .choose(&mut rand::thread_rng())
    .copied()
    .unwrap_or_default()
    .to_string();
  info!(target: "progress", coins, %phrase, "Coin tossed");
  Ok(TossOutcome::Success { phrase, coins })
}

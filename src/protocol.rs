//! Public JSON shapes for the HTTP endpoints (serde ready).
//! Outcome enums from `engine`, `shop` and `account` are serialized as-is; this
//! module holds the request bodies and the few response wrappers around them.

use serde::{Deserialize, Serialize};

use crate::account::MergeReport;
use crate::domain::{Id, LevelKind, Location, User, Wallet};
use crate::engine::LevelView;
use crate::rank::Rank;

pub const API_PREFIX: &str = "/api/v1";

/// Where the client should go to see a location's map.
pub fn location_path(slug: &str) -> String {
    format!("{API_PREFIX}/locations/{slug}")
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct MeOut {
    pub guest: bool,
    pub name: Option<String>,
    pub email: Option<String>,
    pub wallet: Wallet,
    pub rank: Rank,
    pub levels_passed: usize,
}

#[derive(Debug, Serialize)]
pub struct LocationOut {
    pub slug: String,
    pub title: String,
    pub desc: String,
    pub href: String,
}

impl From<&Location> for LocationOut {
    fn from(l: &Location) -> Self {
        Self {
            slug: l.slug.clone(),
            title: l.title.clone(),
            desc: l.desc.clone(),
            href: location_path(&l.slug),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LevelQuery {
    pub step: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LevelOut {
    pub slug: String,
    pub title: String,
    pub desc: String,
    pub kind: LevelKind,
    pub location: String,
    #[serde(flatten)]
    pub view: LevelView,
}

#[derive(Debug, Deserialize)]
pub struct TheoryIn {
    pub step: u32,
    #[serde(default, rename = "answerId")]
    pub answer_id: Option<Id>,
}

#[derive(Debug, Deserialize)]
pub struct TrialIn {
    pub step: u32,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct BossIn {
    #[serde(default)]
    pub word: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserOut {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub exp: i64,
    pub coins: i64,
}

impl From<User> for UserOut {
    fn from(u: User) -> Self {
        Self { id: u.id, name: u.name, email: u.email, exp: u.exp, coins: u.coins }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthOut {
    pub user: UserOut,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<MergeReport>,
}

#[derive(Debug, Serialize)]
pub struct LogoutOut {
    pub ok: bool,
}

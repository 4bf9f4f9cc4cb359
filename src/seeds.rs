//! Built-in content: a small catalog that keeps the app playable without a
//! TOML catalog, and the phrase pool for the coin toss.

use crate::config::{AnswerCfg, BossCfg, CatalogCfg, LevelCfg, LocationCfg, QuestionCfg};
use crate::domain::LevelKind;

pub const WELL_PHRASES: &[&str] = &[
  "A word a day keeps the silence away.",
  "Every mistake is a step on the path.",
  "The troll fears those who practise.",
  "Slow words travel far.",
  "Today you will remember one more word than yesterday.",
];

fn question(text: &str, answers: &[(&str, bool)]) -> QuestionCfg {
  QuestionCfg {
    key: None,
    text: text.into(),
    images: Vec::new(),
    answers: answers
      .iter()
      .map(|(text, correct)| AnswerCfg { text: (*text).into(), correct: *correct })
      .collect(),
  }
}

fn level(title: &str, kind: LevelKind, exp: u32, coins: u32, questions: Vec<QuestionCfg>) -> LevelCfg {
  LevelCfg {
    title: title.into(),
    slug: None,
    desc: String::new(),
    kind,
    order: None,
    exp_reward: exp,
    coins_reward: coins,
    questions,
    boss: None,
  }
}

/// Two locations: greetings (theory → trial → boss) and numbers (theory → trial).
pub fn seed_catalog() -> CatalogCfg {
  let mut boss_level = level("The Silent Troll", LevelKind::Boss, 0, 0, Vec::new());
  boss_level.boss = Some(BossCfg {
    name: "Silent Troll".into(),
    hp: 3,
    exp_reward: 100,
    coins_reward: 25,
    words: ["hello", "hi", "goodbye", "thanks", "please", "morning", "evening"]
      .iter()
      .map(|w| (*w).into())
      .collect(),
  });

  CatalogCfg {
    locations: vec![
      LocationCfg {
        title: "Greeting Grove".into(),
        slug: None,
        desc: "Say hello to the forest folk before the troll wakes up.".into(),
        levels: vec![
          level(
            "First words",
            LevelKind::Theory,
            50,
            0,
            vec![
              question("«Привет» is \"hello\", «пока» is \"bye\". Read them aloud twice.", &[]),
              question(
                "How do you say «спасибо»?",
                &[("thank you", true), ("please", false), ("sorry", false)],
              ),
              question(
                "Which greeting fits 8 p.m.?",
                &[("good morning", false), ("good evening", true)],
              ),
            ],
          ),
          level(
            "Say it yourself",
            LevelKind::Trial,
            60,
            10,
            vec![
              question("Translate: «доброе утро»", &[("good morning", true)]),
              question(
                "Translate: «до свидания»",
                &[("goodbye", true), ("good bye", true), ("bye", true)],
              ),
            ],
          ),
          boss_level,
        ],
      },
      LocationCfg {
        title: "Market Square".into(),
        slug: None,
        desc: "Count your coins before you spend them.".into(),
        levels: vec![
          level(
            "Numbers",
            LevelKind::Theory,
            40,
            0,
            vec![question("Which number is \"three\"?", &[("2", false), ("3", true)])],
          ),
          level(
            "Counting out loud",
            LevelKind::Trial,
            50,
            5,
            vec![question("Write «семь» in English", &[("seven", true)])],
          ),
        ],
      },
    ],
  }
}

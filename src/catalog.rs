//! Catalog store: locations, levels, questions, answers, bosses and words.
//!
//! Built once from a `CatalogCfg` (TOML or built-in seeds) and shared
//! read-only behind an `Arc`. Lookups go by slug or by foreign key.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::{BossCfg, CatalogCfg, QuestionCfg};
use crate::domain::{
  Answer, Boss, BossWord, Id, Level, LevelKind, LevelQuestion, Location, Question, QuestionImage, Word,
};
use crate::slug::slugify;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
  #[error("catalog has no locations")]
  Empty,
  #[error("duplicate location slug '{0}'")]
  DuplicateLocationSlug(String),
  #[error("duplicate level slug '{0}'")]
  DuplicateLevelSlug(String),
  #[error("question '{question}' appears twice in level '{level}'")]
  DuplicateLevelQuestion { level: String, question: String },
  #[error("boss level '{0}' has no boss")]
  MissingBoss(String),
  #[error("boss of level '{level}' is unwinnable: {reason}")]
  InvalidBoss { level: String, reason: String },
}

/// Every hit costs the boss one point and each word lands once, so the word
/// list has to cover the boss's hit points.
fn check_boss(level: &str, cfg: &BossCfg) -> Result<(), CatalogError> {
  let invalid = |reason: String| Err(CatalogError::InvalidBoss { level: level.to_string(), reason });
  if cfg.hp < 1 {
    return invalid(format!("hp is {}, must be at least 1", cfg.hp));
  }
  let mut words: Vec<String> =
    cfg.words.iter().map(|w| w.trim().to_lowercase()).filter(|w| !w.is_empty()).collect();
  words.sort();
  words.dedup();
  if words.len() < cfg.hp as usize {
    return invalid(format!("{} distinct words for {} hp", words.len(), cfg.hp));
  }
  Ok(())
}

#[derive(Debug, Default)]
pub struct Catalog {
  locations: Vec<Location>,
  location_by_slug: HashMap<String, usize>,
  levels: HashMap<Id, Level>,
  level_by_slug: HashMap<String, Id>,
  /// Level ids per location, sorted by `order`.
  levels_by_location: HashMap<Id, Vec<Id>>,
  questions: HashMap<Id, Question>,
  level_questions: Vec<LevelQuestion>,
  answers: HashMap<Id, Vec<Answer>>,
  images: HashMap<Id, Vec<QuestionImage>>,
  /// Keyed by level id (one boss per boss level).
  bosses: HashMap<Id, Boss>,
  words: HashMap<Id, Word>,
  boss_words: Vec<BossWord>,
  next_id: Id,
}

impl Catalog {
  #[instrument(level = "info", skip_all, fields(locations = cfg.locations.len()))]
  pub fn from_config(cfg: &CatalogCfg) -> Result<Self, CatalogError> {
    if cfg.locations.is_empty() {
      return Err(CatalogError::Empty);
    }

    let mut cat = Catalog::default();
    let mut question_keys: HashMap<String, Id> = HashMap::new();
    let mut word_ids: HashMap<String, Id> = HashMap::new();

    for loc_cfg in &cfg.locations {
      let loc_slug = loc_cfg.slug.clone().unwrap_or_else(|| slugify(&loc_cfg.title));
      if cat.location_by_slug.contains_key(&loc_slug) {
        return Err(CatalogError::DuplicateLocationSlug(loc_slug));
      }
      let location_id = cat.alloc_id();
      cat.location_by_slug.insert(loc_slug.clone(), cat.locations.len());
      cat.locations.push(Location {
        id: location_id,
        title: loc_cfg.title.clone(),
        desc: loc_cfg.desc.clone(),
        slug: loc_slug,
      });

      let mut level_ids = Vec::with_capacity(loc_cfg.levels.len());
      for (idx, lvl_cfg) in loc_cfg.levels.iter().enumerate() {
        let slug = lvl_cfg.slug.clone().unwrap_or_else(|| slugify(&lvl_cfg.title));
        if cat.level_by_slug.contains_key(&slug) {
          return Err(CatalogError::DuplicateLevelSlug(slug));
        }

        let mut coins_reward = lvl_cfg.coins_reward;
        if lvl_cfg.kind == LevelKind::Theory && coins_reward != 0 {
          warn!(target: "catalog", %slug, coins_reward, "Theory levels never pay coins; forcing 0");
          coins_reward = 0;
        }

        let level_id = cat.alloc_id();
        let level = Level {
          id: level_id,
          location_id,
          title: lvl_cfg.title.clone(),
          desc: lvl_cfg.desc.clone(),
          kind: lvl_cfg.kind,
          order: lvl_cfg.order.unwrap_or(idx as u32 + 1),
          exp_reward: lvl_cfg.exp_reward,
          coins_reward,
          slug: slug.clone(),
        };

        for (q_idx, q_cfg) in lvl_cfg.questions.iter().enumerate() {
          let question_id = match q_cfg.key.as_ref().and_then(|k| question_keys.get(k)) {
            Some(id) => *id,
            None => {
              let id = cat.insert_question(q_cfg);
              if let Some(k) = &q_cfg.key {
                question_keys.insert(k.clone(), id);
              }
              id
            }
          };
          if cat.level_questions.iter().any(|lq| lq.level_id == level_id && lq.question_id == question_id) {
            return Err(CatalogError::DuplicateLevelQuestion {
              level: slug,
              question: q_cfg.key.clone().unwrap_or_else(|| q_cfg.text.clone()),
            });
          }
          cat.level_questions.push(LevelQuestion { level_id, question_id, order: q_idx as u32 });
          cat.check_answers(&level, question_id);
        }

        match (&level.kind, &lvl_cfg.boss) {
          (LevelKind::Boss, None) => return Err(CatalogError::MissingBoss(slug)),
          (_, Some(boss_cfg)) => {
            check_boss(&slug, boss_cfg)?;
            cat.insert_boss(level_id, boss_cfg, &mut word_ids);
          }
          _ => {}
        }

        cat.level_by_slug.insert(slug, level_id);
        cat.levels.insert(level_id, level);
        level_ids.push(level_id);
      }

      level_ids.sort_by_key(|id| (cat.levels[id].order, *id));
      cat.levels_by_location.insert(location_id, level_ids);
    }

    info!(
      target: "catalog",
      locations = cat.locations.len(),
      levels = cat.levels.len(),
      questions = cat.questions.len(),
      bosses = cat.bosses.len(),
      words = cat.words.len(),
      "Catalog built"
    );
    Ok(cat)
  }

  fn alloc_id(&mut self) -> Id {
    self.next_id += 1;
    self.next_id
  }

  fn insert_question(&mut self, q_cfg: &QuestionCfg) -> Id {
    let question_id = self.alloc_id();
    self.questions.insert(question_id, Question { id: question_id, text: q_cfg.text.clone() });

    let mut answers = Vec::with_capacity(q_cfg.answers.len());
    for a in &q_cfg.answers {
      answers.push(Answer {
        id: self.alloc_id(),
        question_id,
        text: a.text.clone(),
        is_correct: a.correct,
      });
    }
    self.answers.insert(question_id, answers);

    let mut images = Vec::with_capacity(q_cfg.images.len());
    for url in &q_cfg.images {
      images.push(QuestionImage { id: self.alloc_id(), question_id, url: url.clone() });
    }
    self.images.insert(question_id, images);
    question_id
  }

  fn check_answers(&self, level: &Level, question_id: Id) {
    let answers = self.answers_for(question_id);
    let correct = answers.iter().filter(|a| a.is_correct).count();
    match level.kind {
      LevelKind::Theory if !answers.is_empty() && correct != 1 => {
        warn!(target: "catalog", level = %level.slug, question_id, correct, "Theory question should have exactly one correct answer");
      }
      LevelKind::Trial if correct == 0 => {
        warn!(target: "catalog", level = %level.slug, question_id, "Trial question has no accepted answer; any input passes");
      }
      _ => {}
    }
  }

  fn insert_boss(&mut self, level_id: Id, cfg: &BossCfg, word_ids: &mut HashMap<String, Id>) {
    let boss_id = self.alloc_id();
    self.bosses.insert(
      level_id,
      Boss {
        id: boss_id,
        level_id,
        name: cfg.name.clone(),
        hp: cfg.hp,
        exp_reward: cfg.exp_reward,
        coins_reward: cfg.coins_reward,
      },
    );
    for text in &cfg.words {
      let canonical = text.trim().to_lowercase();
      if canonical.is_empty() {
        continue;
      }
      let word_id = match word_ids.get(&canonical) {
        Some(id) => *id,
        None => {
          let id = self.alloc_id();
          self.words.insert(id, Word { id, text: canonical.clone() });
          word_ids.insert(canonical, id);
          id
        }
      };
      let link = BossWord { boss_id, word_id };
      if !self.boss_words.contains(&link) {
        self.boss_words.push(link);
      }
    }
  }

  pub fn locations(&self) -> &[Location] {
    &self.locations
  }

  /// Where new players land.
  pub fn first_location(&self) -> Option<&Location> {
    self.locations.first()
  }

  pub fn location_by_slug(&self, slug: &str) -> Option<&Location> {
    self.location_by_slug.get(slug).map(|idx| &self.locations[*idx])
  }

  pub fn location(&self, id: Id) -> Option<&Location> {
    self.locations.iter().find(|l| l.id == id)
  }

  pub fn level_by_slug(&self, slug: &str) -> Option<&Level> {
    self.level_by_slug.get(slug).and_then(|id| self.levels.get(id))
  }

  /// Levels of a location, ordered by their ordering key.
  pub fn levels_of(&self, location_id: Id) -> Vec<&Level> {
    self.levels_by_location
      .get(&location_id)
      .map(|ids| ids.iter().filter_map(|id| self.levels.get(id)).collect())
      .unwrap_or_default()
  }

  /// The level right before `level` in its location, if any.
  pub fn previous_level(&self, level: &Level) -> Option<&Level> {
    let ids = self.levels_by_location.get(&level.location_id)?;
    let pos = ids.iter().position(|id| *id == level.id)?;
    if pos == 0 {
      return None;
    }
    self.levels.get(&ids[pos - 1])
  }

  /// Questions of a level in step order.
  pub fn questions_for(&self, level: &Level) -> Vec<&Question> {
    let mut links: Vec<&LevelQuestion> =
      self.level_questions.iter().filter(|lq| lq.level_id == level.id).collect();
    links.sort_by_key(|lq| lq.order);
    links.iter().filter_map(|lq| self.questions.get(&lq.question_id)).collect()
  }

  pub fn answers_for(&self, question_id: Id) -> &[Answer] {
    self.answers.get(&question_id).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn images_for(&self, question_id: Id) -> &[QuestionImage] {
    self.images.get(&question_id).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn boss_for(&self, level: &Level) -> Option<&Boss> {
    self.bosses.get(&level.id)
  }

  pub fn words_for(&self, boss: &Boss) -> Vec<&Word> {
    self.boss_words
      .iter()
      .filter(|bw| bw.boss_id == boss.id)
      .filter_map(|bw| self.words.get(&bw.word_id))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{AnswerCfg, LevelCfg, LocationCfg};
  use crate::seeds::seed_catalog;

  fn level_cfg(title: &str, kind: LevelKind, order: Option<u32>) -> LevelCfg {
    LevelCfg {
      title: title.into(),
      slug: None,
      desc: String::new(),
      kind,
      order,
      exp_reward: 10,
      coins_reward: 5,
      questions: Vec::new(),
      boss: None,
    }
  }

  fn one_location(levels: Vec<LevelCfg>) -> CatalogCfg {
    CatalogCfg {
      locations: vec![LocationCfg { title: "Test Town".into(), slug: None, desc: String::new(), levels }],
    }
  }

  #[test]
  fn seed_catalog_builds() {
    let cat = Catalog::from_config(&seed_catalog()).expect("seeds are valid");
    let grove = cat.location_by_slug("greeting-grove").expect("grove");
    let levels = cat.levels_of(grove.id);
    assert_eq!(
      levels.iter().map(|l| l.slug.as_str()).collect::<Vec<_>>(),
      vec!["first-words", "say-it-yourself", "the-silent-troll"]
    );
    let troll = cat.level_by_slug("the-silent-troll").expect("troll");
    let boss = cat.boss_for(troll).expect("boss");
    assert_eq!(cat.words_for(boss).len(), 7);
  }

  #[test]
  fn theory_levels_never_pay_coins() {
    let cat = Catalog::from_config(&one_location(vec![level_cfg("Reading", LevelKind::Theory, None)]))
      .expect("valid");
    assert_eq!(cat.level_by_slug("reading").expect("level").coins_reward, 0);
  }

  #[test]
  fn levels_sort_by_ordering_key_and_know_their_predecessor() {
    let cat = Catalog::from_config(&one_location(vec![
      level_cfg("Third", LevelKind::Trial, Some(30)),
      level_cfg("First", LevelKind::Theory, Some(10)),
      level_cfg("Second", LevelKind::Trial, Some(20)),
    ]))
    .expect("valid");
    let first = cat.level_by_slug("first").expect("first");
    let second = cat.level_by_slug("second").expect("second");
    let third = cat.level_by_slug("third").expect("third");
    assert!(cat.previous_level(first).is_none());
    assert_eq!(cat.previous_level(second).map(|l| l.id), Some(first.id));
    assert_eq!(cat.previous_level(third).map(|l| l.id), Some(second.id));
  }

  #[test]
  fn boss_level_without_boss_is_rejected() {
    let err = Catalog::from_config(&one_location(vec![level_cfg("Lair", LevelKind::Boss, None)]))
      .expect_err("must fail");
    assert_eq!(err, CatalogError::MissingBoss("lair".into()));
  }

  fn boss_level(hp: i32, words: &[&str]) -> LevelCfg {
    let mut lair = level_cfg("Lair", LevelKind::Boss, None);
    lair.boss = Some(BossCfg {
      name: "Ogre".into(),
      hp,
      exp_reward: 100,
      coins_reward: 5,
      words: words.iter().map(|w| w.to_string()).collect(),
    });
    lair
  }

  #[test]
  fn boss_without_hit_points_is_rejected() {
    let err = Catalog::from_config(&one_location(vec![boss_level(0, &["cat"])])).expect_err("must fail");
    assert!(matches!(err, CatalogError::InvalidBoss { ref level, .. } if level == "lair"));
  }

  #[test]
  fn boss_needs_enough_distinct_words() {
    for words in [&[][..], &["  "][..], &["cat", "CAT", "dog"][..]] {
      let err = Catalog::from_config(&one_location(vec![boss_level(3, words)])).expect_err("must fail");
      assert!(matches!(err, CatalogError::InvalidBoss { .. }), "{words:?} gave {err:?}");
    }
    Catalog::from_config(&one_location(vec![boss_level(2, &["cat", "dog"])])).expect("winnable boss");
  }

  #[test]
  fn first_location_is_the_first_configured() {
    let cat = Catalog::from_config(&seed_catalog()).expect("seeds");
    assert_eq!(cat.first_location().map(|l| l.slug.as_str()), Some("greeting-grove"));
  }

  #[test]
  fn duplicate_slugs_are_rejected() {
    let err = Catalog::from_config(&one_location(vec![
      level_cfg("Same", LevelKind::Theory, None),
      level_cfg("Same", LevelKind::Trial, None),
    ]))
    .expect_err("must fail");
    assert_eq!(err, CatalogError::DuplicateLevelSlug("same".into()));
    assert_eq!(Catalog::from_config(&CatalogCfg::default()).expect_err("empty"), CatalogError::Empty);
  }

  #[test]
  fn keyed_questions_are_shared_but_unique_per_level() {
    let shared = QuestionCfg {
      key: Some("cat".into()),
      text: "What is «кошка»?".into(),
      images: vec!["/static/cat.png".into()],
      answers: vec![AnswerCfg { text: "cat".into(), correct: true }],
    };
    let mut a = level_cfg("A", LevelKind::Theory, None);
    a.questions = vec![shared.clone()];
    let mut b = level_cfg("B", LevelKind::Theory, None);
    b.questions = vec![QuestionCfg { answers: Vec::new(), images: Vec::new(), ..shared.clone() }];
    let cat = Catalog::from_config(&one_location(vec![a, b])).expect("valid");
    let qa = cat.questions_for(cat.level_by_slug("a").expect("a"));
    let qb = cat.questions_for(cat.level_by_slug("b").expect("b"));
    assert_eq!(qa[0].id, qb[0].id);
    assert_eq!(cat.answers_for(qb[0].id).len(), 1);
    assert_eq!(cat.images_for(qa[0].id).len(), 1);

    let mut dup = level_cfg("Dup", LevelKind::Theory, None);
    dup.questions = vec![shared.clone(), shared];
    let err = Catalog::from_config(&one_location(vec![dup])).expect_err("must fail");
    assert!(matches!(err, CatalogError::DuplicateLevelQuestion { .. }));
  }
}

//! Persisted account store: users and per-(user, level) progress rows in SQLite.

use std::sync::{Arc, Mutex, MutexGuard};

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument};

use crate::domain::{Id, ProgressRecord, User, Wallet};
use crate::error::AppError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    exp           INTEGER NOT NULL DEFAULT 0,
    coins         INTEGER NOT NULL DEFAULT 0 CHECK (coins >= 0),
    created_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS progress (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    level_id        INTEGER NOT NULL,
    completed_steps TEXT NOT NULL DEFAULT '[]',
    passed          INTEGER NOT NULL DEFAULT 0,
    UNIQUE (user_id, level_id)
);
"#;

#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at `path`; ":memory:" gives a private in-memory db.
    pub fn open(path: &str) -> Result<Self, AppError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        if one != 1 {
            return Err(AppError::Internal("database connection check failed".into()));
        }
        info!(target: "linguaquest", %path, "database connection has been verified");

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".into()))
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    pub fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    #[instrument(level = "info", skip(self, password))]
    pub fn create_user(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        let password_hash = hash_password(password)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, email, password_hash) VALUES (?1, ?2, ?3)",
            params![name, email, password_hash],
        )?;
        let id = conn.last_insert_rowid();
        info!(target: "account", user_id = id, %email, "new user created");
        Ok(User { id, name: name.to_string(), email: email.to_string(), exp: 0, coins: 0 })
    }

    pub fn get_user(&self, id: Id) -> Result<Option<User>, AppError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, name, email, exp, coins FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, name, email, exp, coins FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Returns the user when the password matches.
    pub fn verify_user_password(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        let stored: Option<String> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT password_hash FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?
        };
        match stored {
            Some(hash) if verify_password(password, &hash) => self.find_user_by_email(email),
            _ => Ok(None),
        }
    }

    pub fn add_resources(&self, user_id: Id, exp: i64, coins: i64) -> Result<(), AppError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET exp = exp + ?1, coins = coins + ?2 WHERE id = ?3",
            params![exp, coins, user_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    /// Atomic single-row deduction. `false` when the balance is too low.
    pub fn spend_coins(&self, user_id: Id, cost: i64) -> Result<bool, AppError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET coins = coins - ?1 WHERE id = ?2 AND coins >= ?1",
            params![cost, user_id],
        )?;
        Ok(changed == 1)
    }

    pub fn wallet(&self, user_id: Id) -> Result<Wallet, AppError> {
        self.get_user(user_id)?
            .map(|u| Wallet { exp: u.exp, coins: u.coins })
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }

    // ---------------------------------------------------------------------
    // Progress
    // ---------------------------------------------------------------------

    pub fn progress(&self, user_id: Id, level_id: Id) -> Result<Option<ProgressRecord>, AppError> {
        let conn = self.conn()?;
        progress_row(&conn, user_id, level_id)
    }

    /// Fetch the row, creating an empty one first if needed.
    pub fn get_or_create_progress(&self, user_id: Id, level_id: Id) -> Result<ProgressRecord, AppError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO progress (user_id, level_id) VALUES (?1, ?2)",
            params![user_id, level_id],
        )?;
        progress_row(&conn, user_id, level_id)?
            .ok_or_else(|| AppError::Internal(format!("progress row for user {user_id} level {level_id} vanished")))
    }

    /// Record a completed step; a no-op when it is already recorded.
    pub fn mark_step(&self, user_id: Id, level_id: Id, step: u32) -> Result<(), AppError> {
        let mut record = self.get_or_create_progress(user_id, level_id)?;
        if record.completed_steps.contains(&step) {
            return Ok(());
        }
        record.completed_steps.push(step);
        record.completed_steps.sort_unstable();
        self.write_steps(user_id, level_id, &record.completed_steps)
    }

    /// Copy a step list in unless the row already has one.
    pub fn set_steps_if_empty(&self, user_id: Id, level_id: Id, steps: &[u32]) -> Result<bool, AppError> {
        let record = self.get_or_create_progress(user_id, level_id)?;
        if !record.completed_steps.is_empty() {
            return Ok(false);
        }
        self.write_steps(user_id, level_id, steps)?;
        Ok(true)
    }

    /// Empty the step list of an existing row; a missing row stays missing.
    pub fn clear_steps(&self, user_id: Id, level_id: Id) -> Result<(), AppError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE progress SET completed_steps = '[]' WHERE user_id = ?1 AND level_id = ?2",
            params![user_id, level_id],
        )?;
        Ok(())
    }

    fn write_steps(&self, user_id: Id, level_id: Id, steps: &[u32]) -> Result<(), AppError> {
        let json = serde_json::to_string(steps)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE progress SET completed_steps = ?1 WHERE user_id = ?2 AND level_id = ?3",
            params![json, user_id, level_id],
        )?;
        debug!(target: "progress", user_id, level_id, steps = %json, "steps written");
        Ok(())
    }

    pub fn mark_passed(&self, user_id: Id, level_id: Id) -> Result<(), AppError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO progress (user_id, level_id, passed) VALUES (?1, ?2, 1)
             ON CONFLICT (user_id, level_id) DO UPDATE SET passed = 1",
            params![user_id, level_id],
        )?;
        Ok(())
    }

    pub fn progress_rows(&self, user_id: Id) -> Result<Vec<ProgressRecord>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT level_id, completed_steps, passed FROM progress WHERE user_id = ?1 ORDER BY level_id",
        )?;
        let rows = stmt
            .query_map(params![user_id], raw_progress_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_progress).collect()
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        exp: row.get(3)?,
        coins: row.get(4)?,
    })
}

type RawProgress = (Id, String, bool);

fn raw_progress_from_row(row: &Row<'_>) -> rusqlite::Result<RawProgress> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode_progress((level_id, steps, passed): RawProgress) -> Result<ProgressRecord, AppError> {
    Ok(ProgressRecord { level_id, completed_steps: serde_json::from_str(&steps)?, passed })
}

fn progress_row(conn: &Connection, user_id: Id, level_id: Id) -> Result<Option<ProgressRecord>, AppError> {
    conn.query_row(
        "SELECT level_id, completed_steps, passed FROM progress WHERE user_id = ?1 AND level_id = ?2",
        params![user_id, level_id],
        raw_progress_from_row,
    )
    .optional()?
    .map(decode_progress)
    .transpose()
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| AppError::Internal(format!("failed to build salt: {e}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user() -> (Db, User) {
        let db = Db::open_in_memory().expect("in-memory db");
        let user = db.create_user("Ann", "ann@example.com", "password123").expect("create user");
        (db, user)
    }

    #[test]
    fn password_is_verified_against_hash() {
        let (db, user) = db_with_user();
        assert!(db.email_exists("ann@example.com").expect("query"));
        let found = db.verify_user_password("ann@example.com", "password123").expect("query");
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(db.verify_user_password("ann@example.com", "wrong-pass").expect("query").is_none());
        assert!(db.verify_user_password("nobody@example.com", "password123").expect("query").is_none());
    }

    #[test]
    fn duplicate_email_violates_unique_constraint() {
        let (db, _) = db_with_user();
        assert!(matches!(
            db.create_user("Ann 2", "ann@example.com", "password123"),
            Err(AppError::Storage(_))
        ));
    }

    #[test]
    fn spend_coins_never_goes_negative() {
        let (db, user) = db_with_user();
        db.add_resources(user.id, 10, 2).expect("credit");
        assert!(db.spend_coins(user.id, 2).expect("spend"));
        assert!(!db.spend_coins(user.id, 1).expect("spend"));
        assert_eq!(db.wallet(user.id).expect("wallet"), Wallet { exp: 10, coins: 0 });
    }

    #[test]
    fn progress_rows_are_unique_per_user_and_level() {
        let (db, user) = db_with_user();
        db.get_or_create_progress(user.id, 7).expect("create");
        db.get_or_create_progress(user.id, 7).expect("fetch");
        db.mark_passed(user.id, 7).expect("pass");
        db.mark_passed(user.id, 7).expect("pass again");
        let rows = db.progress_rows(user.id).expect("rows");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].passed);
    }

    #[test]
    fn mark_step_is_idempotent_and_sorted() {
        let (db, user) = db_with_user();
        db.mark_step(user.id, 3, 1).expect("step");
        db.mark_step(user.id, 3, 0).expect("step");
        db.mark_step(user.id, 3, 1).expect("step");
        let rec = db.progress(user.id, 3).expect("query").expect("row");
        assert_eq!(rec.completed_steps, vec![0, 1]);
        assert!(!rec.passed);
    }

    #[test]
    fn steps_are_only_copied_into_empty_rows() {
        let (db, user) = db_with_user();
        assert!(db.set_steps_if_empty(user.id, 4, &[0, 1, 2]).expect("copy"));
        assert!(!db.set_steps_if_empty(user.id, 4, &[0]).expect("skip"));
        let rec = db.progress(user.id, 4).expect("query").expect("row");
        assert_eq!(rec.completed_steps, vec![0, 1, 2]);
    }

    #[test]
    fn clearing_steps_keeps_the_passed_flag() {
        let (db, user) = db_with_user();
        db.mark_step(user.id, 5, 0).expect("step");
        db.mark_passed(user.id, 5).expect("pass");
        db.clear_steps(user.id, 5).expect("clear");
        let rec = db.progress(user.id, 5).expect("query").expect("row");
        assert!(rec.completed_steps.is_empty());
        assert!(rec.passed);
    }
}

// src/repository.rs

use crate::constants::DEFAULT_CONFIDENCE;
use crate::error::TrainerResult;
use crate::models::{
    Drill, DrillAttempt, DrillContent, Outcome, SessionRecord, StreakState, UserCategoryState,
    XpState,
};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::collections::BTreeSet;
use std::str::FromStr;

// --- Row Helpers ---

fn to_ts(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

fn from_ts(idx: usize, ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ts))
}

fn opt_from_ts(idx: usize, ts: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ts.map(|t| from_ts(idx, t)).transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn drill_from_row(row: &Row) -> Result<Drill> {
    Ok(Drill {
        id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        difficulty_score: row.get(3)?,
        content: DrillContent(json_column(row, 4)?),
        tags: json_column(row, 5)?,
    })
}

// --- Catalog ---

pub fn count_drills(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT count(*) FROM drills", [], |r| r.get(0))
}

pub fn insert_drill(conn: &Connection, drill: &Drill, position: i64) -> TrainerResult<()> {
    let content = serde_json::to_string(&drill.content)?;
    let tags = serde_json::to_string(&drill.tags)?;
    conn.execute(
        "INSERT OR REPLACE INTO drills (id, title, category, difficulty, content, tags, position) VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![drill.id, drill.title, drill.category, drill.difficulty_score, content, tags, position],
    )?;
    Ok(())
}

/// Catalog in insertion order, optionally restricted to one category.
pub fn get_catalog(conn: &Connection, category: Option<&str>) -> Result<Vec<Drill>> {
    let base = "SELECT id, title, category, difficulty, content, tags FROM drills";
    let drills = match category {
        Some(cat) => {
            let mut stmt =
                conn.prepare(&format!("{} WHERE category = ? ORDER BY position ASC", base))?;
            let rows = stmt.query_map([cat], drill_from_row)?;
            rows.collect::<Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!("{} ORDER BY position ASC", base))?;
            let rows = stmt.query_map([], drill_from_row)?;
            rows.collect::<Result<Vec<_>>>()?
        }
    };
    debug!("[DB] Loaded {} drills (category: {:?})", drills.len(), category);
    Ok(drills)
}

pub fn get_drill(conn: &Connection, drill_id: &str) -> Result<Option<Drill>> {
    conn.query_row(
        "SELECT id, title, category, difficulty, content, tags FROM drills WHERE id = ?",
        [drill_id],
        drill_from_row,
    )
    .optional()
}

// --- Category Confidence ---

/// Stored confidence for a category, or the default for a category never practiced.
pub fn get_category_state(
    conn: &Connection,
    user_id: &str,
    category: &str,
) -> Result<UserCategoryState> {
    conn.query_row(
        "SELECT confidence, last_practiced FROM category_state WHERE user_id = ? AND category = ?",
        params![user_id, category],
        |row| {
            Ok(UserCategoryState {
                category: category.to_string(),
                confidence: row.get(0)?,
                last_practiced: opt_from_ts(1, row.get(1)?)?,
                recent_success_rate: None,
            })
        },
    )
    .optional()?
    .map_or(
        Ok(UserCategoryState::new(category, DEFAULT_CONFIDENCE)),
        Ok,
    )
}

pub fn get_category_states(conn: &Connection, user_id: &str) -> Result<Vec<UserCategoryState>> {
    let mut stmt = conn.prepare(
        "SELECT category, confidence, last_practiced FROM category_state WHERE user_id = ? ORDER BY category",
    )?;
    let states = stmt
        .query_map([user_id], |row| {
            Ok(UserCategoryState {
                category: row.get(0)?,
                confidence: row.get(1)?,
                last_practiced: opt_from_ts(2, row.get(2)?)?,
                recent_success_rate: None,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(states)
}

pub fn save_category_state(
    conn: &Connection,
    user_id: &str,
    state: &UserCategoryState,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO category_state (user_id, category, confidence, last_practiced) VALUES (?, ?, ?, ?)",
        params![
            user_id,
            state.category,
            state.confidence,
            state.last_practiced.map(to_ts)
        ],
    )?;
    Ok(())
}

// --- Attempt Log ---

/// Appends an attempt. The log is never updated in place.
pub fn log_attempt(conn: &Connection, user_id: &str, attempt: &DrillAttempt) -> TrainerResult<()> {
    let tags = serde_json::to_string(&attempt.tags)?;
    conn.execute(
        "INSERT INTO attempts (user_id, drill_id, category, outcome, difficulty, tags, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            user_id,
            attempt.drill_id,
            attempt.category,
            attempt.outcome.as_str(),
            attempt.difficulty_score,
            tags,
            to_ts(attempt.timestamp)
        ],
    )?;
    Ok(())
}

/// The user's latest `limit` attempts, oldest first. `category` narrows the log.
pub fn get_recent_attempts(
    conn: &Connection,
    user_id: &str,
    category: Option<&str>,
    limit: usize,
) -> Result<Vec<DrillAttempt>> {
    let mut stmt = conn.prepare(
        "SELECT drill_id, category, outcome, difficulty, tags, timestamp
         FROM attempts
         WHERE user_id = ?1 AND (?2 IS NULL OR category = ?2)
         ORDER BY timestamp DESC, id DESC
         LIMIT ?3",
    )?;

    let mut attempts = stmt
        .query_map(params![user_id, category, limit as i64], |row| {
            let outcome: String = row.get(2)?;
            Ok(DrillAttempt {
                drill_id: row.get(0)?,
                category: row.get(1)?,
                outcome: Outcome::from_str(&outcome).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
                })?,
                difficulty_score: row.get(3)?,
                tags: json_column::<BTreeSet<String>>(row, 4)?,
                timestamp: from_ts(5, row.get(5)?)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    attempts.reverse();
    Ok(attempts)
}

// --- Streak & XP ---

pub fn get_streak_state(conn: &Connection, user_id: &str) -> Result<StreakState> {
    conn.query_row(
        "SELECT current, longest, last_active, freeze_tokens FROM streak_state WHERE user_id = ?",
        [user_id],
        |row| {
            Ok(StreakState {
                current: row.get(0)?,
                longest: row.get(1)?,
                last_active: opt_from_ts(2, row.get(2)?)?,
                freeze_tokens: row.get(3)?,
            })
        },
    )
    .optional()
    .map(Option::unwrap_or_default)
}

pub fn save_streak_state(conn: &Connection, user_id: &str, state: &StreakState) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO streak_state (user_id, current, longest, last_active, freeze_tokens) VALUES (?, ?, ?, ?, ?)",
        params![
            user_id,
            state.current,
            state.longest,
            state.last_active.map(to_ts),
            state.freeze_tokens
        ],
    )?;
    Ok(())
}

pub fn get_xp_state(conn: &Connection, user_id: &str) -> Result<XpState> {
    conn.query_row(
        "SELECT xp, level, xp_to_next_level FROM xp_state WHERE user_id = ?",
        [user_id],
        |row| {
            Ok(XpState {
                xp: row.get::<_, i64>(0)?.max(0) as u64,
                level: row.get(1)?,
                xp_to_next_level: row.get::<_, i64>(2)?.max(1) as u64,
            })
        },
    )
    .optional()
    .map(Option::unwrap_or_default)
}

pub fn save_xp_state(conn: &Connection, user_id: &str, state: &XpState) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO xp_state (user_id, xp, level, xp_to_next_level) VALUES (?, ?, ?, ?)",
        params![
            user_id,
            state.xp as i64,
            state.level,
            state.xp_to_next_level as i64
        ],
    )?;
    Ok(())
}

// --- Sessions ---

pub fn create_session(conn: &Connection, session: &SessionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, user_id, drill_id, category, started_at, completed_at) VALUES (?, ?, ?, ?, ?, ?)",
        params![
            session.id,
            session.user_id,
            session.drill_id,
            session.category,
            to_ts(session.started_at),
            session.completed_at.map(to_ts)
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
    conn.query_row(
        "SELECT id, user_id, drill_id, category, started_at, completed_at FROM sessions WHERE id = ?",
        [session_id],
        |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                drill_id: row.get(2)?,
                category: row.get(3)?,
                started_at: from_ts(4, row.get(4)?)?,
                completed_at: opt_from_ts(5, row.get(5)?)?,
            })
        },
    )
    .optional()
}

pub fn mark_session_completed(
    conn: &Connection,
    session_id: &str,
    completed_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET completed_at = ? WHERE id = ?",
        params![to_ts(completed_at), session_id],
    )?;
    Ok(())
}

// --- Badges ---

pub fn get_badges(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT badge FROM badges WHERE user_id = ? ORDER BY awarded_at, badge")?;
    let badges = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()?;
    Ok(badges)
}

/// Returns false when the user already holds the badge.
pub fn award_badge(
    conn: &Connection,
    user_id: &str,
    badge: &str,
    awarded_at: DateTime<Utc>,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO badges (user_id, badge, awarded_at) VALUES (?, ?, ?)",
        params![user_id, badge, to_ts(awarded_at)],
    )?;
    Ok(inserted > 0)
}

// src/database.rs

use crate::constants::DIFFICULTY_MAX;
use crate::error::{TrainerError, TrainerResult};
use crate::models::Drill;
use crate::repository;
use log::{debug, info};
use rusqlite::{Connection, Result};

pub fn init_db(conn: &Connection) -> TrainerResult<()> {
    create_schema(conn)?;

    let count = repository::count_drills(conn)?;
    if count == 0 {
        info!("[DB] Drill catalog empty. Seeding built-in drills...");
        let data = include_str!("data/drills.json");
        let drills: Vec<Drill> = serde_json::from_str(data)?;
        seed_catalog(conn, &drills)?;
    }

    Ok(())
}

/// Creates the schema and loads `drills` instead of the built-in catalog.
pub fn init_db_with_catalog(conn: &Connection, drills: &[Drill]) -> TrainerResult<()> {
    create_schema(conn)?;
    seed_catalog(conn, drills)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    debug!("[DB] Checking database schema...");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS drills (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 0 AND 100),
            content TEXT NOT NULL DEFAULT 'null',
            tags TEXT NOT NULL DEFAULT '[]',
            position INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_drills_category ON drills (category, position);
        CREATE TABLE IF NOT EXISTS category_state (
            user_id TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0.5,
            last_practiced INTEGER,
            PRIMARY KEY (user_id, category)
        );
        CREATE TABLE IF NOT EXISTS attempts (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            drill_id TEXT NOT NULL,
            category TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK (outcome IN ('success','partial','fail')),
            difficulty INTEGER NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_attempts_user ON attempts (user_id, timestamp);
        CREATE TABLE IF NOT EXISTS streak_state (
            user_id TEXT PRIMARY KEY,
            current INTEGER NOT NULL DEFAULT 0,
            longest INTEGER NOT NULL DEFAULT 0,
            last_active INTEGER,
            freeze_tokens INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS xp_state (
            user_id TEXT PRIMARY KEY,
            xp INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 1,
            xp_to_next_level INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            drill_id TEXT NOT NULL,
            category TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            completed_at INTEGER
        );
        CREATE TABLE IF NOT EXISTS badges (
            user_id TEXT NOT NULL,
            badge TEXT NOT NULL,
            awarded_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, badge)
        );
        ",
    )
}

fn seed_catalog(conn: &Connection, drills: &[Drill]) -> TrainerResult<()> {
    // Whole catalog is checked before the first insert.
    if let Some(d) = drills.iter().find(|d| i32::from(d.difficulty_score) > DIFFICULTY_MAX) {
        return Err(TrainerError::invalid(format!(
            "drill {} has difficultyScore {} outside [0, {}]",
            d.id, d.difficulty_score, DIFFICULTY_MAX
        )));
    }
    let start = repository::count_drills(conn)?;
    for (i, d) in drills.iter().enumerate() {
        repository::insert_drill(conn, d, start + i as i64)?;
    }
    info!("[DB] Seeded {} drills", drills.len());
    Ok(())
}

// src/service.rs

use crate::assignment;
use crate::config::TrainerConfig;
use crate::error::{TrainerError, TrainerResult};
use crate::models::{
    AssignResult, CompleteRequest, Drill, DrillAttempt, ProgressUpdate, SessionRecord, SessionStart,
    StreakState, UserCategoryState, UserStatus,
};
use crate::progression;
use crate::random::RandomSource;
use crate::repository;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::Connection;
use uuid::Uuid;

// --- Public Interface ---

pub fn assign_next<R: RandomSource + ?Sized>(
    conn: &Connection,
    user_id: &str,
    category: &str,
    config: &TrainerConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> TrainerResult<AssignResult> {
    debug!("Requesting next drill for {} in '{}'...", user_id, category);
    let (state, catalog, history) = load_assign_inputs(conn, user_id, category, config)?;
    assignment::assign(&state, &catalog, &history, &config.assignment, now, rng)
}

/// Assigns a drill and opens a session for it.
pub fn start_session<R: RandomSource + ?Sized>(
    conn: &Connection,
    user_id: &str,
    category: &str,
    config: &TrainerConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> TrainerResult<SessionStart> {
    let tx = conn.unchecked_transaction()?;
    let assigned = assign_next(&tx, user_id, category, config, now, rng)?;

    let session = SessionRecord {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        drill_id: assigned.drill.id.clone(),
        category: category.to_string(),
        started_at: now,
        completed_at: None,
    };
    repository::create_session(&tx, &session)?;
    tx.commit()?;

    info!(
        "Session {} started for {} on drill {}",
        session.id, user_id, session.drill_id
    );
    Ok(SessionStart {
        session_id: session.id,
        drill: assigned.drill,
        meta: assigned.meta,
    })
}

/// Records the outcome of an open session and persists the new progression state.
///
/// Returned badges exclude any the user already holds.
pub fn complete_session(
    conn: &Connection,
    request: &CompleteRequest,
    config: &TrainerConfig,
    now: DateTime<Utc>,
) -> TrainerResult<ProgressUpdate> {
    let tx = conn.unchecked_transaction()?;
    let outcome = &request.outcome;

    let session = repository::get_session(&tx, &request.session_id)?
        .ok_or_else(|| TrainerError::NotFound(format!("session {}", request.session_id)))?;
    if session.completed_at.is_some() {
        return Err(TrainerError::invalid(format!(
            "session {} is already completed",
            session.id
        )));
    }
    if outcome.drill_id != session.drill_id {
        return Err(TrainerError::invalid(format!(
            "session {} was assigned drill {}, not {}",
            session.id, session.drill_id, outcome.drill_id
        )));
    }
    let drill = repository::get_drill(&tx, &session.drill_id)?
        .ok_or_else(|| TrainerError::NotFound(format!("drill {}", session.drill_id)))?;

    let user_id = session.user_id.as_str();
    let category_state = repository::get_category_state(&tx, user_id, &session.category)?;
    let streak = repository::get_streak_state(&tx, user_id)?;
    let xp = repository::get_xp_state(&tx, user_id)?;

    let mut update = progression::complete_session(
        &streak,
        &xp,
        &category_state,
        outcome,
        now,
        &config.progression,
    )?;

    // 1. Append to the attempt log
    repository::log_attempt(
        &tx,
        user_id,
        &DrillAttempt {
            drill_id: drill.id.clone(),
            category: session.category.clone(),
            outcome: outcome.drill_outcome,
            timestamp: now,
            difficulty_score: drill.difficulty_score,
            tags: drill.tags.clone(),
        },
    )?;

    // 2. Persist state
    let new_category = UserCategoryState {
        confidence: update.updated_category_confidence,
        last_practiced: Some(now),
        ..category_state
    };
    repository::save_category_state(&tx, user_id, &new_category)?;
    repository::save_streak_state(&tx, user_id, &update.streak_state)?;
    repository::save_xp_state(&tx, user_id, &update.xp_state)?;

    // 3. Badges, deduplicated against those already awarded
    let mut fresh = Vec::with_capacity(update.badges_earned.len());
    for badge in &update.badges_earned {
        if repository::award_badge(&tx, user_id, badge, now)? {
            fresh.push(badge.clone());
        } else {
            debug!("Badge {} already held by {}", badge, user_id);
        }
    }
    update.badges_earned = fresh;

    repository::mark_session_completed(&tx, &session.id, now)?;
    tx.commit()?;

    info!(
        "Session {} completed: {} ({}), +{} XP, streak {} ({:?})",
        session.id,
        drill.id,
        outcome.drill_outcome,
        update.xp_awarded,
        update.streak_state.current,
        update.streak_event
    );
    Ok(update)
}

pub fn user_status(conn: &Connection, user_id: &str) -> TrainerResult<UserStatus> {
    Ok(UserStatus {
        user_id: user_id.to_string(),
        xp_state: repository::get_xp_state(conn, user_id)?,
        streak_state: repository::get_streak_state(conn, user_id)?,
        categories: repository::get_category_states(conn, user_id)?,
        badges: repository::get_badges(conn, user_id)?,
    })
}

pub fn grant_freeze_tokens(
    conn: &Connection,
    user_id: &str,
    count: u32,
) -> TrainerResult<StreakState> {
    let mut streak = repository::get_streak_state(conn, user_id)?;
    streak.freeze_tokens = streak.freeze_tokens.saturating_add(count);
    repository::save_streak_state(conn, user_id, &streak)?;
    info!(
        "Granted {} freeze token(s) to {} (now {})",
        count, user_id, streak.freeze_tokens
    );
    Ok(streak)
}

// --- Internal Logic ---

fn load_assign_inputs(
    conn: &Connection,
    user_id: &str,
    category: &str,
    config: &TrainerConfig,
) -> TrainerResult<(UserCategoryState, Vec<Drill>, Vec<DrillAttempt>)> {
    let params = &config.assignment;
    let mut state = repository::get_category_state(conn, user_id, category)?;

    let category_history =
        repository::get_recent_attempts(conn, user_id, Some(category), params.success_rate_window)?;
    state.recent_success_rate =
        assignment::recent_success_rate(&category_history, category, params.success_rate_window);

    let history = repository::get_recent_attempts(conn, user_id, None, params.history_window)?;
    // Whole catalog so the engine can fall back past an empty category.
    let catalog = repository::get_catalog(conn, None)?;
    if catalog.is_empty() {
        warn!("Drill catalog is empty; run init first");
    }

    debug!(
        "[Assign Inputs] {} / {}: confidence {:.3}, recent success {:?}, history {}, catalog {}",
        user_id,
        category,
        state.confidence,
        state.recent_success_rate,
        history.len(),
        catalog.len()
    );
    Ok((state, catalog, history))
}

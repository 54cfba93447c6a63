// src/progression.rs

use crate::config::{FreezePolicy, ProgressionParams};
use crate::constants::*;
use crate::error::{TrainerError, TrainerResult};
use crate::models::{
    Outcome, ProgressUpdate, SessionOutcome, StreakEvent, StreakState, UserCategoryState, XpState,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

// --- Public Interface ---

/// Applies one session outcome to the user's XP, streak and category confidence.
pub fn complete_session(
    streak: &StreakState,
    xp: &XpState,
    category: &UserCategoryState,
    outcome: &SessionOutcome,
    now: DateTime<Utc>,
    params: &ProgressionParams,
) -> TrainerResult<ProgressUpdate> {
    validate_outcome(category, outcome)?;
    info!(
        "Completing session on drill {} ({}, {:.1} min, completed: {})",
        outcome.drill_id, outcome.drill_outcome, outcome.duration_minutes, outcome.completed
    );

    // 1. XP & Level
    let (xp_state, xp_awarded) = update_xp(xp, outcome.xp_earned, params.xp_multiplier);
    let leveled_up = xp_state.level > xp.level;

    // 2. Streak
    let (streak_state, streak_event) = if outcome.completed {
        update_streak(streak, now, outcome.use_freeze, params.freeze_policy)
    } else {
        debug!("[Streak] Session not completed, streak untouched");
        (streak.clone(), StreakEvent::Unchanged)
    };

    // 3. Confidence
    let updated_category_confidence = match outcome.confidence_after {
        Some(c) => {
            debug!("[Confidence] Caller supplied confidence {:.3}", c);
            c
        }
        None => update_confidence(
            category.confidence,
            outcome.drill_outcome,
            params.confidence_alpha,
        ),
    };
    info!(
        "[Confidence Result] {}: {:.3} -> {:.3}",
        category.category, category.confidence, updated_category_confidence
    );

    // 4. Badges
    let badges_earned = badges_crossed(streak, &streak_state, xp, &xp_state);
    if !badges_earned.is_empty() {
        info!("Badges earned: {:?}", badges_earned);
    }

    Ok(ProgressUpdate {
        xp_state,
        streak_state,
        updated_category_confidence,
        badges_earned,
        xp_awarded,
        streak_event,
        leveled_up,
    })
}

/// Cumulative XP at which `level` is left for `level + 1`. Saturates at `u64::MAX`.
pub fn level_threshold(level: u32) -> u64 {
    let l = u64::from(level.max(1));
    LEVEL_CURVE_STEP.saturating_mul(l).saturating_mul(l + 1)
}

/// Level reached by a cumulative XP total.
pub fn level_for_xp(xp: u64) -> u32 {
    walk_levels(xp, 1).0
}

/// Exponential moving average toward the outcome's target, clamped to [0, 1].
pub fn update_confidence(confidence: f64, outcome: Outcome, alpha: f64) -> f64 {
    let target = match outcome {
        Outcome::Success => CONFIDENCE_TARGET_SUCCESS,
        Outcome::Partial => CONFIDENCE_TARGET_PARTIAL,
        Outcome::Fail => CONFIDENCE_TARGET_FAIL,
    };
    (confidence + alpha * (target - confidence)).clamp(0.0, 1.0)
}

pub fn update_xp(xp: &XpState, earned: u32, multiplier: f64) -> (XpState, u64) {
    let awarded = (f64::from(earned) * multiplier).round().max(0.0) as u64;
    let total = xp.xp.saturating_add(awarded);

    let (level, next) = walk_levels(total, xp.level);

    info!(
        "[XP Result] +{} ({} x{:.2}): {} -> {}, Level {} -> {} (next at {})",
        awarded, earned, multiplier, xp.xp, total, xp.level, level, next
    );

    (
        XpState {
            xp: total,
            level,
            xp_to_next_level: next,
        },
        awarded,
    )
}

/// Advances the streak for a completed session on the UTC day of `now`.
pub fn update_streak(
    streak: &StreakState,
    now: DateTime<Utc>,
    use_freeze: bool,
    policy: FreezePolicy,
) -> (StreakState, StreakEvent) {
    let mut next = streak.clone();
    let today = now.date_naive();

    let event = match streak.last_active.map(|t| (today - t.date_naive()).num_days()) {
        None => {
            next.current = 1;
            StreakEvent::Started
        }
        Some(gap) if gap <= 0 => {
            next.current = next.current.max(1);
            StreakEvent::Unchanged
        }
        Some(1) => {
            next.current += 1;
            StreakEvent::Extended
        }
        Some(2) if streak.freeze_tokens > 0 && freeze_allowed(policy, use_freeze) => {
            next.freeze_tokens -= 1;
            StreakEvent::Frozen
        }
        Some(gap) => {
            warn!(
                "[Streak] Broken after {} day gap (was {}, tokens {})",
                gap, streak.current, streak.freeze_tokens
            );
            next.current = 1;
            StreakEvent::Broken
        }
    };

    next.longest = next.longest.max(next.current);
    // An out-of-order session never moves lastActive backwards.
    next.last_active = match streak.last_active {
        Some(prev) if prev > now => Some(prev),
        _ => Some(now),
    };

    info!(
        "[Streak Result] {:?}: {} -> {} (longest {}, tokens {})",
        event, streak.current, next.current, next.longest, next.freeze_tokens
    );
    (next, event)
}

// --- Internal Logic ---

/// Climbs from `level` while `xp` reaches the threshold. Stops once the curve saturates.
fn walk_levels(xp: u64, level: u32) -> (u32, u64) {
    let mut level = level.max(1);
    let mut next = level_threshold(level);
    while xp >= next && next < u64::MAX && level < u32::MAX {
        level += 1;
        next = level_threshold(level);
    }
    (level, next)
}

fn freeze_allowed(policy: FreezePolicy, use_freeze: bool) -> bool {
    match policy {
        FreezePolicy::Automatic => true,
        FreezePolicy::Manual => use_freeze,
    }
}

fn validate_outcome(category: &UserCategoryState, outcome: &SessionOutcome) -> TrainerResult<()> {
    if !outcome.duration_minutes.is_finite() || outcome.duration_minutes <= 0.0 {
        return Err(TrainerError::invalid(format!(
            "durationMinutes must be positive, got {}",
            outcome.duration_minutes
        )));
    }
    if outcome.drill_id.trim().is_empty() {
        return Err(TrainerError::invalid("drillId is required"));
    }
    check_unit("confidence", category.confidence)?;
    if let Some(c) = outcome.confidence_after {
        check_unit("confidenceAfter", c)?;
    }
    Ok(())
}

fn check_unit(name: &str, value: f64) -> TrainerResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrainerError::invalid(format!(
            "{} {} is outside [0, 1]",
            name, value
        )))
    }
}

/// Thresholds crossed by this update only: before < t <= after.
fn badges_crossed(
    streak_before: &StreakState,
    streak_after: &StreakState,
    xp_before: &XpState,
    xp_after: &XpState,
) -> Vec<String> {
    let mut badges = Vec::new();
    for t in STREAK_BADGE_THRESHOLDS {
        if streak_before.current < t && streak_after.current >= t {
            badges.push(format!("streak_{}", t));
        }
    }
    for t in LEVEL_BADGE_THRESHOLDS {
        if xp_before.level < t && xp_after.level >= t {
            badges.push(format!("level_{}", t));
        }
    }
    for t in XP_BADGE_THRESHOLDS {
        if xp_before.xp < t && xp_after.xp >= t {
            badges.push(format!("xp_{}", t));
        }
    }
    badges
}

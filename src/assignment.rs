// src/assignment.rs

use crate::config::AssignParams;
use crate::constants::*;
use crate::error::{TrainerError, TrainerResult};
use crate::models::{
    AssignMeta, AssignResult, CandidateScope, DifficultyWindow, Drill, DrillAttempt, Outcome,
    UserCategoryState,
};
use crate::random::RandomSource;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::BTreeSet;

/// Breakdown of a candidate's score. Higher `total` wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub proximity: f64,
    pub novelty: f64,
    pub similarity: f64,
    pub exploration: f64,
    pub penalty: f64,
    pub total: f64,
}

// --- Public Interface ---

/// Picks the next drill for one user and category.
///
/// Makes exactly one `rng` draw per candidate, in catalog order.
pub fn assign<R: RandomSource + ?Sized>(
    state: &UserCategoryState,
    catalog: &[Drill],
    history: &[DrillAttempt],
    params: &AssignParams,
    now: DateTime<Utc>,
    rng: &mut R,
) -> TrainerResult<AssignResult> {
    validate_state(state)?;
    if catalog.is_empty() {
        return Err(TrainerError::invalid("drill catalog is empty"));
    }

    let confidence = state.confidence;
    let mut d_target = target_difficulty(confidence, params);
    let is_reinforcement = needs_reinforcement(state.recent_success_rate, params);
    if is_reinforcement {
        // Must happen before the window so selection leans easier.
        d_target = (d_target - params.reinforcement_penalty).max(DIFFICULTY_MIN);
    }
    let window = candidate_window(confidence);
    let (candidates, scope) = select_candidates(catalog, &state.category, d_target, window);

    debug!(
        "[Assign Input] Category: {}, Confidence: {:.3}, dTarget: {}, Window: -{}/+{}, Scope: {:?}, Candidates: {}",
        state.category,
        confidence,
        d_target,
        window.low,
        window.high,
        scope,
        candidates.len()
    );

    let recent = recent_attempts(history, params.history_window);
    let failed = failed_tags(&recent);

    let mut best: Option<(&Drill, CandidateScore)> = None;
    for drill in candidates {
        let score = score_candidate(drill, d_target, history, &failed, params, now, rng);
        debug!(
            "[Score] {}: prox {:.3}, novelty {:.3}, sim {:.1}, explore {:.1}, penalty {:.1} => {:.3}",
            drill.id,
            score.proximity,
            score.novelty,
            score.similarity,
            score.exploration,
            score.penalty,
            score.total
        );
        // Strict comparison keeps the first drill in catalog order on ties.
        let better = match &best {
            Some((_, b)) => score.total > b.total,
            None => true,
        };
        if better {
            best = Some((drill, score));
        }
    }

    let (drill, score) =
        best.ok_or_else(|| TrainerError::invalid("no drill could be selected"))?;
    let reason = build_reason(is_reinforcement, score.exploration > 0.0);

    info!(
        "[Assign Result] {} -> {} (difficulty {}, score {:.3}, reason {})",
        state.category,
        drill.id,
        drill.difficulty(),
        score.total,
        reason
    );

    Ok(AssignResult {
        drill: drill.clone(),
        meta: AssignMeta {
            confidence_before: confidence,
            d_target,
            window,
            is_reinforcement,
            reason,
            candidate_scope: scope,
            score: score.total,
        },
    })
}

/// Ideal difficulty for a confidence, before any reinforcement penalty.
pub fn target_difficulty(confidence: f64, params: &AssignParams) -> i32 {
    let raw = params.base + (confidence - CONFIDENCE_MIDPOINT) * params.slope;
    (raw.round() as i32).clamp(DIFFICULTY_MIN, DIFFICULTY_MAX)
}

pub fn needs_reinforcement(recent_success_rate: Option<f64>, params: &AssignParams) -> bool {
    matches!(recent_success_rate, Some(rate) if rate < params.reinforcement_threshold)
}

/// Low confidence widens the window downward, high confidence upward.
pub fn candidate_window(confidence: f64) -> DifficultyWindow {
    DifficultyWindow {
        low: (WINDOW_LOW_BASE + (1.0 - confidence) * WINDOW_LOW_SPAN).round() as i32,
        high: (WINDOW_HIGH_BASE + confidence * WINDOW_HIGH_SPAN).round() as i32,
    }
}

/// Average outcome credit over the latest `window` attempts in `category`.
pub fn recent_success_rate(
    history: &[DrillAttempt],
    category: &str,
    window: usize,
) -> Option<f64> {
    let in_category: Vec<&DrillAttempt> =
        history.iter().filter(|a| a.category == category).collect();
    let recent = latest(in_category, window);
    if recent.is_empty() {
        return None;
    }
    let credit: f64 = recent.iter().map(|a| a.outcome.credit()).sum();
    Some(credit / recent.len() as f64)
}

// --- Internal Algorithm Logic ---

fn validate_state(state: &UserCategoryState) -> TrainerResult<()> {
    if !state.confidence.is_finite() || !(0.0..=1.0).contains(&state.confidence) {
        return Err(TrainerError::invalid(format!(
            "confidence {} is outside [0, 1]",
            state.confidence
        )));
    }
    if let Some(rate) = state.recent_success_rate {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(TrainerError::invalid(format!(
                "recentSuccessRate {} is outside [0, 1]",
                rate
            )));
        }
    }
    Ok(())
}

/// Window first, then the whole category, then the whole catalog.
fn select_candidates<'a>(
    catalog: &'a [Drill],
    category: &str,
    d_target: i32,
    window: DifficultyWindow,
) -> (Vec<&'a Drill>, CandidateScope) {
    let in_category: Vec<&Drill> = catalog.iter().filter(|d| d.category == category).collect();

    let in_window: Vec<&Drill> = in_category
        .iter()
        .copied()
        .filter(|d| window.contains(d_target, d.difficulty()))
        .collect();
    if !in_window.is_empty() {
        return (in_window, CandidateScope::Window);
    }

    if !in_category.is_empty() {
        debug!("[Assign] No drill in window, falling back to category '{}'", category);
        return (in_category, CandidateScope::Category);
    }

    debug!("[Assign] Category '{}' has no drills, falling back to catalog", category);
    (catalog.iter().collect(), CandidateScope::Catalog)
}

fn score_candidate<R: RandomSource + ?Sized>(
    drill: &Drill,
    d_target: i32,
    history: &[DrillAttempt],
    failed: &BTreeSet<&str>,
    params: &AssignParams,
    now: DateTime<Utc>,
    rng: &mut R,
) -> CandidateScore {
    let proximity = 1.0 - f64::from((drill.difficulty() - d_target).abs()) / 100.0;
    let novelty = novelty(drill, history, now);

    let similarity = if drill.tags.iter().any(|t| failed.contains(t.as_str())) {
        SIMILARITY_BOOST
    } else {
        0.0
    };

    let draw = rng.next_unit();
    let exploration = if params.exploration_probability > 0.0 && draw <= params.exploration_probability
    {
        EXPLORATION_BONUS
    } else {
        0.0
    };

    let penalty = match failure_rate(drill, history) {
        Some(rate) if rate > FAILURE_RATE_THRESHOLD => FAILURE_PENALTY,
        _ => 0.0,
    };

    let total = proximity * WEIGHT_PROXIMITY
        + novelty * WEIGHT_NOVELTY
        + similarity
        + exploration
        + penalty;

    CandidateScore {
        proximity,
        novelty,
        similarity,
        exploration,
        penalty,
        total,
    }
}

/// 1.0 for never-attempted or stale drills, ramping up linearly otherwise.
fn novelty(drill: &Drill, history: &[DrillAttempt], now: DateTime<Utc>) -> f64 {
    let last = history
        .iter()
        .filter(|a| a.drill_id == drill.id)
        .map(|a| a.timestamp)
        .max();

    match last {
        None => 1.0,
        Some(ts) => {
            let days = (now - ts).num_seconds() as f64 / DAY_SECONDS as f64;
            if days >= NOVELTY_FULL_DAYS {
                1.0
            } else {
                (days / NOVELTY_FULL_DAYS).max(0.0)
            }
        }
    }
}

fn failure_rate(drill: &Drill, history: &[DrillAttempt]) -> Option<f64> {
    let (attempts, fails) = history
        .iter()
        .filter(|a| a.drill_id == drill.id)
        .fold((0usize, 0usize), |(n, f), a| {
            (n + 1, f + usize::from(a.outcome == Outcome::Fail))
        });
    if attempts == 0 {
        None
    } else {
        Some(fails as f64 / attempts as f64)
    }
}

fn recent_attempts(history: &[DrillAttempt], window: usize) -> Vec<&DrillAttempt> {
    latest(history.iter().collect(), window)
}

/// Newest `n` attempts by timestamp. Input order breaks timestamp ties.
fn latest(mut attempts: Vec<&DrillAttempt>, n: usize) -> Vec<&DrillAttempt> {
    attempts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    attempts.truncate(n);
    attempts
}

fn failed_tags<'a>(recent: &[&'a DrillAttempt]) -> BTreeSet<&'a str> {
    recent
        .iter()
        .filter(|a| a.outcome == Outcome::Fail)
        .flat_map(|a| a.tags.iter().map(String::as_str))
        .collect()
}

fn build_reason(is_reinforcement: bool, explored: bool) -> String {
    match (is_reinforcement, explored) {
        (true, true) => "reinforcement+exploration",
        (true, false) => "reinforcement",
        (false, true) => "exploration",
        (false, false) => "proximity",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{FixedDraw, SequenceDraw};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn drill(id: &str, category: &str, difficulty: u8, tags: &[&str]) -> Drill {
        Drill {
            id: id.to_string(),
            title: format!("Drill {}", id),
            category: category.to_string(),
            difficulty_score: difficulty,
            content: Default::default(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn attempt(d: &Drill, outcome: Outcome, days_ago: i64) -> DrillAttempt {
        DrillAttempt {
            drill_id: d.id.clone(),
            category: d.category.clone(),
            outcome,
            timestamp: now() - Duration::days(days_ago),
            difficulty_score: d.difficulty_score,
            tags: d.tags.clone(),
        }
    }

    fn shooting_catalog(difficulties: &[u8]) -> Vec<Drill> {
        difficulties
            .iter()
            .map(|&d| drill(&format!("shoot-{}", d), "shooting", d, &["shooting"]))
            .collect()
    }

    #[test]
    fn confident_user_gets_harder_drill() {
        let catalog = shooting_catalog(&[30, 42, 60]);
        let state = UserCategoryState::new("shooting", 0.85);

        let result = assign(
            &state,
            &catalog,
            &[],
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap();

        assert!(result.meta.d_target > 40);
        assert!(result.drill.difficulty() >= 35);
        assert!(!result.meta.is_reinforcement);
        assert_eq!(result.meta.reason, "proximity");
        assert_eq!(result.drill.id, "shoot-42");
        assert_eq!(result.meta.candidate_scope, CandidateScope::Window);
    }

    #[test]
    fn struggling_user_enters_reinforcement() {
        let catalog = shooting_catalog(&[18, 36, 54]);
        let history = vec![
            attempt(&catalog[1], Outcome::Fail, 3),
            attempt(&catalog[1], Outcome::Fail, 2),
            attempt(&catalog[0], Outcome::Partial, 1),
        ];
        let mut state = UserCategoryState::new("shooting", 0.3);
        state.recent_success_rate = recent_success_rate(&history, "shooting", SUCCESS_RATE_WINDOW);

        let result = assign(
            &state,
            &catalog,
            &history,
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap();

        assert!(result.meta.is_reinforcement);
        assert!(result.meta.d_target < 30);
        assert!(result.meta.reason.contains("reinforcement"));
        assert_eq!(result.drill.id, "shoot-18");
    }

    #[test]
    fn reinforcement_narrows_window_before_filtering() {
        // Unpenalized bounds [-4, 38] would admit 33; penalized bounds [-14, 28] admit neither.
        let catalog = shooting_catalog(&[33, 45]);
        let mut state = UserCategoryState::new("shooting", 0.3);
        state.recent_success_rate = Some(0.2);

        let result = assign(
            &state,
            &catalog,
            &[],
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap();

        assert_eq!(result.meta.d_target, 12);
        assert_eq!(result.meta.candidate_scope, CandidateScope::Category);
        assert_eq!(result.drill.id, "shoot-33");
    }

    #[test]
    fn forced_draw_marks_exploration() {
        let catalog = shooting_catalog(&[30, 42, 60]);
        let state = UserCategoryState::new("shooting", 0.85);

        let result = assign(
            &state,
            &catalog,
            &[],
            &AssignParams::default(),
            now(),
            &mut FixedDraw(0.05),
        )
        .unwrap();

        assert!(result.meta.reason.contains("exploration"));
        assert!(catalog.iter().any(|d| d.id == result.drill.id));
    }

    #[test]
    fn single_exploration_hit_overrides_proximity() {
        let catalog = shooting_catalog(&[30, 42, 60]);
        let state = UserCategoryState::new("shooting", 0.85);
        // Only the third candidate (difficulty 60) gets the bonus.
        let mut rng = SequenceDraw::new(vec![0.9, 0.9, 0.01]);

        let result = assign(&state, &catalog, &[], &AssignParams::default(), now(), &mut rng)
            .unwrap();

        assert_eq!(result.drill.id, "shoot-60");
        assert_eq!(result.meta.reason, "exploration");
    }

    #[test]
    fn zero_probability_never_explores() {
        let catalog = shooting_catalog(&[30, 42]);
        let state = UserCategoryState::new("shooting", 0.5);
        let params = AssignParams {
            exploration_probability: 0.0,
            ..AssignParams::default()
        };

        let result = assign(&state, &catalog, &[], &params, now(), &mut FixedDraw(0.0)).unwrap();
        assert_eq!(result.meta.reason, "proximity");
    }

    #[test]
    fn empty_catalog_is_invalid_input() {
        let state = UserCategoryState::new("shooting", 0.5);
        let err = assign(
            &state,
            &[],
            &[],
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap_err();
        assert!(matches!(err, TrainerError::InvalidInput(_)));
    }

    #[test]
    fn out_of_range_confidence_is_invalid_input() {
        let catalog = shooting_catalog(&[30]);
        for bad in [-0.1, 1.5, f64::NAN] {
            let state = UserCategoryState::new("shooting", bad);
            let err = assign(
                &state,
                &catalog,
                &[],
                &AssignParams::default(),
                now(),
                &mut FixedDraw(1.0),
            )
            .unwrap_err();
            assert!(matches!(err, TrainerError::InvalidInput(_)));
        }

        let mut state = UserCategoryState::new("shooting", 0.5);
        state.recent_success_rate = Some(1.2);
        assert!(assign(
            &state,
            &catalog,
            &[],
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0)
        )
        .is_err());
    }

    #[test]
    fn falls_back_to_category_then_catalog() {
        let state = UserCategoryState::new("shooting", 0.5);
        let params = AssignParams::default();

        let catalog = vec![drill("pass-30", "passing", 30, &[]), drill("shoot-95", "shooting", 95, &[])];
        let result = assign(&state, &catalog, &[], &params, now(), &mut FixedDraw(1.0)).unwrap();
        assert_eq!(result.drill.id, "shoot-95");
        assert_eq!(result.meta.candidate_scope, CandidateScope::Category);

        let catalog = vec![drill("pass-30", "passing", 30, &[]), drill("pass-80", "passing", 80, &[])];
        let result = assign(&state, &catalog, &[], &params, now(), &mut FixedDraw(1.0)).unwrap();
        assert_eq!(result.drill.id, "pass-30");
        assert_eq!(result.meta.candidate_scope, CandidateScope::Catalog);
    }

    #[test]
    fn ties_go_to_catalog_order() {
        let catalog = vec![
            drill("first", "shooting", 30, &[]),
            drill("second", "shooting", 30, &[]),
        ];
        let state = UserCategoryState::new("shooting", 0.5);
        let result = assign(
            &state,
            &catalog,
            &[],
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap();
        assert_eq!(result.drill.id, "first");
    }

    #[test]
    fn recently_practiced_drill_loses_novelty() {
        let catalog = vec![
            drill("seen", "shooting", 30, &[]),
            drill("fresh", "shooting", 30, &[]),
        ];
        let history = vec![attempt(&catalog[0], Outcome::Success, 1)];
        let state = UserCategoryState::new("shooting", 0.5);

        let result = assign(
            &state,
            &catalog,
            &history,
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap();
        assert_eq!(result.drill.id, "fresh");
    }

    #[test]
    fn novelty_ramps_to_full_after_two_weeks() {
        let d = drill("a", "shooting", 30, &[]);
        assert_eq!(novelty(&d, &[], now()), 1.0);
        assert_eq!(novelty(&d, &[attempt(&d, Outcome::Success, 20)], now()), 1.0);
        let week = novelty(&d, &[attempt(&d, Outcome::Success, 7)], now());
        assert!((week - 0.5).abs() < 1e-9);
        assert_eq!(novelty(&d, &[attempt(&d, Outcome::Success, 0)], now()), 0.0);
    }

    #[test]
    fn failed_tags_boost_similar_drills() {
        let catalog = vec![
            drill("dribble", "shooting", 30, &["dribble"]),
            drill("layup", "shooting", 30, &["layup"]),
        ];
        let missed = drill("old-layup", "shooting", 30, &["layup"]);
        let history = vec![attempt(&missed, Outcome::Fail, 20)];
        let state = UserCategoryState::new("shooting", 0.5);

        let result = assign(
            &state,
            &catalog,
            &history,
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap();
        assert_eq!(result.drill.id, "layup");
    }

    #[test]
    fn failed_tags_outside_window_are_ignored() {
        let catalog = vec![
            drill("dribble", "shooting", 30, &["dribble"]),
            drill("layup", "shooting", 30, &["layup"]),
        ];
        let missed = drill("old-layup", "shooting", 30, &["layup"]);
        let filler = drill("filler", "passing", 50, &["passing"]);
        let mut history = vec![attempt(&missed, Outcome::Fail, 30)];
        history.push(attempt(&filler, Outcome::Success, 20));
        let state = UserCategoryState::new("shooting", 0.5);
        let params = AssignParams {
            history_window: 1,
            ..AssignParams::default()
        };

        let result = assign(&state, &catalog, &history, &params, now(), &mut FixedDraw(1.0))
            .unwrap();
        assert_eq!(result.drill.id, "dribble");
    }

    #[test]
    fn repeatedly_failed_drill_is_penalized() {
        let catalog = vec![
            drill("nemesis", "shooting", 30, &[]),
            drill("other", "shooting", 35, &[]),
        ];
        let history = vec![
            attempt(&catalog[0], Outcome::Fail, 40),
            attempt(&catalog[0], Outcome::Fail, 35),
            attempt(&catalog[0], Outcome::Success, 30),
        ];
        let state = UserCategoryState::new("shooting", 0.5);

        let result = assign(
            &state,
            &catalog,
            &history,
            &AssignParams::default(),
            now(),
            &mut FixedDraw(1.0),
        )
        .unwrap();
        assert_eq!(result.drill.id, "other");
    }

    #[test]
    fn target_and_window_shapes() {
        let params = AssignParams::default();
        assert_eq!(target_difficulty(0.5, &params), 30);
        assert_eq!(target_difficulty(0.0, &params), 10);
        assert_eq!(target_difficulty(1.0, &params), 50);

        let low_conf = candidate_window(0.0);
        let high_conf = candidate_window(1.0);
        assert_eq!(low_conf, DifficultyWindow { low: 30, high: 10 });
        assert_eq!(high_conf, DifficultyWindow { low: 15, high: 30 });
    }

    #[test]
    fn target_is_clamped() {
        let params = AssignParams {
            base: 95.0,
            slope: 100.0,
            ..AssignParams::default()
        };
        assert_eq!(target_difficulty(1.0, &params), 100);
        let params = AssignParams {
            base: 0.0,
            ..AssignParams::default()
        };
        assert_eq!(target_difficulty(0.0, &params), 1);
    }

    #[test]
    fn success_rate_uses_latest_attempts_in_category() {
        let s = drill("s", "shooting", 30, &[]);
        let p = drill("p", "passing", 30, &[]);
        let history = vec![
            attempt(&s, Outcome::Fail, 10),
            attempt(&s, Outcome::Success, 2),
            attempt(&s, Outcome::Partial, 1),
            attempt(&p, Outcome::Fail, 0),
        ];
        assert_eq!(recent_success_rate(&history, "shooting", 2), Some(0.75));
        assert_eq!(recent_success_rate(&history, "passing", 10), Some(0.0));
        assert_eq!(recent_success_rate(&history, "dribbling", 10), None);
    }

    proptest! {
        #[test]
        fn target_is_monotone_in_confidence(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let params = AssignParams::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(target_difficulty(lo, &params) <= target_difficulty(hi, &params));
        }

        #[test]
        fn low_success_rate_lowers_target(c in 0.0f64..=1.0, rate in 0.0f64..0.6) {
            let catalog = shooting_catalog(&[10, 30, 50, 70]);
            let mut state = UserCategoryState::new("shooting", c);
            state.recent_success_rate = Some(rate);
            let params = AssignParams::default();

            let result = assign(&state, &catalog, &[], &params, now(), &mut FixedDraw(1.0)).unwrap();
            prop_assert!(result.meta.is_reinforcement);
            prop_assert!(result.meta.d_target <= target_difficulty(c, &params));
            prop_assert!(result.meta.d_target >= DIFFICULTY_MIN);
        }

        #[test]
        fn picks_requested_category_when_present(
            entries in prop::collection::vec((0u8..=100, any::<bool>()), 1..12),
            c in 0.0f64..=1.0,
            draw in 0.0f64..1.0,
        ) {
            let catalog: Vec<Drill> = entries
                .iter()
                .enumerate()
                .map(|(i, (d, mine))| {
                    let cat = if *mine { "shooting" } else { "passing" };
                    drill(&format!("d{}", i), cat, *d, &[])
                })
                .collect();
            let state = UserCategoryState::new("shooting", c);

            let result = assign(&state, &catalog, &[], &AssignParams::default(), now(), &mut FixedDraw(draw)).unwrap();
            if catalog.iter().any(|d| d.category == "shooting") {
                prop_assert_eq!(result.drill.category.as_str(), "shooting");
            }
            prop_assert!((1..=100).contains(&result.meta.d_target));
        }
    }
}

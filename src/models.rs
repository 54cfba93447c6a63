// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::constants::{DIFFICULTY_MAX, LEVEL_CURVE_STEP};

// --- Catalog ---

/// Presentation payload attached to a drill. Never interpreted by the engine.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct DrillContent(pub serde_json::Value);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Drill {
    pub id: String,
    pub title: String,
    pub category: String,
    pub difficulty_score: u8,
    #[serde(default)]
    pub content: DrillContent,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Drill {
    /// Difficulty clamped to the [0, 100] scale.
    pub fn difficulty(&self) -> i32 {
        i32::from(self.difficulty_score).min(DIFFICULTY_MAX)
    }
}

// --- Attempts ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Fail,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Fail => "fail",
        }
    }

    /// Credit used for success-rate averages.
    pub fn credit(&self) -> f64 {
        match self {
            Outcome::Success => 1.0,
            Outcome::Partial => 0.5,
            Outcome::Fail => 0.0,
        }
    }
}

impl FromStr for Outcome {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "partial" => Ok(Outcome::Partial),
            "fail" | "failure" => Ok(Outcome::Fail),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrillAttempt {
    pub drill_id: String,
    pub category: String,
    pub outcome: Outcome,
    #[serde(rename = "timestampISO")]
    pub timestamp: DateTime<Utc>,
    pub difficulty_score: u8,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

// --- Per-user State ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserCategoryState {
    pub category: String,
    pub confidence: f64,
    #[serde(rename = "lastPracticedISO", default)]
    pub last_practiced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recent_success_rate: Option<f64>,
}

impl UserCategoryState {
    pub fn new(category: impl Into<String>, confidence: f64) -> Self {
        UserCategoryState {
            category: category.into(),
            confidence,
            last_practiced: None,
            recent_success_rate: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    pub current: u32,
    pub longest: u32,
    #[serde(rename = "lastActiveISO", default)]
    pub last_active: Option<DateTime<Utc>>,
    pub freeze_tokens: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct XpState {
    pub xp: u64,
    pub level: u32,
    /// Cumulative XP at which the next level is reached.
    pub xp_to_next_level: u64,
}

impl Default for XpState {
    fn default() -> Self {
        XpState {
            xp: 0,
            level: 1,
            xp_to_next_level: LEVEL_CURVE_STEP * 2,
        }
    }
}

// --- Assignment Output ---

/// Spans below and above dTarget that bound the candidate search.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyWindow {
    pub low: i32,
    pub high: i32,
}

impl DifficultyWindow {
    pub fn bounds(&self, d_target: i32) -> (i32, i32) {
        (d_target - self.low, d_target + self.high)
    }

    pub fn contains(&self, d_target: i32, difficulty: i32) -> bool {
        let (lo, hi) = self.bounds(d_target);
        difficulty >= lo && difficulty <= hi
    }
}

/// Which level of the fallback chain produced the candidate set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CandidateScope {
    Window,
    Category,
    Catalog,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssignMeta {
    pub confidence_before: f64,
    pub d_target: i32,
    pub window: DifficultyWindow,
    pub is_reinforcement: bool,
    pub reason: String,
    pub candidate_scope: CandidateScope,
    pub score: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssignResult {
    pub drill: Drill,
    pub meta: AssignMeta,
}

// --- Progression ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub duration_minutes: f64,
    pub xp_earned: u32,
    pub completed: bool,
    pub drill_id: String,
    pub drill_outcome: Outcome,
    #[serde(default)]
    pub confidence_after: Option<f64>,
    /// Spend a freeze token under the manual freeze policy.
    #[serde(default)]
    pub use_freeze: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakEvent {
    #[serde(rename = "streak_started")]
    Started,
    #[serde(rename = "streak_extended")]
    Extended,
    #[serde(rename = "unchanged")]
    Unchanged,
    #[serde(rename = "streak_frozen")]
    Frozen,
    #[serde(rename = "streak_broken")]
    Broken,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub xp_state: XpState,
    pub streak_state: StreakState,
    pub updated_category_confidence: f64,
    pub badges_earned: Vec<String>,
    pub xp_awarded: u64,
    pub streak_event: StreakEvent,
    pub leveled_up: bool,
}

// --- Request Layer ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub drill_id: String,
    pub category: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    pub session_id: String,
    pub drill: Drill,
    pub meta: AssignMeta,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: SessionOutcome,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub xp_state: XpState,
    pub streak_state: StreakState,
    pub categories: Vec<UserCategoryState>,
    pub badges: Vec<String>,
}

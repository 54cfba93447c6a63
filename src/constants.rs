// src/constants.rs

// --- Time Constants ---
pub const DAY_SECONDS: i64 = 86400;

// --- Target Difficulty ---
pub const DIFFICULTY_MIN: i32 = 1;
pub const DIFFICULTY_MAX: i32 = 100;
pub const TARGET_BASE: f64 = 30.0;
pub const TARGET_SLOPE: f64 = 40.0;
pub const CONFIDENCE_MIDPOINT: f64 = 0.5;

// --- Reinforcement ---
pub const REINFORCEMENT_SUCCESS_THRESHOLD: f64 = 0.6;
pub const REINFORCEMENT_PENALTY: i32 = 10;

// --- Candidate Window (asymmetric around dTarget) ---
pub const WINDOW_LOW_BASE: f64 = 15.0;
pub const WINDOW_LOW_SPAN: f64 = 15.0;
pub const WINDOW_HIGH_BASE: f64 = 10.0;
pub const WINDOW_HIGH_SPAN: f64 = 20.0;

// --- Scoring ---
pub const WEIGHT_PROXIMITY: f64 = 0.5;
pub const WEIGHT_NOVELTY: f64 = 0.2;
pub const NOVELTY_FULL_DAYS: f64 = 14.0;
pub const SIMILARITY_BOOST: f64 = 0.2;
pub const EXPLORATION_PROBABILITY: f64 = 0.05;
pub const EXPLORATION_BONUS: f64 = 1.0;
pub const FAILURE_RATE_THRESHOLD: f64 = 0.6;
pub const FAILURE_PENALTY: f64 = -0.5;

// --- History ---
pub const HISTORY_WINDOW: usize = 20;
pub const SUCCESS_RATE_WINDOW: usize = 10;

// --- Confidence ---
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const CONFIDENCE_ALPHA: f64 = 0.2;
pub const CONFIDENCE_TARGET_SUCCESS: f64 = 1.0;
pub const CONFIDENCE_TARGET_PARTIAL: f64 = 0.5;
pub const CONFIDENCE_TARGET_FAIL: f64 = 0.0;

// --- XP / Levels ---
pub const XP_MULTIPLIER: f64 = 1.0;
// Cumulative XP needed to leave level L is LEVEL_CURVE_STEP * L * (L + 1).
pub const LEVEL_CURVE_STEP: u64 = 50;

// --- Badges ---
pub const STREAK_BADGE_THRESHOLDS: [u32; 3] = [7, 30, 100];
pub const LEVEL_BADGE_THRESHOLDS: [u32; 3] = [5, 10, 25];
pub const XP_BADGE_THRESHOLDS: [u64; 2] = [1000, 10000];

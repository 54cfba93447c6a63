// src/config.rs

use crate::constants::*;
use crate::error::{TrainerError, TrainerResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AssignParams {
    pub base: f64,
    pub slope: f64,
    pub reinforcement_threshold: f64,
    pub reinforcement_penalty: i32,
    pub exploration_probability: f64,
    /// Recent attempts scanned for failed-tag similarity.
    pub history_window: usize,
    /// Recent attempts averaged into recentSuccessRate by the request layer.
    pub success_rate_window: usize,
}

impl Default for AssignParams {
    fn default() -> Self {
        AssignParams {
            base: TARGET_BASE,
            slope: TARGET_SLOPE,
            reinforcement_threshold: REINFORCEMENT_SUCCESS_THRESHOLD,
            reinforcement_penalty: REINFORCEMENT_PENALTY,
            exploration_probability: EXPLORATION_PROBABILITY,
            history_window: HISTORY_WINDOW,
            success_rate_window: SUCCESS_RATE_WINDOW,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FreezePolicy {
    /// A token is spent whenever it can save the streak.
    #[default]
    Automatic,
    /// A token is spent only when the outcome asks for it.
    Manual,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressionParams {
    pub xp_multiplier: f64,
    pub confidence_alpha: f64,
    pub freeze_policy: FreezePolicy,
}

impl Default for ProgressionParams {
    fn default() -> Self {
        ProgressionParams {
            xp_multiplier: XP_MULTIPLIER,
            confidence_alpha: CONFIDENCE_ALPHA,
            freeze_policy: FreezePolicy::Automatic,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainerConfig {
    pub assignment: AssignParams,
    pub progression: ProgressionParams,
}

impl TrainerConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> TrainerResult<Self> {
        info!("Loading config from {:?}", path);
        let raw = fs::read_to_string(path)
            .map_err(|e| TrainerError::Config(format!("cannot read {:?}: {}", path, e)))?;
        let config: TrainerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!("[Config] {:?}", config);
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> TrainerResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> TrainerResult<()> {
        let a = &self.assignment;
        let p = &self.progression;
        if !a.base.is_finite() || !a.slope.is_finite() {
            return Err(TrainerError::Config("base and slope must be finite".into()));
        }
        if a.slope < 0.0 {
            return Err(TrainerError::Config("slope must be non-negative".into()));
        }
        if !(0.0..=1.0).contains(&a.reinforcement_threshold) {
            return Err(TrainerError::Config(
                "reinforcementThreshold must be within [0, 1]".into(),
            ));
        }
        if a.reinforcement_penalty < 0 {
            return Err(TrainerError::Config(
                "reinforcementPenalty must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&a.exploration_probability) {
            return Err(TrainerError::Config(
                "explorationProbability must be within [0, 1]".into(),
            ));
        }
        if a.history_window == 0 || a.success_rate_window == 0 {
            return Err(TrainerError::Config("history windows must be positive".into()));
        }
        if !p.xp_multiplier.is_finite() || p.xp_multiplier < 0.0 {
            return Err(TrainerError::Config("xpMultiplier must be non-negative".into()));
        }
        if !(p.confidence_alpha > 0.0 && p.confidence_alpha <= 1.0) {
            return Err(TrainerError::Config("confidenceAlpha must be within (0, 1]".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_constants() {
        let cfg = TrainerConfig::default();
        assert_eq!(cfg.assignment.base, 30.0);
        assert_eq!(cfg.assignment.slope, 40.0);
        assert_eq!(cfg.assignment.reinforcement_penalty, 10);
        assert_eq!(cfg.progression.xp_multiplier, 1.0);
        assert_eq!(cfg.progression.freeze_policy, FreezePolicy::Automatic);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"assignment": {{"base": 40.0}}, "progression": {{"freezePolicy": "manual"}}}}"#
        )
        .unwrap();

        let cfg = TrainerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.assignment.base, 40.0);
        assert_eq!(cfg.assignment.slope, 40.0);
        assert_eq!(cfg.progression.freeze_policy, FreezePolicy::Manual);
        assert_eq!(cfg.progression.confidence_alpha, CONFIDENCE_ALPHA);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"progression": {{"confidenceAlpha": 0.0}}}}"#).unwrap();
        assert!(matches!(
            TrainerConfig::load(file.path()),
            Err(TrainerError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = TrainerConfig::load(Path::new("/nonexistent/trainer.json")).unwrap_err();
        assert!(matches!(err, TrainerError::Config(_)));
    }
}

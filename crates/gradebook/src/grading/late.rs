use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::aggregate::round_score;
use super::validation::ValidationReport;

/// Level key that always means "no penalty".
pub const ON_TIME_LEVEL: &str = "none";

/// A named penalty tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LateLevel {
    pub key: String,
    pub name: String,
    pub multiplier: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

impl LateLevel {
    fn on_time() -> Self {
        Self {
            key: ON_TIME_LEVEL.to_string(),
            name: "On Time".to_string(),
            multiplier: 1.0,
            description: String::new(),
            color: String::new(),
        }
    }

    /// Penalised score before rounding.
    pub fn apply(&self, raw_score: f64) -> f64 {
        raw_score * self.multiplier
    }
}

/// A table of late levels keyed by level key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatePolicy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub levels: BTreeMap<String, LateLevel>,
}

impl LatePolicy {
    /// Level for `key`, degrading to the on-time level for unknown keys.
    pub fn level(&self, key: &str) -> LateLevel {
        self.levels
            .get(key.trim())
            .or_else(|| self.levels.get(ON_TIME_LEVEL))
            .cloned()
            .unwrap_or_else(LateLevel::on_time)
    }

    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("Late policy id is required".to_string());
        }
        if self.name.trim().is_empty() {
            errors.push("Late policy name is required".to_string());
        }

        match self.levels.get(ON_TIME_LEVEL) {
            Some(level) if (level.multiplier - 1.0).abs() < f64::EPSILON => {}
            Some(_) => errors.push("The 'none' level must have a multiplier of 1".to_string()),
            None => errors.push("Late policy must define a 'none' level".to_string()),
        }

        for (key, level) in &self.levels {
            if key != &level.key {
                errors.push(format!(
                    "Late level '{key}' is stored under a different key '{}'",
                    level.key
                ));
            }
            if !level.multiplier.is_finite() || !(0.0..=1.0).contains(&level.multiplier) {
                errors.push(format!(
                    "Late level '{key}' multiplier must be between 0 and 1"
                ));
            }
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Result of applying a late level to a raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatePenaltyOutcome {
    pub final_score: f64,
    pub raw_score: f64,
    pub level_applied: LateLevel,
    pub penalty_applied: bool,
}

/// Scale `raw_score` by the multiplier of `level_key`. Never fails.
pub fn apply_late_policy(raw_score: f64, level_key: &str, policy: &LatePolicy) -> LatePenaltyOutcome {
    let level = policy.level(level_key);
    let final_score = round_score(level.apply(raw_score));

    LatePenaltyOutcome {
        final_score,
        raw_score,
        penalty_applied: level.multiplier < 1.0,
        level_applied: level,
    }
}

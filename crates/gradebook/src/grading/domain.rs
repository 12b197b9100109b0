use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registered grading policies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub String);

impl PolicyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One row of a grade scale table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScaleEntry {
    pub letter: String,
    pub gpa_points: f64,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub passing_grade: bool,
}

impl GradeScaleEntry {
    pub fn new(letter: &str, gpa_points: f64, min: f64, max: f64, passing_grade: bool) -> Self {
        Self {
            letter: letter.to_string(),
            gpa_points,
            min_percentage: min,
            max_percentage: max,
            passing_grade,
        }
    }

    /// Exclusive upper edge of this entry. Whole-number boundaries put it at `max + 1`,
    /// unless a band of `scale` starts within `BOUNDARY_TOLERANCE` of that, in which case
    /// the neighbour's `min_percentage` is the edge.
    pub fn ceiling_in(&self, scale: &[GradeScaleEntry]) -> f64 {
        let nominal = self.max_percentage + BOUNDARY_STEP;
        scale
            .iter()
            .map(|entry| entry.min_percentage)
            .find(|min| (min - nominal).abs() <= BOUNDARY_TOLERANCE)
            .unwrap_or(nominal)
    }

    /// Whether `percentage` falls in `[min, ceiling)` for this entry of `scale`.
    pub fn covers(&self, percentage: f64, scale: &[GradeScaleEntry]) -> bool {
        percentage >= self.min_percentage && percentage < self.ceiling_in(scale)
    }
}

/// Distance between one entry's `max_percentage` and the next higher entry's `min_percentage`.
pub const BOUNDARY_STEP: f64 = 1.0;

/// Slack allowed when matching band edges written as decimals.
pub const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// A named grade scale plus the program types it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub program_types: Vec<String>,
    pub grade_scale: Vec<GradeScaleEntry>,
    pub is_active: bool,
    pub is_default: bool,
    #[serde(default = "initial_version")]
    pub version: u64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn initial_version() -> u64 {
    1
}

impl Policy {
    pub fn applies_to(&self, program_type: &str) -> bool {
        self.program_types
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(program_type.trim()))
    }

    /// The policy's fields as a draft, used when re-validating merged updates.
    pub fn to_draft(&self) -> PolicyDraft {
        PolicyDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            program_types: self.program_types.clone(),
            grade_scale: self.grade_scale.clone(),
            is_active: self.is_active,
            is_default: self.is_default,
        }
    }

    /// Lowest percentage that still earns a passing grade, if any entry passes.
    pub fn passing_threshold(&self) -> Option<f64> {
        self.grade_scale
            .iter()
            .filter(|entry| entry.passing_grade)
            .map(|entry| entry.min_percentage)
            .min_by(f64::total_cmp)
    }
}

/// Create payload for a policy; the registry assigns the id and version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub program_types: Vec<String>,
    #[serde(default)]
    pub grade_scale: Vec<GradeScaleEntry>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
}

fn default_true() -> bool {
    true
}

/// Partial update merged onto a stored policy before re-validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_scale: Option<Vec<GradeScaleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    /// When present the update only applies if the stored version still matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

impl PolicyPatch {
    pub fn apply_to(&self, draft: &mut PolicyDraft) {
        if let Some(name) = &self.name {
            draft.name = name.clone();
        }
        if let Some(description) = &self.description {
            draft.description = description.clone();
        }
        if let Some(program_types) = &self.program_types {
            draft.program_types = program_types.clone();
        }
        if let Some(grade_scale) = &self.grade_scale {
            draft.grade_scale = grade_scale.clone();
        }
        if let Some(is_active) = self.is_active {
            draft.is_active = is_active;
        }
        if let Some(is_default) = self.is_default {
            draft.is_default = is_default;
        }
    }
}

/// Optional listing filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFilter {
    #[serde(default)]
    pub program_type: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl PolicyFilter {
    pub fn matches(&self, policy: &Policy) -> bool {
        let program_ok = self
            .program_type
            .as_deref()
            .map(|program_type| policy.applies_to(program_type))
            .unwrap_or(true);
        let active_ok = self
            .is_active
            .map(|active| policy.is_active == active)
            .unwrap_or(true);
        program_ok && active_ok
    }
}

/// Calculator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub letter: String,
    pub gpa_points: f64,
    pub passing_grade: bool,
    pub percentage: f64,
    pub policy_id: PolicyId,
}

/// A graded submission; levels are referenced by key, never copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub student_id: String,
    pub assignment_id: String,
    #[serde(default)]
    pub selections: BTreeMap<String, String>,
    #[serde(default = "on_time_level")]
    pub late_level: String,
}

fn on_time_level() -> String {
    super::late::ON_TIME_LEVEL.to_string()
}

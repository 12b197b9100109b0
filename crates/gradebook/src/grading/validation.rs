use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::domain::{GradeScaleEntry, PolicyDraft, BOUNDARY_STEP, BOUNDARY_TOLERANCE};

pub const NAME_REQUIRED: &str = "Policy name is required";
pub const PROGRAM_TYPE_REQUIRED: &str = "At least one program type is required";
pub const SCALE_REQUIRED: &str = "Grade scale must contain at least one grade";
pub const SCALE_NOT_CONTIGUOUS: &str = "Grade scale ranges overlap or have gaps";
pub const SCALE_NOT_COVERING: &str = "Grade scale must cover 0 to 100";
pub const INACTIVE_DEFAULT: &str = "An inactive policy cannot be the default";

/// Outcome of validating a policy definition. Validation never fails; it reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// A policy definition violated one or more rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid grading policy: {}", errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Check a policy definition against every rule, collecting all violations.
pub fn validate(draft: &PolicyDraft) -> ValidationReport {
    let mut errors = Vec::new();

    if draft.name.trim().is_empty() {
        errors.push(NAME_REQUIRED.to_string());
    }

    if draft
        .program_types
        .iter()
        .all(|program_type| program_type.trim().is_empty())
    {
        errors.push(PROGRAM_TYPE_REQUIRED.to_string());
    }

    if draft.grade_scale.is_empty() {
        errors.push(SCALE_REQUIRED.to_string());
        return ValidationReport::from_errors(errors);
    }

    let mut entries_ok = true;
    let mut letters = HashSet::new();
    for entry in &draft.grade_scale {
        let label = entry.letter.trim();
        if label.is_empty() {
            errors.push("Grade letter is required".to_string());
            entries_ok = false;
        } else if !letters.insert(label.to_ascii_uppercase()) {
            errors.push(format!("Grade letter '{label}' appears more than once"));
        }

        if let Some(problem) = bound_problem(entry) {
            errors.push(problem);
            entries_ok = false;
        }

        if !entry.gpa_points.is_finite() || entry.gpa_points < 0.0 {
            errors.push(format!(
                "Grade '{label}' must have non-negative GPA points"
            ));
        }
    }

    // Contiguity only means something once every band is well formed.
    if entries_ok {
        errors.extend(contiguity_problems(&draft.grade_scale));
    }

    ValidationReport::from_errors(errors)
}

fn bound_problem(entry: &GradeScaleEntry) -> Option<String> {
    let (min, max) = (entry.min_percentage, entry.max_percentage);
    if !min.is_finite() || !max.is_finite() {
        return Some(format!("Grade '{}' has a non-numeric range", entry.letter));
    }
    if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) {
        return Some(format!(
            "Grade '{}' range must stay within 0 and 100",
            entry.letter
        ));
    }
    if min > max {
        return Some(format!(
            "Grade '{}' minimum percentage exceeds its maximum",
            entry.letter
        ));
    }
    None
}

fn contiguity_problems(scale: &[GradeScaleEntry]) -> Vec<String> {
    let mut sorted: Vec<&GradeScaleEntry> = scale.iter().collect();
    sorted.sort_by(|a, b| b.min_percentage.total_cmp(&a.min_percentage));

    let mut problems = Vec::new();

    let top = sorted[0];
    let bottom = sorted[sorted.len() - 1];
    if (top.max_percentage - 100.0).abs() > BOUNDARY_TOLERANCE
        || bottom.min_percentage.abs() > BOUNDARY_TOLERANCE
    {
        problems.push(SCALE_NOT_COVERING.to_string());
    }

    let contiguous = sorted.windows(2).all(|pair| {
        let (higher, lower) = (pair[0], pair[1]);
        (lower.max_percentage + BOUNDARY_STEP - higher.min_percentage).abs() <= BOUNDARY_TOLERANCE
    });
    if !contiguous {
        problems.push(SCALE_NOT_CONTIGUOUS.to_string());
    }

    problems
}

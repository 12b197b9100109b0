use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};

use super::domain::{GradeScaleEntry, Policy, PolicyId};
use super::late::{LateLevel, LatePolicy, ON_TIME_LEVEL};

pub const STANDARD_POLICY_ID: &str = "standard-2024";
pub const APPRENTICESHIP_POLICY_ID: &str = "apprenticeship-2024";
pub const GRADUATE_POLICY_ID: &str = "graduate-2024";
pub const STANDARD_LATE_POLICY_ID: &str = "standard-late";

fn published_on() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Policies every fresh registry starts with, in resolution order.
pub fn built_in_policies() -> Vec<Policy> {
    vec![standard_policy(), apprenticeship_policy(), graduate_policy()]
}

/// Hardcoded last-resort table used when the registry cannot supply a policy.
pub fn static_fallback() -> &'static Policy {
    static FALLBACK: OnceLock<Policy> = OnceLock::new();
    FALLBACK.get_or_init(standard_policy)
}

pub fn standard_policy() -> Policy {
    Policy {
        id: PolicyId::new(STANDARD_POLICY_ID),
        name: "Standard Grading Policy 2024".to_string(),
        description: "Letter grades for degree, diploma, and certificate programs.".to_string(),
        program_types: vec![
            "degree".to_string(),
            "diploma".to_string(),
            "certificate".to_string(),
        ],
        grade_scale: vec![
            GradeScaleEntry::new("A+", 4.0, 90.0, 100.0, true),
            GradeScaleEntry::new("A", 4.0, 85.0, 89.0, true),
            GradeScaleEntry::new("A-", 3.7, 80.0, 84.0, true),
            GradeScaleEntry::new("B+", 3.3, 77.0, 79.0, true),
            GradeScaleEntry::new("B", 3.0, 73.0, 76.0, true),
            GradeScaleEntry::new("B-", 2.7, 70.0, 72.0, true),
            GradeScaleEntry::new("C+", 2.3, 67.0, 69.0, true),
            GradeScaleEntry::new("C", 2.0, 63.0, 66.0, true),
            GradeScaleEntry::new("C-", 1.7, 60.0, 62.0, true),
            GradeScaleEntry::new("D+", 1.3, 57.0, 59.0, true),
            GradeScaleEntry::new("D", 1.0, 53.0, 56.0, true),
            GradeScaleEntry::new("D-", 0.7, 50.0, 52.0, true),
            GradeScaleEntry::new("F", 0.0, 0.0, 49.0, false),
        ],
        is_active: true,
        is_default: true,
        version: 1,
        updated_at: published_on(),
    }
}

pub fn apprenticeship_policy() -> Policy {
    Policy {
        id: PolicyId::new(APPRENTICESHIP_POLICY_ID),
        name: "Apprenticeship Competency Policy 2024".to_string(),
        description: "Competency-based scale; 70% is the lowest passing mark.".to_string(),
        program_types: vec!["apprenticeship".to_string(), "trades".to_string()],
        grade_scale: vec![
            GradeScaleEntry::new("A", 4.0, 90.0, 100.0, true),
            GradeScaleEntry::new("B", 3.0, 80.0, 89.0, true),
            GradeScaleEntry::new("C", 2.0, 70.0, 79.0, true),
            GradeScaleEntry::new("F", 0.0, 0.0, 69.0, false),
        ],
        is_active: true,
        is_default: false,
        version: 1,
        updated_at: published_on(),
    }
}

pub fn graduate_policy() -> Policy {
    Policy {
        id: PolicyId::new(GRADUATE_POLICY_ID),
        name: "Graduate Studies Policy 2024".to_string(),
        description: "Postgraduate scale; grades below B- do not pass.".to_string(),
        program_types: vec!["graduate".to_string(), "masters".to_string()],
        grade_scale: vec![
            GradeScaleEntry::new("A+", 4.0, 90.0, 100.0, true),
            GradeScaleEntry::new("A", 4.0, 85.0, 89.0, true),
            GradeScaleEntry::new("A-", 3.7, 80.0, 84.0, true),
            GradeScaleEntry::new("B+", 3.3, 75.0, 79.0, true),
            GradeScaleEntry::new("B", 3.0, 70.0, 74.0, true),
            GradeScaleEntry::new("B-", 2.7, 65.0, 69.0, true),
            GradeScaleEntry::new("F", 0.0, 0.0, 64.0, false),
        ],
        is_active: true,
        is_default: false,
        version: 1,
        updated_at: published_on(),
    }
}

pub fn standard_late_policy() -> LatePolicy {
    let levels = [
        (ON_TIME_LEVEL, "On Time", 1.0, "Submitted by the due date", "#2e7d32"),
        ("level1", "1 Day Late", 0.9, "Up to 24 hours late, 10% deduction", "#f9a825"),
        ("level2", "2-3 Days Late", 0.8, "Up to 72 hours late, 20% deduction", "#ef6c00"),
        ("level3", "4-7 Days Late", 0.7, "Up to one week late, 30% deduction", "#d84315"),
        ("level4", "Over 1 Week Late", 0.5, "More than one week late, 50% deduction", "#c62828"),
        ("rejected", "Not Accepted", 0.0, "Submitted after the cutoff date", "#424242"),
    ]
    .into_iter()
    .map(|(key, name, multiplier, description, color)| {
        (
            key.to_string(),
            LateLevel {
                key: key.to_string(),
                name: name.to_string(),
                multiplier,
                description: description.to_string(),
                color: color.to_string(),
            },
        )
    })
    .collect::<BTreeMap<_, _>>();

    LatePolicy {
        id: STANDARD_LATE_POLICY_ID.to_string(),
        name: "Standard Late Submission Policy".to_string(),
        description: "Stepped deductions by days late.".to_string(),
        levels,
    }
}

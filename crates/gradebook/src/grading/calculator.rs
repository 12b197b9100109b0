use super::domain::{GradeResult, Policy, PolicyId};

/// Failures raised while mapping a percentage to a grade.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculationError {
    #[error("percentage {0} is outside the range 0 to 100")]
    Range(f64),
    #[error("policy {policy_id} has {matches} grade bands covering {percentage}")]
    PolicyIntegrity {
        policy_id: PolicyId,
        percentage: f64,
        matches: usize,
    },
}

/// Map a percentage onto the single grade band of `policy` that covers it.
pub fn calculate(percentage: f64, policy: &Policy) -> Result<GradeResult, CalculationError> {
    if !(0.0..=100.0).contains(&percentage) {
        return Err(CalculationError::Range(percentage));
    }

    let mut matching = policy
        .grade_scale
        .iter()
        .filter(|entry| entry.covers(percentage, &policy.grade_scale));

    let entry = match (matching.next(), matching.next()) {
        (Some(entry), None) => entry,
        (first, second) => {
            let matches = [first, second].iter().flatten().count() + matching.count();
            return Err(CalculationError::PolicyIntegrity {
                policy_id: policy.id.clone(),
                percentage,
                matches,
            });
        }
    };

    Ok(GradeResult {
        letter: entry.letter.clone(),
        gpa_points: entry.gpa_points,
        passing_grade: entry.passing_grade,
        percentage,
        policy_id: policy.id.clone(),
    })
}

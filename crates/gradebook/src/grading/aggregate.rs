//! Rubric scoring and weighted multi-assignment aggregation.
//!
//! Rounding is uniform across the crate: scores carry one decimal, percentages two.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub fn round_score(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round_percentage(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Drop binary floating-point noise (`3.0 * 0.7 == 2.0999999999999996`) while keeping
/// every digit that matters when a percentage is compared against grade band edges.
pub fn settle(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

/// Clamp an aggregated percentage into `[0, 100]` before it reaches the calculator.
pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        warn!("aggregated percentage was NaN, clamping to 0");
        return 0.0;
    }
    let clamped = value.clamp(0.0, 100.0);
    if clamped != value {
        warn!(original = value, clamped, "aggregated percentage clamped");
    }
    clamped
}

/// Performance level shared by every criterion of a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricLevel {
    pub level: String,
    pub name: String,
    pub multiplier: f64,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    pub name: String,
    pub max_points: f64,
    /// Level key to the descriptor text shown for that level.
    #[serde(default)]
    pub levels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub id: String,
    pub name: String,
    pub levels: Vec<RubricLevel>,
    pub criteria: Vec<Criterion>,
    /// Assignment total that overrides the summed criterion points.
    #[serde(default)]
    pub total_points: Option<f64>,
}

impl Rubric {
    pub fn level(&self, key: &str) -> Option<&RubricLevel> {
        self.levels.iter().find(|level| level.level == key)
    }

    pub fn max_score(&self) -> f64 {
        self.total_points
            .unwrap_or_else(|| self.criteria.iter().map(|criterion| criterion.max_points).sum())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RubricError {
    #[error("rubric {rubric} has no criterion '{criterion}'")]
    UnknownCriterion { rubric: String, criterion: String },
    #[error("criterion '{criterion}' selected unknown level '{level}'")]
    UnknownLevel { criterion: String, level: String },
    #[error("criterion '{criterion}' has invalid max points {max_points}")]
    InvalidMaxPoints { criterion: String, max_points: f64 },
    #[error("level '{level}' multiplier {multiplier} must be between 0 and 1")]
    InvalidMultiplier { level: String, multiplier: f64 },
}

/// Points earned on one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScore {
    pub criterion_id: String,
    pub level: String,
    pub achieved: f64,
    pub max_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricScore {
    pub rubric_id: String,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub criteria: Vec<CriterionScore>,
}

/// Unrounded rubric points. Grading works from these; `RubricScore` is the rounded view.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RubricTally {
    pub(crate) criteria: Vec<CriterionScore>,
    pub(crate) earned: f64,
    pub(crate) possible: f64,
}

impl RubricTally {
    pub(crate) fn percentage(&self) -> f64 {
        if self.possible > 0.0 {
            self.earned / self.possible * 100.0
        } else {
            0.0
        }
    }

    pub(crate) fn to_score(&self, rubric_id: &str) -> RubricScore {
        RubricScore {
            rubric_id: rubric_id.to_string(),
            total_score: round_score(self.earned),
            max_score: round_score(self.possible),
            percentage: round_percentage(self.percentage()),
            criteria: self.criteria.clone(),
        }
    }
}

/// Score `selections` (criterion id to level key) against `rubric`.
///
/// Criteria without a selection earn nothing but still count towards the maximum.
/// A rubric whose maximum is zero scores 0%.
pub fn score_rubric(
    rubric: &Rubric,
    selections: &BTreeMap<String, String>,
) -> Result<RubricScore, RubricError> {
    Ok(tally_rubric(rubric, selections)?.to_score(&rubric.id))
}

pub(crate) fn tally_rubric(
    rubric: &Rubric,
    selections: &BTreeMap<String, String>,
) -> Result<RubricTally, RubricError> {
    for level in &rubric.levels {
        if !level.multiplier.is_finite() || !(0.0..=1.0).contains(&level.multiplier) {
            return Err(RubricError::InvalidMultiplier {
                level: level.level.clone(),
                multiplier: level.multiplier,
            });
        }
    }

    if let Some(unknown) = selections
        .keys()
        .find(|id| !rubric.criteria.iter().any(|criterion| &criterion.id == *id))
    {
        return Err(RubricError::UnknownCriterion {
            rubric: rubric.id.clone(),
            criterion: unknown.clone(),
        });
    }

    let mut criteria = Vec::new();
    let mut total_score = 0.0;
    for criterion in &rubric.criteria {
        if !criterion.max_points.is_finite() || criterion.max_points < 0.0 {
            return Err(RubricError::InvalidMaxPoints {
                criterion: criterion.id.clone(),
                max_points: criterion.max_points,
            });
        }

        let Some(level_key) = selections.get(&criterion.id) else {
            continue;
        };
        let level = rubric
            .level(level_key)
            .ok_or_else(|| RubricError::UnknownLevel {
                criterion: criterion.id.clone(),
                level: level_key.clone(),
            })?;

        let achieved = criterion.max_points * level.multiplier;
        total_score += achieved;
        criteria.push(CriterionScore {
            criterion_id: criterion.id.clone(),
            level: level.level.clone(),
            achieved: round_score(achieved),
            max_points: criterion.max_points,
        });
    }

    Ok(RubricTally {
        criteria,
        earned: total_score,
        possible: rubric.max_score(),
    })
}

/// One assignment in a weighted final grade. `percentage` is `None` until graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedItem {
    pub assignment_id: String,
    pub weight: f64,
    #[serde(default)]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("assignment '{assignment_id}' has invalid weight {weight}")]
    InvalidWeight { assignment_id: String, weight: f64 },
    #[error("assignment '{assignment_id}' has percentage {percentage} outside 0 to 100")]
    InvalidPercentage {
        assignment_id: String,
        percentage: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedAggregate {
    pub final_percentage: f64,
    pub weighted_sum: f64,
    pub total_weight: f64,
    pub graded_items: usize,
    pub ungraded_items: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WeightedTally {
    pub(crate) weighted_sum: f64,
    pub(crate) total_weight: f64,
    pub(crate) graded_items: usize,
    pub(crate) ungraded_items: usize,
}

impl WeightedTally {
    pub(crate) fn percentage(&self) -> f64 {
        if self.total_weight > 0.0 {
            self.weighted_sum / self.total_weight * 100.0
        } else {
            0.0
        }
    }

    pub(crate) fn to_aggregate(&self) -> WeightedAggregate {
        WeightedAggregate {
            final_percentage: round_percentage(self.percentage()),
            weighted_sum: round_percentage(self.weighted_sum),
            total_weight: self.total_weight,
            graded_items: self.graded_items,
            ungraded_items: self.ungraded_items,
        }
    }
}

/// Weighted mean of graded items; ungraded items are left out of both sums.
pub fn aggregate_weighted(items: &[WeightedItem]) -> Result<WeightedAggregate, AggregationError> {
    Ok(tally_weighted(items)?.to_aggregate())
}

pub(crate) fn tally_weighted(items: &[WeightedItem]) -> Result<WeightedTally, AggregationError> {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut graded_items = 0;

    for item in items {
        if !item.weight.is_finite() || item.weight < 0.0 {
            return Err(AggregationError::InvalidWeight {
                assignment_id: item.assignment_id.clone(),
                weight: item.weight,
            });
        }

        let Some(percentage) = item.percentage else {
            continue;
        };
        if !(0.0..=100.0).contains(&percentage) {
            return Err(AggregationError::InvalidPercentage {
                assignment_id: item.assignment_id.clone(),
                percentage,
            });
        }

        weighted_sum += percentage * item.weight / 100.0;
        total_weight += item.weight;
        graded_items += 1;
    }

    Ok(WeightedTally {
        weighted_sum,
        total_weight,
        graded_items,
        ungraded_items: items.len() - graded_items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(key: &str, multiplier: f64) -> RubricLevel {
        RubricLevel {
            level: key.to_string(),
            name: key.to_string(),
            multiplier,
            color: String::new(),
        }
    }

    fn criterion(id: &str, max_points: f64) -> Criterion {
        Criterion {
            id: id.to_string(),
            name: id.to_string(),
            max_points,
            levels: BTreeMap::new(),
        }
    }

    fn two_criteria_rubric() -> Rubric {
        Rubric {
            id: "essay".to_string(),
            name: "Essay".to_string(),
            levels: vec![level("proficient", 0.8), level("developing", 0.6)],
            criteria: vec![criterion("thesis", 50.0), criterion("evidence", 50.0)],
            total_points: None,
        }
    }

    fn select(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(criterion, level)| (criterion.to_string(), level.to_string()))
            .collect()
    }

    #[test]
    fn rubric_scores_selected_levels() {
        let score = score_rubric(
            &two_criteria_rubric(),
            &select(&[("thesis", "proficient"), ("evidence", "developing")]),
        )
        .expect("rubric scores");

        assert_eq!(score.total_score, 70.0);
        assert_eq!(score.max_score, 100.0);
        assert_eq!(score.percentage, 70.0);
        assert_eq!(score.criteria.len(), 2);
    }

    #[test]
    fn unselected_criteria_still_count_towards_maximum() {
        let score = score_rubric(&two_criteria_rubric(), &select(&[("thesis", "proficient")]))
            .expect("rubric scores");

        assert_eq!(score.total_score, 40.0);
        assert_eq!(score.max_score, 100.0);
        assert_eq!(score.percentage, 40.0);
    }

    #[test]
    fn external_total_overrides_criterion_sum() {
        let mut rubric = two_criteria_rubric();
        rubric.total_points = Some(80.0);

        let score = score_rubric(
            &rubric,
            &select(&[("thesis", "proficient"), ("evidence", "developing")]),
        )
        .expect("rubric scores");

        assert_eq!(score.max_score, 80.0);
        assert_eq!(score.percentage, 87.5);
    }

    #[test]
    fn zero_point_rubric_scores_zero_percent() {
        let mut rubric = two_criteria_rubric();
        for criterion in &mut rubric.criteria {
            criterion.max_points = 0.0;
        }

        let score = score_rubric(&rubric, &select(&[("thesis", "proficient")]))
            .expect("rubric scores");

        assert_eq!(score.percentage, 0.0);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let result = score_rubric(&two_criteria_rubric(), &select(&[("thesis", "exemplary")]));

        assert_eq!(
            result,
            Err(RubricError::UnknownLevel {
                criterion: "thesis".to_string(),
                level: "exemplary".to_string(),
            })
        );
    }

    #[test]
    fn unknown_criterion_is_rejected() {
        let result = score_rubric(&two_criteria_rubric(), &select(&[("style", "proficient")]));

        assert!(matches!(result, Err(RubricError::UnknownCriterion { .. })));
    }

    #[test]
    fn weighted_mean_ignores_ungraded_items() {
        let items = vec![
            WeightedItem {
                assignment_id: "quiz".to_string(),
                weight: 20.0,
                percentage: Some(90.0),
            },
            WeightedItem {
                assignment_id: "midterm".to_string(),
                weight: 30.0,
                percentage: Some(70.0),
            },
            WeightedItem {
                assignment_id: "final".to_string(),
                weight: 50.0,
                percentage: None,
            },
        ];

        let aggregate = aggregate_weighted(&items).expect("aggregates");

        assert_eq!(aggregate.total_weight, 50.0);
        assert_eq!(aggregate.weighted_sum, 39.0);
        assert_eq!(aggregate.final_percentage, 78.0);
        assert_eq!(aggregate.graded_items, 2);
        assert_eq!(aggregate.ungraded_items, 1);
    }

    #[test]
    fn weighted_mean_rounds_to_two_decimals() {
        let items = vec![
            WeightedItem {
                assignment_id: "a".to_string(),
                weight: 1.0,
                percentage: Some(100.0),
            },
            WeightedItem {
                assignment_id: "b".to_string(),
                weight: 2.0,
                percentage: Some(0.0),
            },
        ];

        let aggregate = aggregate_weighted(&items).expect("aggregates");

        assert_eq!(aggregate.final_percentage, 33.33);
    }

    #[test]
    fn nothing_graded_yields_zero() {
        let items = vec![WeightedItem {
            assignment_id: "final".to_string(),
            weight: 100.0,
            percentage: None,
        }];

        let aggregate = aggregate_weighted(&items).expect("aggregates");
        assert_eq!(aggregate.final_percentage, 0.0);
        assert_eq!(aggregate.total_weight, 0.0);

        let empty = aggregate_weighted(&[]).expect("aggregates");
        assert_eq!(empty.final_percentage, 0.0);
    }

    #[test]
    fn negative_weight_is_rejected() {
        let items = vec![WeightedItem {
            assignment_id: "quiz".to_string(),
            weight: -5.0,
            percentage: Some(50.0),
        }];

        assert!(matches!(
            aggregate_weighted(&items),
            Err(AggregationError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn clamp_pulls_values_into_range() {
        assert_eq!(clamp_percentage(100.0000001), 100.0);
        assert_eq!(clamp_percentage(-3.0), 0.0);
        assert_eq!(clamp_percentage(f64::NAN), 0.0);
        assert_eq!(clamp_percentage(42.5), 42.5);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round_score(62.96), 63.0);
        assert_eq!(round_score(12.34), 12.3);
        assert_eq!(round_percentage(66.666), 66.67);
    }
}

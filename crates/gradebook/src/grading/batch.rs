//! Batch grading of a CSV score sheet.
//!
//! Expected headers: `Student ID`, `Percentage`, and optionally `Late Level` and
//! `Program Type`. Rows that fail to grade are reported individually; one bad row never
//! aborts the batch.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use super::domain::{GradeResult, PolicyId};
use super::late::ON_TIME_LEVEL;
use super::service::GradingService;
use super::store::PolicyStore;

#[derive(Debug)]
pub enum BatchImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for BatchImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchImportError::Io(err) => write!(f, "failed to read score sheet: {}", err),
            BatchImportError::Csv(err) => write!(f, "invalid score sheet CSV: {}", err),
        }
    }
}

impl std::error::Error for BatchImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchImportError::Io(err) => Some(err),
            BatchImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for BatchImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for BatchImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Defaults applied to rows that leave a column blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default)]
    pub program_type: Option<String>,
    #[serde(default)]
    pub policy_id: Option<PolicyId>,
    #[serde(default)]
    pub late_policy_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGradeRow {
    pub line: usize,
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub late_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub rows: Vec<BatchGradeRow>,
    pub graded: usize,
    pub failed: usize,
    pub passing: usize,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    #[serde(rename = "Student ID")]
    student_id: String,
    #[serde(rename = "Percentage")]
    percentage: String,
    #[serde(rename = "Late Level", default, deserialize_with = "empty_string_as_none")]
    late_level: Option<String>,
    #[serde(rename = "Program Type", default, deserialize_with = "empty_string_as_none")]
    program_type: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

pub struct BatchGrader;

impl BatchGrader {
    pub fn from_path<P, S>(
        path: P,
        service: &GradingService<S>,
        options: &BatchOptions,
    ) -> Result<BatchReport, BatchImportError>
    where
        P: AsRef<Path>,
        S: PolicyStore + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, service, options)
    }

    pub fn from_reader<R, S>(
        reader: R,
        service: &GradingService<S>,
        options: &BatchOptions,
    ) -> Result<BatchReport, BatchImportError>
    where
        R: Read,
        S: PolicyStore + 'static,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (index, record) in csv_reader.deserialize::<ScoreRow>().enumerate() {
            // Header is line 1.
            let line = index + 2;
            let row = record?;
            rows.push(grade_row(line, row, service, options));
        }

        let graded = rows.iter().filter(|row| row.grade.is_some()).count();
        let passing = rows
            .iter()
            .filter_map(|row| row.grade.as_ref())
            .filter(|grade| grade.passing_grade)
            .count();

        Ok(BatchReport {
            failed: rows.len() - graded,
            graded,
            passing,
            rows,
        })
    }
}

fn grade_row<S>(
    line: usize,
    row: ScoreRow,
    service: &GradingService<S>,
    options: &BatchOptions,
) -> BatchGradeRow
where
    S: PolicyStore + 'static,
{
    let program_type = row.program_type.as_deref().or(options.program_type.as_deref());
    let raw_percentage = row.percentage.parse::<f64>().ok();

    let outcome = match raw_percentage {
        Some(percentage) => service
            .apply_late_penalty(
                percentage,
                row.late_level.as_deref().unwrap_or(ON_TIME_LEVEL),
                options.late_policy_id.as_deref(),
            )
            .and_then(|late| {
                service.grade_percentage(
                    late.level_applied.apply(percentage),
                    options.policy_id.as_ref(),
                    program_type,
                )
            })
            .map_err(|err| err.to_string()),
        None => Err(format!("percentage '{}' is not a number", row.percentage)),
    };

    let (grade, error) = match outcome {
        Ok(grade) => (Some(grade), None),
        Err(err) => (None, Some(err)),
    };

    BatchGradeRow {
        line,
        student_id: row.student_id,
        raw_percentage,
        late_level: row.late_level,
        grade,
        error,
    }
}

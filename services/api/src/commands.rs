use crate::infra::open_service;
use clap::Args;
use gradebook::config::AppConfig;
use gradebook::error::AppError;
use gradebook::grading::{
    BatchGrader, BatchOptions, BatchReport, GradeResult, Policy, PolicyFilter, PolicyId,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct GradeArgs {
    /// Score sheet with `Student ID` and `Percentage` columns
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Program type used for rows without a `Program Type` column
    #[arg(long)]
    pub(crate) program_type: Option<String>,
    /// Grade every row against this policy id
    #[arg(long)]
    pub(crate) policy_id: Option<String>,
    /// Late policy applied to `Late Level` values (defaults to the standard table)
    #[arg(long)]
    pub(crate) late_policy: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ListArgs {
    /// Only list policies that apply to this program type
    #[arg(long)]
    pub(crate) program_type: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct CalculateArgs {
    /// Percentage between 0 and 100
    #[arg(allow_negative_numbers = true)]
    pub(crate) percentage: f64,
    #[arg(long)]
    pub(crate) program_type: Option<String>,
    #[arg(long)]
    pub(crate) policy_id: Option<String>,
}

pub(crate) fn run_grade(args: GradeArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = open_service(&config.storage)?;

    let options = BatchOptions {
        program_type: args.program_type,
        policy_id: args.policy_id.map(PolicyId::new),
        late_policy_id: args.late_policy,
    };
    let report = BatchGrader::from_path(&args.csv, &service, &options)?;

    println!("Grades for {}", args.csv.display());
    for line in batch_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn run_list_policies(args: ListArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = open_service(&config.storage)?;

    let policies = service.list_policies(&PolicyFilter {
        program_type: args.program_type,
        is_active: None,
    });
    if policies.is_empty() {
        println!("No grading policies match.");
    }
    for line in policy_lines(&policies) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn run_calculate(args: CalculateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = open_service(&config.storage)?;

    let policy_id = args.policy_id.map(PolicyId::new);
    let grade = service.calculate_grade(
        args.percentage,
        policy_id.as_ref(),
        args.program_type.as_deref(),
    )?;
    println!("{}", grade_line(&grade));
    Ok(())
}

fn grade_line(grade: &GradeResult) -> String {
    format!(
        "{:.2}% -> {} ({:.1} GPA, {}) under {}",
        grade.percentage,
        grade.letter,
        grade.gpa_points,
        if grade.passing_grade { "pass" } else { "fail" },
        grade.policy_id
    )
}

fn policy_lines(policies: &[Policy]) -> Vec<String> {
    policies
        .iter()
        .map(|policy| {
            let mut flags = Vec::new();
            if policy.is_default {
                flags.push("default");
            }
            if !policy.is_active {
                flags.push("inactive");
            }
            let passing = policy
                .passing_threshold()
                .map(|threshold| format!("passes from {threshold:.0}%"))
                .unwrap_or_else(|| "no passing grade".to_string());
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            format!(
                "- {} v{}: {}{} | {} grades, {} | programs: {}",
                policy.id,
                policy.version,
                policy.name,
                flags,
                policy.grade_scale.len(),
                passing,
                policy.program_types.join(", ")
            )
        })
        .collect()
}

fn batch_lines(report: &BatchReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .rows
        .iter()
        .map(|row| match (&row.grade, &row.error) {
            (Some(grade), _) => format!(
                "  line {:>3} {:<12} {}",
                row.line,
                row.student_id,
                grade_line(grade)
            ),
            (None, Some(error)) => {
                format!("  line {:>3} {:<12} error: {}", row.line, row.student_id, error)
            }
            (None, None) => format!("  line {:>3} {:<12} not graded", row.line, row.student_id),
        })
        .collect();
    lines.push(format!(
        "{} graded | {} passing | {} failed",
        report.graded, report.passing, report.failed
    ));
    lines
}

use std::io::{Cursor, Write};

use super::common::*;
use crate::grading::batch::{BatchGrader, BatchImportError, BatchOptions};
use crate::grading::domain::PolicyId;
use crate::grading::standard::{APPRENTICESHIP_POLICY_ID, GRADUATE_POLICY_ID};

const SCORE_SHEET: &str = "\
Student ID,Percentage,Late Level,Program Type
s-001,92,,
s-002,70,level1,
s-003,65,,apprenticeship
s-004,not graded,,
s-005,120,,
";

#[test]
fn grades_each_row_and_reports_failures_individually() {
    let (service, _) = build_service();

    let report = BatchGrader::from_reader(
        Cursor::new(SCORE_SHEET),
        &service,
        &BatchOptions::default(),
    )
    .expect("sheet parses");

    assert_eq!(report.rows.len(), 5);
    assert_eq!(report.graded, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.passing, 2);

    let letters: Vec<_> = report
        .rows
        .iter()
        .map(|row| row.grade.as_ref().map(|grade| grade.letter.as_str()))
        .collect();
    assert_eq!(letters, vec![Some("A+"), Some("C"), Some("F"), None, None]);

    let third = &report.rows[2];
    assert_eq!(
        third.grade.as_ref().map(|grade| &grade.policy_id),
        Some(&PolicyId::from(APPRENTICESHIP_POLICY_ID))
    );

    let unparsed = &report.rows[3];
    assert_eq!(unparsed.line, 5);
    assert!(unparsed.raw_percentage.is_none());
    assert!(unparsed
        .error
        .as_deref()
        .is_some_and(|error| error.contains("not graded")));

    assert!(report.rows[4].error.is_some());
}

#[test]
fn options_supply_defaults_for_blank_columns() {
    let (service, _) = build_service();
    let options = BatchOptions {
        program_type: Some("masters".to_string()),
        ..BatchOptions::default()
    };

    let report = BatchGrader::from_reader(Cursor::new(SCORE_SHEET), &service, &options)
        .expect("sheet parses");

    let first = report.rows[0].grade.as_ref().expect("graded");
    assert_eq!(first.policy_id, PolicyId::from(GRADUATE_POLICY_ID));
    let third = report.rows[2].grade.as_ref().expect("graded");
    assert_eq!(third.policy_id, PolicyId::from(APPRENTICESHIP_POLICY_ID));
}

#[test]
fn reads_score_sheets_from_disk() {
    let (service, _) = build_service();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"Student ID,Percentage\ns-100,55\n")
        .expect("write sheet");

    let report = BatchGrader::from_path(file.path(), &service, &BatchOptions::default())
        .expect("sheet parses");

    assert_eq!(report.graded, 1);
    let grade = report.rows[0].grade.as_ref().expect("graded");
    assert_eq!(grade.letter, "D");
}

#[test]
fn missing_required_columns_fail_the_import() {
    let (service, _) = build_service();

    let result = BatchGrader::from_reader(
        Cursor::new("Learner,Score\ns-1,80\n"),
        &service,
        &BatchOptions::default(),
    );

    assert!(matches!(result, Err(BatchImportError::Csv(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let (service, _) = build_service();
    let dir = tempfile::tempdir().expect("tempdir");

    let result = BatchGrader::from_path(
        dir.path().join("absent.csv"),
        &service,
        &BatchOptions::default(),
    );

    assert!(matches!(result, Err(BatchImportError::Io(_))));
}

#[test]
fn boundary_rows_grade_like_the_calculator() {
    let (service, _) = build_service();
    let sheet = "\
Student ID,Percentage,Late Level,Program Type
s-1,89.99,,degree
s-2,49.96,,degree
s-3,99.99,level1,degree
";

    let report = BatchGrader::from_reader(Cursor::new(sheet), &service, &BatchOptions::default())
        .expect("sheet parses");

    let graded: Vec<_> = report
        .rows
        .iter()
        .map(|row| {
            let grade = row.grade.as_ref().expect("graded");
            (grade.letter.as_str(), grade.passing_grade, grade.percentage)
        })
        .collect();
    assert_eq!(
        graded,
        vec![("A", true, 89.99), ("F", false, 49.96), ("A", true, 89.99)]
    );

    let direct = service
        .calculate_grade(49.96, None, Some("degree"))
        .expect("grade");
    assert_eq!(report.rows[1].grade.as_ref(), Some(&direct));
    assert_eq!(report.passing, 2);
}

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use super::common::*;
use crate::grading::registry::PolicyRegistry;
use crate::grading::router::{calculate_grade_handler, create_policy_handler, CalculateGradeRequest};
use crate::grading::service::GradingService;
use crate::grading::standard::STANDARD_POLICY_ID;
use crate::grading::validation::SCALE_NOT_CONTIGUOUS;

#[tokio::test]
async fn list_route_returns_built_in_policies() {
    let (service, _) = build_service();
    let response = send(router_with_service(service), Method::GET, "/policies", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn list_route_filters_by_program_type() {
    let (service, _) = build_service();
    let response = send(
        router_with_service(service),
        Method::GET,
        "/policies?programType=trades&isActive=true",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let ids: Vec<_> = payload
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|policy| policy.get("id").and_then(Value::as_str))
        .collect();
    assert_eq!(ids, vec!["apprenticeship-2024"]);
}

#[tokio::test]
async fn create_route_returns_created_policy() {
    let (service, _) = build_service();
    let body = serde_json::to_value(draft("Bootcamp", &["bootcamp"])).expect("draft json");

    let response = send(router_with_service(service), Method::POST, "/policies", Some(body)).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("id").and_then(Value::as_str), Some("policy-0001"));
    assert_eq!(payload.get("version").and_then(Value::as_u64), Some(1));
}

#[tokio::test]
async fn create_route_reports_every_validation_error() {
    let (service, _) = build_service();
    let mut invalid = gapped_draft();
    invalid.name = "  ".to_string();
    let body = serde_json::to_value(invalid).expect("draft json");

    let response = send(router_with_service(service), Method::POST, "/policies", Some(body)).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    let errors: Vec<_> = payload
        .get("errors")
        .and_then(Value::as_array)
        .expect("errors array")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(errors.contains(&"Policy name is required"));
    assert!(errors.contains(&SCALE_NOT_CONTIGUOUS));
}

#[tokio::test]
async fn update_route_detects_stale_versions() {
    let (service, _) = build_service();
    let router = router_with_service(service);
    let uri = format!("/policies/{STANDARD_POLICY_ID}");

    let first = send(
        router.clone(),
        Method::PUT,
        &uri,
        Some(json!({ "description": "Revised", "expectedVersion": 1 })),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(
        router,
        Method::PUT,
        &uri,
        Some(json!({ "description": "Stale", "expectedVersion": 1 })),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let payload = read_json_body(second).await;
    assert_eq!(payload.get("currentVersion").and_then(Value::as_u64), Some(2));
}

#[tokio::test]
async fn missing_policy_is_not_found() {
    let (service, _) = build_service();
    let router = router_with_service(service);

    let response = send(router.clone(), Method::GET, "/policies/policy-0404", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(router, Method::DELETE, "/policies/policy-0404", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_route_returns_no_content() {
    let (service, _) = build_service();
    let router = router_with_service(service);

    let response = send(
        router.clone(),
        Method::DELETE,
        &format!("/policies/{STANDARD_POLICY_ID}"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(router, Method::GET, "/policies", None).await;
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn calculate_grade_route_maps_percentages() {
    let (service, _) = build_service();
    let response = send(
        router_with_service(service),
        Method::POST,
        "/policies/calculate-grade",
        Some(json!({ "percentage": 92.0, "programType": "degree" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("letter").and_then(Value::as_str), Some("A+"));
    assert_eq!(payload.get("gpaPoints").and_then(Value::as_f64), Some(4.0));
    assert_eq!(
        payload.get("policyId").and_then(Value::as_str),
        Some(STANDARD_POLICY_ID)
    );
}

#[tokio::test]
async fn calculate_grade_handler_rejects_out_of_range() {
    let (service, _) = build_service();

    let response = calculate_grade_handler(
        State(Arc::new(service)),
        Json(CalculateGradeRequest {
            percentage: 120.0,
            policy_id: None,
            program_type: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_handler_returns_internal_error_when_store_fails() {
    let service = Arc::new(GradingService::new(
        PolicyRegistry::with_built_ins(),
        Arc::new(ReadOnlyStore),
    ));

    let response =
        create_policy_handler::<ReadOnlyStore>(State(service), Json(draft("Bootcamp", &["bootcamp"])))
            .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn resolve_route_reports_source() {
    let (service, _) = build_service();
    let response = send(
        router_with_service(service),
        Method::POST,
        "/policies/resolve",
        Some(json!({ "programType": "masters" })),
    )
    .await;

    let payload = read_json_body(response).await;
    assert_eq!(
        payload.pointer("/policy/id").and_then(Value::as_str),
        Some("graduate-2024")
    );
    assert_eq!(
        payload.get("source").and_then(Value::as_str),
        Some("program_type")
    );
}

#[tokio::test]
async fn late_routes_list_and_apply_penalties() {
    let (service, _) = build_service();
    let router = router_with_service(service);

    let response = send(router.clone(), Method::GET, "/late-policies", None).await;
    let payload = read_json_body(response).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));

    let response = send(
        router.clone(),
        Method::POST,
        "/late-policies/apply",
        Some(json!({ "rawScore": 70.0, "levelKey": "level1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("finalScore").and_then(Value::as_f64), Some(63.0));
    assert_eq!(
        payload.pointer("/levelApplied/key").and_then(Value::as_str),
        Some("level1")
    );

    let response = send(router, Method::GET, "/late-policies/lenient", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn final_grade_route_rejects_negative_weights() {
    let (service, _) = build_service();
    let response = send(
        router_with_service(service),
        Method::POST,
        "/grading/final-grade",
        Some(json!({
            "items": [
                { "assignmentId": "essay", "weight": -1.0, "percentage": 80.0 }
            ]
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submission_route_grades_rubric_submissions() {
    let (service, _) = build_service();
    let body = json!({
        "rubric": essay_rubric(),
        "record": essay_record("none"),
        "programType": "degree"
    });

    let response = send(
        router_with_service(service),
        Method::POST,
        "/grading/submission",
        Some(body),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("percentage").and_then(Value::as_f64), Some(70.0));
    assert_eq!(payload.pointer("/grade/letter").and_then(Value::as_str), Some("B-"));
}

#[tokio::test]
async fn batch_route_grades_csv_payloads() {
    let (service, _) = build_service();
    let csv = "Student ID,Percentage,Late Level\ns-1,88,\ns-2,abc,\n";

    let response = send(
        router_with_service(service),
        Method::POST,
        "/grading/batch",
        Some(json!({ "csv": csv, "programType": "degree" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("graded").and_then(Value::as_u64), Some(1));
    assert_eq!(payload.get("failed").and_then(Value::as_u64), Some(1));
    assert_eq!(
        payload.pointer("/rows/0/grade/letter").and_then(Value::as_str),
        Some("A")
    );
}

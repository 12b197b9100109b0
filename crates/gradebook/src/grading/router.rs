use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::aggregate::{Rubric, WeightedItem};
use super::batch::{BatchGrader, BatchImportError, BatchOptions};
use super::domain::{PolicyDraft, PolicyFilter, PolicyId, PolicyPatch};
use super::late::LatePolicy;
use super::registry::RegistryError;
use super::service::{GradingService, GradingServiceError, SubmissionRequest};
use super::store::PolicyStore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalculateGradeRequest {
    pub(crate) percentage: f64,
    #[serde(default)]
    pub(crate) policy_id: Option<PolicyId>,
    #[serde(default)]
    pub(crate) program_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResolveRequest {
    #[serde(default)]
    pub(crate) program_type: Option<String>,
    #[serde(default)]
    pub(crate) policy_id: Option<PolicyId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApplyLateRequest {
    pub(crate) raw_score: f64,
    #[serde(default = "on_time")]
    pub(crate) level_key: String,
    #[serde(default)]
    pub(crate) late_policy_id: Option<String>,
}

fn on_time() -> String {
    super::late::ON_TIME_LEVEL.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RubricScoreRequest {
    pub(crate) rubric: Rubric,
    #[serde(default)]
    pub(crate) selections: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FinalGradeRequest {
    pub(crate) items: Vec<WeightedItem>,
    #[serde(default)]
    pub(crate) policy_id: Option<PolicyId>,
    #[serde(default)]
    pub(crate) program_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchRequest {
    pub(crate) csv: String,
    #[serde(flatten)]
    pub(crate) options: BatchOptions,
}

/// Router builder exposing the grading policy endpoints.
pub fn grading_router<S>(service: Arc<GradingService<S>>) -> Router
where
    S: PolicyStore + 'static,
{
    Router::new()
        .route(
            "/policies",
            get(list_policies_handler::<S>).post(create_policy_handler::<S>),
        )
        .route(
            "/policies/:policy_id",
            get(get_policy_handler::<S>)
                .put(update_policy_handler::<S>)
                .delete(delete_policy_handler::<S>),
        )
        .route(
            "/policies/calculate-grade",
            post(calculate_grade_handler::<S>),
        )
        .route("/policies/resolve", post(resolve_policy_handler::<S>))
        .route("/late-policies", get(list_late_policies_handler::<S>))
        .route(
            "/late-policies/:late_policy_id",
            get(get_late_policy_handler::<S>).put(save_late_policy_handler::<S>),
        )
        .route("/late-policies/apply", post(apply_late_handler::<S>))
        .route("/grading/rubric-score", post(rubric_score_handler::<S>))
        .route("/grading/final-grade", post(final_grade_handler::<S>))
        .route("/grading/submission", post(submission_handler::<S>))
        .route("/grading/batch", post(batch_handler::<S>))
        .with_state(service)
}

pub(crate) fn error_response(error: GradingServiceError) -> Response {
    let (status, payload) = match &error {
        GradingServiceError::Registry(RegistryError::Validation(validation))
        | GradingServiceError::Validation(validation) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "validation failed", "errors": validation.errors }),
        ),
        GradingServiceError::Registry(RegistryError::NotFound(_))
        | GradingServiceError::LatePolicyNotFound(_) => {
            (StatusCode::NOT_FOUND, json!({ "error": error.to_string() }))
        }
        GradingServiceError::Registry(RegistryError::VersionConflict { actual, .. }) => (
            StatusCode::CONFLICT,
            json!({ "error": error.to_string(), "currentVersion": actual }),
        ),
        GradingServiceError::Calculation(super::calculator::CalculationError::Range(_))
        | GradingServiceError::Rubric(_)
        | GradingServiceError::Aggregation(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": error.to_string() }))
        }
        GradingServiceError::Calculation(_)
        | GradingServiceError::Resolution(_)
        | GradingServiceError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": error.to_string() }),
        ),
    };
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    outcome: Result<T, GradingServiceError>,
) -> Response {
    match outcome {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_policies_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Query(filter): Query<PolicyFilter>,
) -> Response
where
    S: PolicyStore + 'static,
{
    (StatusCode::OK, Json(service.list_policies(&filter))).into_response()
}

pub(crate) async fn get_policy_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Path(policy_id): Path<String>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(StatusCode::OK, service.get_policy(&PolicyId(policy_id)))
}

pub(crate) async fn create_policy_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(draft): Json<PolicyDraft>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(StatusCode::CREATED, service.create_policy(draft))
}

pub(crate) async fn update_policy_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Path(policy_id): Path<String>,
    Json(patch): Json<PolicyPatch>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(
        StatusCode::OK,
        service.update_policy(&PolicyId(policy_id), patch),
    )
}

pub(crate) async fn delete_policy_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Path(policy_id): Path<String>,
) -> Response
where
    S: PolicyStore + 'static,
{
    match service.delete_policy(&PolicyId(policy_id)) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn calculate_grade_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(request): Json<CalculateGradeRequest>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(
        StatusCode::OK,
        service.calculate_grade(
            request.percentage,
            request.policy_id.as_ref(),
            request.program_type.as_deref(),
        ),
    )
}

pub(crate) async fn resolve_policy_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(request): Json<ResolveRequest>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(
        StatusCode::OK,
        service.resolve(request.program_type.as_deref(), request.policy_id.as_ref()),
    )
}

pub(crate) async fn list_late_policies_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
) -> Response
where
    S: PolicyStore + 'static,
{
    (StatusCode::OK, Json(service.late_policies())).into_response()
}

pub(crate) async fn get_late_policy_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Path(late_policy_id): Path<String>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(StatusCode::OK, service.late_policy(&late_policy_id))
}

pub(crate) async fn save_late_policy_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Path(late_policy_id): Path<String>,
    Json(mut policy): Json<LatePolicy>,
) -> Response
where
    S: PolicyStore + 'static,
{
    policy.id = late_policy_id;
    respond(StatusCode::OK, service.save_late_policy(policy))
}

pub(crate) async fn apply_late_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(request): Json<ApplyLateRequest>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(
        StatusCode::OK,
        service.apply_late_penalty(
            request.raw_score,
            &request.level_key,
            request.late_policy_id.as_deref(),
        ),
    )
}

pub(crate) async fn rubric_score_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(request): Json<RubricScoreRequest>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(
        StatusCode::OK,
        service.score_rubric(&request.rubric, &request.selections),
    )
}

pub(crate) async fn final_grade_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(request): Json<FinalGradeRequest>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(
        StatusCode::OK,
        service.final_grade(
            &request.items,
            request.policy_id.as_ref(),
            request.program_type.as_deref(),
        ),
    )
}

pub(crate) async fn submission_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(request): Json<SubmissionRequest>,
) -> Response
where
    S: PolicyStore + 'static,
{
    respond(StatusCode::OK, service.grade_submission(&request))
}

pub(crate) async fn batch_handler<S>(
    State(service): State<Arc<GradingService<S>>>,
    Json(request): Json<BatchRequest>,
) -> Response
where
    S: PolicyStore + 'static,
{
    let reader = Cursor::new(request.csv.into_bytes());
    match BatchGrader::from_reader(reader, service.as_ref(), &request.options) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => {
            let status = match error {
                BatchImportError::Csv(_) => StatusCode::BAD_REQUEST,
                BatchImportError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "error": error.to_string() }))).into_response()
        }
    }
}

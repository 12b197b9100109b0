use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use crate::grading::aggregate::{Criterion, Rubric, RubricLevel};
use crate::grading::domain::{GradeScaleEntry, GradingRecord, PolicyDraft};
use crate::grading::registry::PolicyRegistry;
use crate::grading::store::{InMemoryPolicyStore, PolicyStore, StoreError};
use crate::grading::{grading_router, GradingService};

pub(super) fn build_service() -> (GradingService<InMemoryPolicyStore>, Arc<InMemoryPolicyStore>) {
    let store = Arc::new(InMemoryPolicyStore::default());
    let service = GradingService::new(PolicyRegistry::with_built_ins(), store.clone());
    (service, store)
}

pub(super) fn router_with_service(service: GradingService<InMemoryPolicyStore>) -> Router {
    grading_router(Arc::new(service))
}

/// Two-band scale: pass from 50, fail below.
pub(super) fn pass_fail_scale() -> Vec<GradeScaleEntry> {
    vec![
        GradeScaleEntry::new("P", 1.0, 50.0, 100.0, true),
        GradeScaleEntry::new("F", 0.0, 0.0, 49.0, false),
    ]
}

pub(super) fn draft(name: &str, program_types: &[&str]) -> PolicyDraft {
    PolicyDraft {
        name: name.to_string(),
        description: format!("{name} for tests"),
        program_types: program_types.iter().map(|value| value.to_string()).collect(),
        grade_scale: pass_fail_scale(),
        is_active: true,
        is_default: false,
    }
}

pub(super) fn gapped_draft() -> PolicyDraft {
    let mut draft = draft("Gapped", &["degree"]);
    draft.grade_scale = vec![
        GradeScaleEntry::new("P", 1.0, 60.0, 100.0, true),
        GradeScaleEntry::new("F", 0.0, 0.0, 49.0, false),
    ];
    draft
}

pub(super) fn essay_rubric() -> Rubric {
    Rubric {
        id: "essay".to_string(),
        name: "Essay Rubric".to_string(),
        levels: vec![
            RubricLevel {
                level: "exemplary".to_string(),
                name: "Exemplary".to_string(),
                multiplier: 1.0,
                color: "#2e7d32".to_string(),
            },
            RubricLevel {
                level: "proficient".to_string(),
                name: "Proficient".to_string(),
                multiplier: 0.8,
                color: "#1565c0".to_string(),
            },
            RubricLevel {
                level: "developing".to_string(),
                name: "Developing".to_string(),
                multiplier: 0.6,
                color: "#f9a825".to_string(),
            },
        ],
        criteria: vec![
            Criterion {
                id: "analysis".to_string(),
                name: "Analysis".to_string(),
                max_points: 50.0,
                levels: BTreeMap::new(),
            },
            Criterion {
                id: "writing".to_string(),
                name: "Writing".to_string(),
                max_points: 50.0,
                levels: BTreeMap::new(),
            },
        ],
        total_points: None,
    }
}

/// Proficient analysis (40) plus developing writing (30): 70 of 100.
pub(super) fn essay_record(late_level: &str) -> GradingRecord {
    let mut selections = BTreeMap::new();
    selections.insert("analysis".to_string(), "proficient".to_string());
    selections.insert("writing".to_string(), "developing".to_string());
    GradingRecord {
        student_id: "s-1001".to_string(),
        assignment_id: "essay-1".to_string(),
        selections,
        late_level: late_level.to_string(),
    }
}

/// Store whose writes always fail.
#[derive(Default)]
pub(super) struct ReadOnlyStore;

impl PolicyStore for ReadOnlyStore {
    fn load_raw(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn save_raw(&self, _key: &str, _json: String) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read only".to_string()))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

pub(super) async fn send(router: Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).expect("serialize body")))
            .expect("request builds"),
        None => builder.body(Body::empty()).expect("request builds"),
    };
    router.oneshot(request).await.expect("route executes")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

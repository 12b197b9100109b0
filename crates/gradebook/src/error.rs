use crate::config::ConfigError;
use crate::grading::{BatchImportError, GradingServiceError, StoreError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Store(StoreError),
    Grading(GradingServiceError),
    Batch(BatchImportError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Store(err) => write!(f, "policy store error: {}", err),
            AppError::Grading(err) => write!(f, "grading error: {}", err),
            AppError::Batch(err) => write!(f, "batch grading error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Grading(err) => Some(err),
            AppError::Batch(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Batch(_) => StatusCode::BAD_REQUEST,
            AppError::Grading(GradingServiceError::Registry(
                crate::grading::RegistryError::NotFound(_),
            ))
            | AppError::Grading(GradingServiceError::LatePolicyNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Grading(GradingServiceError::Calculation(
                crate::grading::CalculationError::Range(_),
            )) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Store(_)
            | AppError::Grading(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<GradingServiceError> for AppError {
    fn from(value: GradingServiceError) -> Self {
        Self::Grading(value)
    }
}

impl From<BatchImportError> for AppError {
    fn from(value: BatchImportError) -> Self {
        Self::Batch(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::{CalculationError, PolicyId, RegistryError};

    #[test]
    fn grading_errors_map_to_client_statuses() {
        let missing: AppError =
            GradingServiceError::from(RegistryError::NotFound(PolicyId::from("policy-0042")))
                .into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let out_of_range: AppError =
            GradingServiceError::from(CalculationError::Range(140.0)).into();
        assert_eq!(
            out_of_range.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn configuration_errors_are_internal() {
        let error = AppError::from(ConfigError::InvalidPort);
        assert_eq!(error.to_string(), "configuration error: APP_PORT must be a valid u16");
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

// Error types for the API server.
// Every failure path, client fault or server fault, flows through `ApiError`
// and renders the same JSON envelope: {"error": {"status", "code", "message"}}.

use crate::engine::{EngineError, ModelName};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotAcceptable(String),
    UnsupportedMediaType(String),
    /// The path segment is not one of the five catalog names.
    UnknownModel(String),
    /// A catalog name whose weights are not published in the zoo.
    ModelUnavailable(ModelName),
    /// Weights are published but the file is missing from the zoo directory.
    WeightsMissing { model: ModelName, path: String },
    ImageProcessingError(String),
    InferenceFailed(String),
    InternalServerError(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotAcceptable(msg) => {
                (StatusCode::NOT_ACCEPTABLE, "NOT_ACCEPTABLE", msg.clone())
            }
            ApiError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg.clone(),
            ),
            ApiError::UnknownModel(name) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNKNOWN_MODEL",
                format!(
                    "'{}' is not a known model name; expected one of: {}",
                    name,
                    ModelName::ALL
                        .iter()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ),
            ApiError::ModelUnavailable(model) => (
                StatusCode::BAD_REQUEST,
                "MODEL_UNAVAILABLE",
                format!(
                    "no pretrained weights are published for model '{}'",
                    model
                ),
            ),
            ApiError::WeightsMissing { model, path } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "WEIGHTS_MISSING",
                format!(
                    "weights for model '{}' are not present in the zoo (expected {})",
                    model, path
                ),
            ),
            ApiError::ImageProcessingError(msg) => (
                StatusCode::BAD_REQUEST,
                "IMAGE_PROCESSING_ERROR",
                msg.clone(),
            ),
            ApiError::InferenceFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INFERENCE_FAILED",
                msg.clone(),
            ),
            ApiError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                msg.clone(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(%status, code, message, "request failed");
        } else {
            tracing::debug!(%status, code, message, "request rejected");
        }

        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "code": code,
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::WeightsUnavailable(model) => ApiError::ModelUnavailable(model),
            EngineError::WeightsNotFound { model, path } => ApiError::WeightsMissing {
                model,
                path: path.display().to_string(),
            },
            EngineError::ModelLoad { model, details } => ApiError::InternalServerError(format!(
                "failed to load model '{}': {}",
                model, details
            )),
            EngineError::Inference { model, details } => {
                ApiError::InferenceFailed(format!("inference with '{}' failed: {}", model, details))
            }
            EngineError::UnexpectedOutput { model, details } => ApiError::InferenceFailed(format!(
                "model '{}' produced an uninterpretable result: {}",
                model, details
            )),
            EngineError::WorkerGone(details) => ApiError::InternalServerError(details),
        }
    }
}

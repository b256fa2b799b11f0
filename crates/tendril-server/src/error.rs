//! Error handling for the REST API server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use tendril_core::TendrilError;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// A rejected request parameter, reported like an engine validation error.
    pub fn invalid_param(field: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VAL_003", message)
            .with_details(serde_json::json!({ "field": field }))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<TendrilError> for ApiError {
    fn from(err: TendrilError) -> Self {
        let code = err.code().as_str();
        let status = match &err {
            TendrilError::InvalidCharge { .. }
            | TendrilError::EmptyIntent { .. }
            | TendrilError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TendrilError::UnknownProbe { .. } => StatusCode::NOT_FOUND,
            TendrilError::Configuration(_) => StatusCode::BAD_REQUEST,
            TendrilError::Feed { .. } | TendrilError::Preservation { .. } => StatusCode::BAD_GATEWAY,
            TendrilError::MalformedProbe { .. }
            | TendrilError::Io(_)
            | TendrilError::Serialization(_)
            | TendrilError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut details = serde_json::Map::new();
        if let Some(field) = err.field() {
            details.insert("field".to_string(), field.into());
        }
        if let Some(suggestion) = err.suggestion() {
            details.insert("suggestion".to_string(), suggestion.into());
        }

        let api = ApiError::new(status, code, err.to_string());
        if details.is_empty() {
            api
        } else {
            api.with_details(serde_json::Value::Object(details))
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

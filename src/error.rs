//! Error taxonomy for the REST surface.
//!
//! Field-scoped validation errors carry their field map so clients can render
//! messages inline; transient storage problems map to 5xx and keep the draft
//! client-side for retry; conflicts and missing context get their own
//! statuses so the client can tell the categories apart.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::validate::FieldErrors;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Field-level validation failures; never reaches storage.
    #[error("validation failed")]
    Validation(BTreeMap<String, String>),

    /// Duplicate name/email on create; surfaced inline near the field.
    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid email or password")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    /// Required selection context (user/center/member) absent; no retry path.
    #[error("missing required context: {0}")]
    MissingContext(String),

    #[error("{0}")]
    BadRequest(String),

    /// Record store failure; transient from the client's point of view.
    #[error("storage error: {0}")]
    Storage(String),

    /// Blob write/read failure; transient from the client's point of view.
    #[error("object storage error: {0}")]
    ObjectStore(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(
            errors
                .into_iter()
                .map(|(field, message)| (field.to_string(), message))
                .collect(),
        )
    }
}

impl From<sled::Error> for ApiError {
    fn from(err: sled::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::ObjectStore(err.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::MissingContext(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) | ApiError::ObjectStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            ApiError::Validation(fields) => json!({
                "message": self.to_string(),
                "fields": fields,
            }),
            _ => json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses_follow_the_taxonomy() {
        let mut fields = BTreeMap::new();
        fields.insert("memberCibil".to_string(), "CIBIL required".to_string());

        assert_eq!(
            ApiError::Validation(fields).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("Email already exists".to_string()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::NotFound("loan".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::MissingContext("centerId".to_string()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Storage("tree closed".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_field_errors_convert_with_field_names() {
        let mut errors = FieldErrors::new();
        errors.insert("pincode", "Valid pincode required".to_string());
        let api: ApiError = errors.into();
        match api {
            ApiError::Validation(map) => {
                assert_eq!(map["pincode"], "Valid pincode required");
            }
            other => panic!("expected validation, got {other:?}"),
        }
    }
}

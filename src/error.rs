//! Typed errors and HTTP mapping.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Code attached to every schema validation failure.
pub const VALIDATOR_ERROR: &str = "VALIDATOR_ERROR";

/// One failing field reported by entity validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),
    #[error("invalid setting {key}: '{value}'")]
    InvalidSetting { key: &'static str, value: String },
    #[error("unknown CRUD method '{0}'")]
    UnknownMethod(String),
    #[error("route key '{key}' under {prefix} is malformed")]
    MalformedRouteKey { prefix: String, key: String },
    #[error("route key '{key}' under {prefix} uses unknown verb '{verb}'")]
    UnknownVerb { prefix: String, key: String, verb: String },
    #[error("route key '{key}' under {prefix} uses verb '{verb}' which the router cannot bind")]
    UnsupportedVerb { prefix: String, key: String, verb: String },
    #[error("route '{key}' under {prefix} has no endpoint")]
    EmptyHandlers { prefix: String, key: String },
    #[error("route {method} {path} is declared more than once")]
    DuplicateRoute { method: String, path: String },
    #[error("prefix '{0}' must start with '/'")]
    InvalidPrefix(String),
    #[error("descriptor {0} mounts no routes")]
    EmptyDescriptor(String),
    #[error("{} route declaration problem(s): {}", .0.len(), join_issues(.0))]
    Rejected(Vec<ConfigError>),
}

fn join_issues(issues: &[ConfigError]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Entity validation failure (422, code `VALIDATOR_ERROR`).
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
        index: Option<usize>,
    },
    /// Domain failure raised deliberately with its own status.
    #[error("{message}")]
    Request {
        status: StatusCode,
        message: String,
        data: Option<Value>,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Validation failure whose message is the first field error's message.
    pub fn validation(errors: Vec<FieldError>) -> Self {
        let message = errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "validation failed".into());
        AppError::Validation {
            message,
            errors,
            index: None,
        }
    }

    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Request {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::status(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::status(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::status(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::status(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }

    /// Marks which element of a bulk payload failed validation.
    pub fn at_index(self, i: usize) -> Self {
        match self {
            AppError::Validation { message, errors, .. } => AppError::Validation {
                message,
                errors,
                index: Some(i),
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Request { status, .. } => *status,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Db(_) | AppError::Json(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            AppError::Validation { .. } => Some(VALIDATOR_ERROR),
            _ => None,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::status(rejection.status(), rejection.body_text())
    }
}

/// Wire envelope for every failure: `{message, error}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ErrorBody {
    pub fn from_error(err: &AppError) -> Self {
        let status = err.status_code();
        let data = match err {
            AppError::Validation { errors, .. } => serde_json::to_value(errors).ok(),
            AppError::Request { data, .. } => data.clone(),
            _ => None,
        };
        let index = match err {
            AppError::Validation { index, .. } => *index,
            _ => None,
        };
        ErrorBody {
            message: err.to_string(),
            error: ErrorDetail {
                status_code: status.as_u16(),
                code: err.code().map(String::from),
                data,
                index,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "unhandled error");
        }
        (status, Json(ErrorBody::from_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_uses_first_message_and_code() {
        let err = AppError::validation(vec![
            FieldError::new("name", "name is required"),
            FieldError::new("code", "code is required"),
        ]);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = ErrorBody::from_error(&err);
        assert_eq!(body.message, "name is required");
        assert_eq!(body.error.code.as_deref(), Some(VALIDATOR_ERROR));
        assert_eq!(body.error.data.as_ref().and_then(|d| d.as_array()).map(Vec::len), Some(2));
    }

    #[test]
    fn unhandled_errors_map_to_500() {
        let err = AppError::internal("boom");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.code().is_none());
    }

    #[test]
    fn domain_errors_keep_their_status() {
        let err = AppError::status(StatusCode::PAYMENT_REQUIRED, "pay first");
        let body = ErrorBody::from_error(&err);
        assert_eq!(body.error.status_code, 402);
        assert_eq!(body.message, "pay first");
    }

    #[test]
    fn at_index_only_touches_validation() {
        let err = AppError::validation(vec![FieldError::new("a", "bad")]).at_index(3);
        assert_eq!(ErrorBody::from_error(&err).error.index, Some(3));
        let other = AppError::not_found("x").at_index(3);
        assert_eq!(ErrorBody::from_error(&other).error.index, None);
    }
}

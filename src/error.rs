//! Error taxonomy shared by the store, the scheduling services and the HTTP layer.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The id does not exist or is outside the caller's ownership scope.
    #[error("{0} not found")]
    NotFound(String),

    /// A unique name collides with an existing record.
    #[error("{0}")]
    Conflict(String),

    #[error("unsupported recurrence rule: {0}")]
    UnsupportedRecurrence(String),

    #[error("entry {0} has no recurrence rule")]
    NoRecurrenceRule(i64),

    /// Raw date input cannot be read at the stated precision.
    #[error("invalid date '{input}' for precision {precision}")]
    InvalidDate { input: String, precision: String },

    #[error("{0}")]
    Unauthorized(String),

    /// Recurrence generation stopped part way; already created entries are kept.
    #[error("recurrence generation stopped after {created} entries: {source}")]
    GenerationInterrupted {
        created: usize,
        source: Box<AppError>,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_date(input: impl Into<String>, precision: impl ToString) -> Self {
        Self::InvalidDate {
            input: input.into(),
            precision: precision.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidDate { .. }
            | Self::UnsupportedRecurrence(_)
            | Self::NoRecurrenceRule(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GenerationInterrupted { source, .. } => source.status(),
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::UnsupportedRecurrence(_) => "unsupported_recurrence",
            Self::NoRecurrenceRule(_) => "no_recurrence_rule",
            Self::InvalidDate { .. } => "invalid_date",
            Self::Unauthorized(_) => "unauthorized",
            Self::GenerationInterrupted { .. } => "generation_interrupted",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }
}

/// Malformed or mistyped request bodies are client errors like any other.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<usize>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let created = match &self {
            Self::GenerationInterrupted { created, .. } => Some(*created),
            _ => None,
        };

        let body = ErrorBody {
            error: self.code(),
            message,
            created,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_generation_reports_cause_status() {
        let err = AppError::GenerationInterrupted {
            created: 2,
            source: Box::new(AppError::not_found("timetable 4")),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "generation_interrupted");
        assert!(err.to_string().contains("after 2 entries"));
    }

    #[test]
    fn taxonomy_maps_to_http_statuses() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::invalid_date("13/45", "day").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("dup".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Unauthorized("no".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NoRecurrenceRule(1).status(), StatusCode::BAD_REQUEST);
    }
}

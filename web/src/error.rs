//! Error types for web handlers.
//!
//! [`AppError`] bridges [`EngineError`] and HTTP responses. Every engine
//! error kind maps to exactly one status code; conflicts keep their kind in
//! the `code` field so clients can tell a lost admission race from any other
//! rejected precondition.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use roundhouse_core::error::{EngineError, FieldError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Team>, AppError> {
///     let team = state.engine.teams().get_team(team_id).await?;
///     Ok(Json(team))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Offending fields, for validation errors
    fields: Vec<FieldDetail>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

/// One rejected input field in an error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDetail {
    /// Field name
    pub field: String,
    /// Why it was rejected
    pub message: String,
}

impl From<&FieldError> for FieldDetail {
    fn from(error: &FieldError) -> Self {
        Self {
            field: error.field.clone(),
            message: error.message.clone(),
        }
    }
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            fields: Vec::new(),
            source: None,
        }
    }

    /// Attach the underlying error (logged, never sent to the client).
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<EngineError> for AppError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Validation(fields) => {
                let mut app = Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    EngineError::Validation(fields.clone()).to_string(),
                    "VALIDATION_ERROR",
                );
                app.fields = fields.iter().map(FieldDetail::from).collect();
                app
            },
            EngineError::Authorization { reason } => {
                Self::new(StatusCode::FORBIDDEN, reason, "FORBIDDEN")
            },
            error @ EngineError::NotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, error.to_string(), "NOT_FOUND")
            },
            EngineError::StateConflict { reason } => {
                Self::new(StatusCode::CONFLICT, reason, "STATE_CONFLICT")
            },
            EngineError::CapacityConflict { reason } => {
                Self::new(StatusCode::CONFLICT, reason, "CAPACITY_CONFLICT")
            },
            EngineError::Internal(message) => Self::internal("An internal error occurred")
                .with_source(anyhow::anyhow!(message)),
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
    /// Offending fields, omitted when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldDetail>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        } else if self.status == StatusCode::CONFLICT {
            tracing::debug!(code = self.code, reason = %self.message, "Request conflicted");
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            fields: self.fields,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

//! Error taxonomy for every engine operation.
//!
//! Validation and authorization failures are detected before any write.
//! State and capacity conflicts are only detectable at the atomic-update
//! boundary; they carry a human-readable reason so callers never have to
//! re-derive it from raw state. The engine never retries a conflict.

use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending field
    pub field: String,
    /// Why the value was rejected
    pub message: String,
}

impl FieldError {
    /// Create a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors surfaced by the round, team, capacity and progression components.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════
    // Rejected before any write
    // ═══════════════════════════════════════════════════════════

    /// Malformed or missing input.
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// Caller lacks the required role or relationship.
    #[error("Forbidden: {reason}")]
    Authorization {
        /// What the caller was missing
        reason: String,
    },

    /// Referenced record does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of record
        resource: String,
        /// Identifier that was looked up
        id: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Detected at the atomic-update boundary
    // ═══════════════════════════════════════════════════════════

    /// A business-rule precondition failed.
    #[error("{reason}")]
    StateConflict {
        /// Human-readable reason
        reason: String,
    },

    /// A bounded slot (event seat, team seat, round seat) was full when the
    /// atomic admission ran.
    #[error("{reason}")]
    CapacityConflict {
        /// Human-readable reason
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════

    /// Store unavailable or an invariant was violated unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse error category, used for metric labels and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// [`EngineError::Validation`]
    Validation,
    /// [`EngineError::Authorization`]
    Authorization,
    /// [`EngineError::NotFound`]
    NotFound,
    /// [`EngineError::StateConflict`]
    StateConflict,
    /// [`EngineError::CapacityConflict`]
    CapacityConflict,
    /// [`EngineError::Internal`]
    Internal,
}

impl ErrorKind {
    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::StateConflict => "state_conflict",
            Self::CapacityConflict => "capacity_conflict",
            Self::Internal => "internal",
        }
    }
}

impl EngineError {
    /// Single-field validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Authorization error.
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Business-rule conflict.
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::StateConflict {
            reason: reason.into(),
        }
    }

    /// Lost atomic-admission race.
    #[must_use]
    pub fn capacity(reason: impl Into<String>) -> Self {
        Self::CapacityConflict {
            reason: reason.into(),
        }
    }

    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::StateConflict { .. } => ErrorKind::StateConflict,
            Self::CapacityConflict { .. } => ErrorKind::CapacityConflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` for state conflicts, including capacity conflicts.
    ///
    /// # Examples
    ///
    /// ```
    /// # use roundhouse_core::EngineError;
    /// assert!(EngineError::capacity("Event is full").is_conflict());
    /// assert!(EngineError::conflict("Round is not completed").is_conflict());
    /// assert!(!EngineError::forbidden("not the leader").is_conflict());
    /// ```
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::StateConflict { .. } | Self::CapacityConflict { .. }
        )
    }

    /// Returns `true` only for lost admission races.
    #[must_use]
    pub const fn is_capacity_conflict(&self) -> bool {
        matches!(self, Self::CapacityConflict { .. })
    }

    /// Rejected fields, if this is a validation error.
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::Validation(fields) => fields,
            _ => &[],
        }
    }
}

/// Accumulates field errors so an operation can report every bad field at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    /// Start an empty validation pass.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Record an error for `field` when `failed` is true.
    pub fn check(&mut self, failed: bool, field: &str, message: impl Into<String>) -> &mut Self {
        if failed {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// Finish the pass.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if any check failed.
    pub fn finish(&mut self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

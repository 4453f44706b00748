//! Error types for the store and the booking core.
//!
//! `StoreError` covers persistence failures; `BookingError` is what every
//! lifecycle, ledger, catalog and comment operation returns to its caller.
//! Rejections are synchronous and never retried here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by an [`EntityStore`](crate::store::EntityStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: Uuid },

    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: Uuid },

    #[error("appointment {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: Uuid, expected: i64 },

    #[error("corrupt {entity} row: {detail}")]
    Corrupt { entity: &'static str, detail: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Rejection reasons for booking operations.
#[derive(Debug, Error)]
pub enum BookingError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The actor's role or ownership does not allow the operation.
    #[error("{0}")]
    Permission(String),

    /// The operation is not valid from the entity's current state, or the
    /// entity changed underneath the caller.
    #[error("{0}")]
    StateConflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// No usable identity accompanied the request.
    #[error("{0}")]
    Unauthenticated(String),

    #[error(transparent)]
    Store(StoreError),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::StateConflict(message.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Short machine-readable label used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Permission(_) => "permission_error",
            Self::StateConflict(_) => "state_conflict",
            Self::NotFound { .. } => "not_found",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Store(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { id, .. } => Self::StateConflict(format!(
                "appointment {id} was changed by another operation; reload and retry"
            )),
            StoreError::Missing { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Store(err) => {
                tracing::error!("Store failure while handling request: {}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": self.kind(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

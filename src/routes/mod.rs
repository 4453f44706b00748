//! HTTP route modules.
//!
//! Each module exposes a `router()` merged by [`crate::create_app`]:
//! - `health`: liveness probe
//! - `users`: user directory (admin)
//! - `services`: service catalog
//! - `appointments`: booking and every lifecycle transition
//! - `payments`: role-scoped ledger view and payment confirmation
//! - `notifications`: the caller's notification center
//! - `comments`: comment threads on services and appointments
//! - `dashboard`: role-specific summary

pub mod appointments;
pub mod comments;
pub mod dashboard;
pub mod health;
pub mod notifications;
pub mod payments;
pub mod services;
pub mod users;

use axum::http::StatusCode;
use axum::Json;

use crate::error::BookingError;
use crate::wire::ApiResponse;

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, BookingError>;
pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), BookingError>;

pub(crate) fn ok<T: serde::Serialize>(data: T, message: impl Into<String>) -> ApiResult<T> {
    Ok(Json(ApiResponse::new(data, message)))
}

//! # Salon Booking Library
//!
//! Appointment lifecycle, payment ledger, notifications and role-scoped
//! queries for a salon with admins, workers and clients. Exposes the Axum
//! router so integration tests can serve it in-process.

pub mod auth;
pub mod catalog;
pub mod comments;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod models;
pub mod notifications;
pub mod queries;
pub mod routes;
pub mod seed;
pub mod state;
pub mod store;
pub mod wire;

use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the Axum router with all route modules and middleware.
///
/// The caller provides a fully wired [`AppState`]. This function does NOT
/// start a server or the overdue sweep.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::users::router())
        .merge(routes::services::router())
        .merge(routes::appointments::router())
        .merge(routes::payments::router())
        .merge(routes::notifications::router())
        .merge(routes::comments::router())
        .merge(routes::dashboard::router())
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

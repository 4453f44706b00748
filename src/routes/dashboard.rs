//! GET /dashboard - Admin summary, worker earnings or client overview

use axum::routing::get;
use axum::{Extension, Router};

use super::{ok, ApiResult};
use crate::models::Actor;
use crate::queries::Dashboard;
use crate::state::AppState;

pub fn router() -> Router {
    Router::new().route("/dashboard", get(dashboard))
}

async fn dashboard(Extension(state): Extension<AppState>, actor: Actor) -> ApiResult<Dashboard> {
    let dashboard = state.queries.dashboard(&actor).await?;
    ok(dashboard, "Dashboard retrieved")
}

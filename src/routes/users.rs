//! GET /users?role= - List user profiles, optionally by role (admin only)

use axum::extract::Query;
use axum::routing::get;
use axum::{Extension, Router};

use super::{ok, ApiResult};
use crate::models::Actor;
use crate::state::AppState;
use crate::wire::{self, UserQuery, UserResponse};

pub fn router() -> Router {
    Router::new().route("/users", get(list_users))
}

async fn list_users(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Query(query): Query<UserQuery>,
) -> ApiResult<Vec<UserResponse>> {
    let users = state.queries.users(&actor, query.role).await?;
    let count = users.len();
    ok(wire::list(users), format!("{count} users"))
}

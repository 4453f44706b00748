//! GET  /comments/{target_type}/{target_id} - Comments the caller may read
//! POST /comments                           - Add a comment

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use super::{ok, ApiResult, CreatedResult};
use crate::models::{Actor, CommentTarget};
use crate::state::AppState;
use crate::wire::{self, ApiResponse, CommentResponse, CreateCommentRequest};

pub fn router() -> Router {
    Router::new()
        .route("/comments", post(add_comment))
        .route("/comments/{target_type}/{target_id}", get(list_comments))
}

async fn list_comments(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path((target_type, target_id)): Path<(CommentTarget, Uuid)>,
) -> ApiResult<Vec<CommentResponse>> {
    let comments = state.comments.list(&actor, target_type, target_id).await?;
    ok(wire::list(comments), "Comments retrieved")
}

async fn add_comment(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Json(req): Json<CreateCommentRequest>,
) -> CreatedResult<CommentResponse> {
    let comment = state
        .comments
        .add(&actor, req.target_type, req.target_id, &req.content, req.is_internal)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(CommentResponse::from(comment), "Comment added")),
    ))
}

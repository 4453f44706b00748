//! GET  /notifications           - The caller's notifications, newest first
//! POST /notifications/{id}/read - Mark one of the caller's notifications read

use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Extension, Router};
use uuid::Uuid;

use super::{ok, ApiResult};
use crate::models::Actor;
use crate::state::AppState;
use crate::wire::{self, NotificationCenter, NotificationResponse};

pub fn router() -> Router {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/{id}/read", post(mark_read))
}

async fn list_notifications(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> ApiResult<NotificationCenter> {
    let inbox = state.notifier.inbox(&actor).await?;
    ok(
        NotificationCenter {
            unread_count: inbox.unread,
            notifications: wire::list(inbox.notifications),
        },
        "Notifications retrieved",
    )
}

async fn mark_read(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<NotificationResponse> {
    let notification = state.notifier.mark_read(&actor, id).await?;
    ok(notification.into(), "Notification marked as read")
}

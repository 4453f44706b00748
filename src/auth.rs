//! Request identity.
//!
//! Sessions are issued by an external identity provider; the gateway in
//! front of this service forwards the authenticated user's id in the
//! `x-user-id` header. Handlers take an [`Actor`] argument to require it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::debug;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::Actor;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| BookingError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
            BookingError::Unauthenticated(format!("{USER_ID_HEADER} is not a valid user id"))
        })?;

        let state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| BookingError::Unauthenticated("identity lookup unavailable".to_string()))?;

        match state.store.get_user(user_id).await? {
            Some(user) => Ok(Actor::from(&user)),
            None => {
                debug!("Rejected request from unknown user {}", user_id);
                Err(BookingError::Unauthenticated(format!("unknown user {user_id}")))
            }
        }
    }
}

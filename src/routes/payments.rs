//! GET  /payments              - Payments visible to the caller
//! POST /payments/{id}/confirm - Record a payment as settled (admin)

use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use super::{ok, ApiResult};
use crate::models::Actor;
use crate::state::AppState;
use crate::wire::{self, ConfirmPaymentRequest, PaymentResponse};

pub fn router() -> Router {
    Router::new()
        .route("/payments", get(list_payments))
        .route("/payments/{id}/confirm", post(confirm_payment))
}

async fn list_payments(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> ApiResult<Vec<PaymentResponse>> {
    let payments = state.queries.payments_for(&actor).await?;
    ok(wire::list(payments), "Payments retrieved")
}

async fn confirm_payment(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> ApiResult<PaymentResponse> {
    let payment = state
        .engine
        .confirm_payment(&actor, id, req.payment_method)
        .await?;
    ok(payment.into(), "Payment confirmed")
}

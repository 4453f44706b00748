//! Appointment routes. Every mutation is delegated to the lifecycle engine;
//! reads go through the role-scoped query layer.
//!
//! GET  /appointments                            - Appointments visible to the caller
//! POST /appointments                            - Book (client) or create for a client (admin)
//! GET  /appointments/{id}                       - One appointment with its visible comments
//! POST /appointments/{id}/assign                - Assign a worker (admin)
//! POST /appointments/{id}/claim                 - Take a published pending appointment (worker)
//! POST /appointments/{id}/reschedule            - Propose a new slot (owning client)
//! POST /appointments/{id}/reschedule/approve    - Accept the proposed slot (admin)
//! POST /appointments/{id}/reschedule/reject     - Keep the original slot (admin)
//! POST /appointments/{id}/cancel                - Cancel with a reason (admin, owning client)
//! POST /appointments/{id}/complete              - Mark delivered (admin, assigned worker)
//! PUT  /appointments/{id}/pricing               - Override prices while pending (admin)
//! PUT  /appointments/{id}/publish               - Publish or withdraw while pending (admin)

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use tracing::info;
use uuid::Uuid;

use super::{ok, ApiResult, CreatedResult};
use crate::error::BookingError;
use crate::models::{Actor, CommentTarget, Role};
use crate::state::AppState;
use crate::wire::{
    self, ApiResponse, AppointmentDetail, AppointmentResponse, AssignWorkerRequest, CancelRequest,
    CreateAppointmentRequest, PricingRequest, PublishRequest, RescheduleRequestBody,
};

const DEFAULT_CLIENT_CANCEL_REASON: &str = "Cancelled by client";

pub fn router() -> Router {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/{id}", get(get_appointment))
        .route("/appointments/{id}/assign", post(assign_worker))
        .route("/appointments/{id}/claim", post(claim_appointment))
        .route("/appointments/{id}/reschedule", post(request_reschedule))
        .route("/appointments/{id}/reschedule/approve", post(approve_reschedule))
        .route("/appointments/{id}/reschedule/reject", post(reject_reschedule))
        .route("/appointments/{id}/cancel", post(cancel_appointment))
        .route("/appointments/{id}/complete", post(complete_appointment))
        .route("/appointments/{id}/pricing", put(override_pricing))
        .route("/appointments/{id}/publish", put(set_published))
}

async fn list_appointments(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> ApiResult<Vec<AppointmentResponse>> {
    let appointments = state.queries.appointments_for(&actor).await?;
    ok(wire::list(appointments), "Appointments retrieved")
}

/// Clients book for themselves at catalog prices; admins must name the
/// client and may override prices and visibility.
async fn create_appointment(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Json(req): Json<CreateAppointmentRequest>,
) -> CreatedResult<AppointmentResponse> {
    let appointment = match actor.role {
        Role::Admin => {
            let client_id = req
                .client_id
                .ok_or_else(|| BookingError::validation("client_id is required"))?;
            state
                .engine
                .create_for_client(&actor, req.admin_booking(client_id))
                .await?
        }
        _ => state.engine.book(&actor, req.booking()).await?,
    };

    info!(
        "Appointment {} created via API by {} {}",
        appointment.id, actor.role, actor.id
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            AppointmentResponse::from(appointment),
            "Appointment created successfully",
        )),
    ))
}

async fn get_appointment(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<AppointmentDetail> {
    let appointment = state.queries.appointment_for(&actor, id).await?;
    let comments = state
        .comments
        .list(&actor, CommentTarget::Appointment, id)
        .await?;
    ok(
        AppointmentDetail {
            appointment: appointment.into(),
            comments: wire::list(comments),
        },
        "Appointment retrieved",
    )
}

async fn assign_worker(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignWorkerRequest>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state.engine.assign_worker(&actor, id, req.worker_id).await?;
    ok(appointment.into(), "Worker assigned")
}

async fn claim_appointment(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state.engine.request_appointment(&actor, id).await?;
    ok(appointment.into(), "Appointment claimed")
}

async fn request_reschedule(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<RescheduleRequestBody>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state
        .engine
        .request_reschedule(&actor, id, req.into())
        .await?;
    ok(appointment.into(), "Reschedule requested")
}

async fn approve_reschedule(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state.engine.approve_reschedule(&actor, id).await?;
    ok(appointment.into(), "Reschedule approved")
}

async fn reject_reschedule(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state.engine.reject_reschedule(&actor, id).await?;
    ok(appointment.into(), "Reschedule rejected")
}

/// Clients may omit the reason; admins must give one.
async fn cancel_appointment(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> ApiResult<AppointmentResponse> {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .filter(|reason| !reason.trim().is_empty());
    let reason = match (reason, actor.role) {
        (Some(reason), _) => reason,
        (None, Role::Client) => DEFAULT_CLIENT_CANCEL_REASON.to_string(),
        (None, _) => String::new(),
    };
    let appointment = state.engine.cancel(&actor, id, &reason).await?;
    ok(appointment.into(), "Appointment cancelled")
}

async fn complete_appointment(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state.engine.mark_completed(&actor, id).await?;
    ok(appointment.into(), "Appointment completed")
}

async fn override_pricing(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<PricingRequest>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state
        .engine
        .override_pricing(&actor, id, req.final_price, req.worker_rate)
        .await?;
    ok(appointment.into(), "Pricing updated")
}

async fn set_published(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<PublishRequest>,
) -> ApiResult<AppointmentResponse> {
    let appointment = state
        .engine
        .set_published(&actor, id, req.is_published)
        .await?;
    let message = if appointment.is_published {
        "Appointment published"
    } else {
        "Appointment unpublished"
    };
    ok(appointment.into(), message)
}

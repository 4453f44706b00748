//! Service catalog routes.
//!
//! GET  /services      - Active services (admins also see inactive ones)
//! POST /services      - Create a service (admin)
//! PUT  /services/{id} - Edit a service (admin)

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use super::{ok, ApiResult, CreatedResult};
use crate::models::Actor;
use crate::state::AppState;
use crate::wire::{self, ApiResponse, CreateServiceRequest, ServiceResponse, UpdateServiceRequest};

pub fn router() -> Router {
    Router::new()
        .route("/services", get(list_services).post(create_service))
        .route("/services/{id}", put(update_service))
}

async fn list_services(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> ApiResult<Vec<ServiceResponse>> {
    let services = state.queries.services_for(&actor).await?;
    ok(wire::list(services), "Services retrieved")
}

async fn create_service(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Json(req): Json<CreateServiceRequest>,
) -> CreatedResult<ServiceResponse> {
    let service = state.catalog.create(&actor, req.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            ServiceResponse::from(service),
            "Service created successfully",
        )),
    ))
}

async fn update_service(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateServiceRequest>,
) -> ApiResult<ServiceResponse> {
    let service = state.catalog.update(&actor, id, req.into()).await?;
    ok(ServiceResponse::from(service), "Service updated successfully")
}

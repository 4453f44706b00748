//! Service catalog administration.
//!
//! Prices set here are only defaults: appointments snapshot them when they
//! are booked, so editing a service never reprices existing appointments.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::models::{Actor, Service};
use crate::store::EntityStore;

/// Fields an admin supplies when creating a service.
#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub description: String,
    pub base_price: f64,
    pub worker_rate: f64,
    pub duration_minutes: i32,
    pub category: String,
    pub image_url: Option<String>,
    pub is_active: bool,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<f64>,
    pub worker_rate: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

fn validate(service: &Service) -> BookingResult<()> {
    if service.name.trim().is_empty() {
        return Err(BookingError::validation("service name is required"));
    }
    for (field, value) in [
        ("base_price", service.base_price),
        ("worker_rate", service.worker_rate),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(BookingError::validation(format!(
                "{field} must be a non-negative amount"
            )));
        }
    }
    if service.duration_minutes <= 0 {
        return Err(BookingError::validation("duration must be positive"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ServiceCatalog {
    store: Arc<dyn EntityStore>,
}

impl ServiceCatalog {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, actor: &Actor, new: NewService) -> BookingResult<Service> {
        if !actor.is_admin() {
            return Err(BookingError::permission("only admins may create services"));
        }
        let service = Service {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            description: new.description,
            base_price: new.base_price,
            worker_rate: new.worker_rate,
            duration_minutes: new.duration_minutes,
            category: new.category,
            is_active: new.is_active,
            image_url: new.image_url,
            created_at: Utc::now(),
        };
        validate(&service)?;
        self.store.insert_service(&service).await?;
        info!(
            "Service {} '{}' created ({:.2} / {:.2})",
            service.id, service.name, service.base_price, service.worker_rate
        );
        Ok(service)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, patch: ServicePatch) -> BookingResult<Service> {
        if !actor.is_admin() {
            return Err(BookingError::permission("only admins may edit services"));
        }
        let mut service = self
            .store
            .get_service(id)
            .await?
            .ok_or_else(|| BookingError::not_found("service", id))?;

        if let Some(name) = patch.name {
            service.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            service.description = description;
        }
        if let Some(price) = patch.base_price {
            service.base_price = price;
        }
        if let Some(rate) = patch.worker_rate {
            service.worker_rate = rate;
        }
        if let Some(duration) = patch.duration_minutes {
            service.duration_minutes = duration;
        }
        if let Some(category) = patch.category {
            service.category = category;
        }
        if let Some(url) = patch.image_url {
            service.image_url = Some(url);
        }
        if let Some(active) = patch.is_active {
            service.is_active = active;
        }
        validate(&service)?;

        self.store.update_service(&service).await?;
        info!("Service {} '{}' updated (active={})", service.id, service.name, service.is_active);
        Ok(service)
    }
}

//! Entity store: the single source of truth for users, services,
//! appointments, payments, notifications and comments.
//!
//! Two backends implement [`EntityStore`]:
//! - [`MemoryStore`] keeps everything in process (tests, demos)
//! - [`PgStore`] persists to PostgreSQL through `sqlx`
//!
//! Appointments are updated with a compare-and-swap on their `version`
//! field, so a writer holding a stale copy is rejected instead of silently
//! overwriting a concurrent transition.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    Appointment, AppointmentStatus, Comment, CommentTarget, Notification, Payment, Role, Service,
    User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Conjunctive filter applied by [`EntityStore::list_appointments`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub client_id: Option<Uuid>,
    pub assigned_worker_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub published_only: bool,
}

impl AppointmentFilter {
    pub fn for_client(client_id: Uuid) -> Self {
        Self {
            client_id: Some(client_id),
            ..Self::default()
        }
    }

    pub fn published() -> Self {
        Self {
            published_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.client_id.map_or(true, |id| appointment.client_id == id)
            && self
                .assigned_worker_id
                .map_or(true, |id| appointment.is_assigned_to(id))
            && self.status.map_or(true, |status| appointment.status == status)
            && (!self.published_only || appointment.is_published)
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    // Users
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>>;
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    // Services, newest first
    async fn get_service(&self, id: Uuid) -> StoreResult<Option<Service>>;
    async fn list_services(&self) -> StoreResult<Vec<Service>>;
    async fn insert_service(&self, service: &Service) -> StoreResult<()>;
    async fn update_service(&self, service: &Service) -> StoreResult<()>;

    // Appointments, ordered by date then time
    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;
    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>>;
    async fn insert_appointment(&self, appointment: &Appointment) -> StoreResult<()>;
    /// Writes `appointment` if the stored version still equals
    /// `appointment.version`, and returns the stored copy with the bumped
    /// version.
    async fn update_appointment(&self, appointment: &Appointment) -> StoreResult<Appointment>;

    // Payments, at most one per appointment
    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;
    async fn get_payment_for_appointment(&self, appointment_id: Uuid)
        -> StoreResult<Option<Payment>>;
    async fn list_payments(&self) -> StoreResult<Vec<Payment>>;
    /// Fails with `StoreError::Duplicate` if the appointment already has one.
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()>;
    async fn update_payment(&self, payment: &Payment) -> StoreResult<()>;
    /// Writes `payment` together with a compare-and-swap update of its
    /// appointment. Either both records change or neither does.
    async fn settle_payment(
        &self,
        payment: &Payment,
        appointment: &Appointment,
    ) -> StoreResult<Appointment>;

    // Notifications, newest first
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
    async fn get_notification(&self, id: Uuid) -> StoreResult<Option<Notification>>;
    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;
    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<()>;

    // Comments, oldest first
    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()>;
    async fn list_comments(&self, target_type: CommentTarget, target_id: Uuid)
        -> StoreResult<Vec<Comment>>;
}

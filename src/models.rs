//! Domain models for the salon booking service.
//!
//! These types are the engine's strongly typed view of the entity store.
//! Wire representations (snake_case JSON payloads) live in [`crate::wire`];
//! database rows live next to the PostgreSQL store.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Enumerations
// ============================================================================

/// Declares `as_str` and `Display` for a string-backed enum.
///
/// The labels are the ones persisted in the database and exchanged on the
/// wire, so they must stay in sync with the serde and sqlx renames.
macro_rules! labelled_enum {
    ($name:ident, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Worker,
    Client,
}

labelled_enum!(Role, {
    Admin => "admin",
    Worker => "worker",
    Client => "client",
});

/// Lifecycle state of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Pending,
    Assigned,
    RescheduleRequested,
    Completed,
    Cancelled,
}

labelled_enum!(AppointmentStatus, {
    Pending => "pending",
    Assigned => "assigned",
    RescheduleRequested => "reschedule-requested",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        Self::Pending,
        Self::Assigned,
        Self::RescheduleRequested,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Completed and cancelled appointments accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Billing axis of an appointment, independent of its lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

labelled_enum!(PaymentStatus, {
    Pending => "pending",
    Paid => "paid",
    Overdue => "overdue",
});

/// Who originated an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum CreatedBy {
    Admin,
    Client,
}

labelled_enum!(CreatedBy, {
    Admin => "admin",
    Client => "client",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

labelled_enum!(PaymentMethod, {
    Cash => "cash",
    Card => "card",
    Transfer => "transfer",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

labelled_enum!(NotificationKind, {
    Info => "info",
    Success => "success",
    Warning => "warning",
    Error => "error",
});

/// Entity a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum RelatedType {
    Appointment,
    Service,
    Payment,
}

labelled_enum!(RelatedType, {
    Appointment => "appointment",
    Service => "service",
    Payment => "payment",
});

/// Entity a comment is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum CommentTarget {
    Service,
    Appointment,
}

labelled_enum!(CommentTarget, {
    Service => "service",
    Appointment => "appointment",
});

// ============================================================================
// Entities
// ============================================================================

/// A user profile. Credentials live with the external identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The identity performing an operation, as vouched for by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// A sellable offering.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub base_price: f64,
    pub worker_rate: f64,
    pub duration_minutes: i32,
    pub category: String,
    pub is_active: bool,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Denormalized reference to the worker an appointment is assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRef {
    pub id: Uuid,
    pub name: String,
}

/// A client-proposed slot awaiting admin review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescheduleRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: String,
}

/// A scheduled service instance.
///
/// Display fields (`service_name`, `client_*`, worker name) are snapshots
/// taken when the appointment was written and are never re-derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub assigned_worker: Option<WorkerRef>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reschedule: Option<RescheduleRequest>,
    pub final_price: f64,
    pub worker_rate: f64,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub is_published: bool,
    pub created_by: CreatedBy,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the store on every update.
    pub version: i64,
}

impl Appointment {
    pub fn worker_id(&self) -> Option<Uuid> {
        self.assigned_worker.as_ref().map(|worker| worker.id)
    }

    pub fn is_assigned_to(&self, worker_id: Uuid) -> bool {
        self.worker_id() == Some(worker_id)
    }

    /// Status to fall back to when a pending reschedule request is resolved.
    pub fn settled_status(&self) -> AppointmentStatus {
        if self.assigned_worker.is_some() {
            AppointmentStatus::Assigned
        } else {
            AppointmentStatus::Pending
        }
    }

    /// Returns the first structural invariant this record violates, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        let rescheduling = self.status == AppointmentStatus::RescheduleRequested;
        if rescheduling != self.reschedule.is_some() {
            return Some("reschedule request must be present exactly while reschedule-requested");
        }
        let cancelled = self.status == AppointmentStatus::Cancelled;
        if cancelled != self.cancellation_reason.is_some() {
            return Some("cancellation reason must be present exactly while cancelled");
        }
        if matches!(
            self.status,
            AppointmentStatus::Assigned | AppointmentStatus::Completed
        ) && self.assigned_worker.is_none()
        {
            return Some("assigned and completed appointments need a worker");
        }
        if self.status == AppointmentStatus::Pending && self.assigned_worker.is_some() {
            return Some("pending appointments cannot carry a worker");
        }
        if self.final_price < 0.0 || self.worker_rate < 0.0 {
            return Some("prices cannot be negative");
        }
        None
    }
}

/// Billing record derived from an appointment entering a billable state.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub worker_id: Uuid,
    pub worker_name: String,
    pub total_amount: f64,
    pub worker_amount: f64,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// An unpaid payment is overdue once its due date has passed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_paid && self.due_date < today
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub related_id: Option<Uuid>,
    pub related_type: Option<RelatedType>,
}

/// Append-only remark on a service or appointment.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    pub target_type: CommentTarget,
    pub target_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_role: Role,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

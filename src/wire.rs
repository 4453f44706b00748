//! Wire format: snake_case JSON payloads in and out of the HTTP layer.
//!
//! Everything the routes accept or return passes through this module so the
//! engine's types never carry serde concerns of the HTTP contract. Times
//! travel as `HH:MM`, dates as `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{NewService, ServicePatch};
use crate::lifecycle::{AdminBookingRequest, BookingRequest, RescheduleProposal};
use crate::models::{
    Appointment, AppointmentStatus, Comment, CommentTarget, CreatedBy, Notification,
    NotificationKind, Payment, PaymentMethod, PaymentStatus, RelatedType, Role, Service, User,
};

/// Serde adapter for `HH:MM` times. Seconds are accepted on input and
/// dropped, so what is stored is exactly what is written back.
pub mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        let invalid = || format!("invalid time '{raw}', expected HH:MM");
        let time = NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|_| invalid())?;
        NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).ok_or_else(invalid)
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::Serializer;

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(time) => super::serialize(time, s),
                None => s.serialize_none(),
            }
        }
    }
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }
}

// ============================================================================
// Request Models
// ============================================================================

/// Body of `POST /appointments`. Admins must name the client; clients book
/// for themselves and cannot override prices.
#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub service_id: Uuid,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub appointment_time: NaiveTime,
    pub client_id: Option<Uuid>,
    pub final_price: Option<f64>,
    pub worker_rate: Option<f64>,
    pub is_published: Option<bool>,
}

impl CreateAppointmentRequest {
    pub fn booking(&self) -> BookingRequest {
        BookingRequest {
            service_id: self.service_id,
            date: self.appointment_date,
            time: self.appointment_time,
        }
    }

    pub fn admin_booking(&self, client_id: Uuid) -> AdminBookingRequest {
        AdminBookingRequest {
            service_id: self.service_id,
            client_id,
            date: self.appointment_date,
            time: self.appointment_time,
            final_price: self.final_price,
            worker_rate: self.worker_rate,
            is_published: self.is_published.unwrap_or(true),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignWorkerRequest {
    pub worker_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequestBody {
    pub requested_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub requested_time: NaiveTime,
    #[serde(default)]
    pub reason: String,
}

impl From<RescheduleRequestBody> for RescheduleProposal {
    fn from(body: RescheduleRequestBody) -> Self {
        Self {
            date: body.requested_date,
            time: body.requested_time,
            reason: body.reason,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PricingRequest {
    pub final_price: f64,
    pub worker_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub is_published: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_price: f64,
    pub worker_rate: f64,
    pub duration: i32,
    #[serde(default)]
    pub category: String,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

impl From<CreateServiceRequest> for NewService {
    fn from(req: CreateServiceRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            base_price: req.base_price,
            worker_rate: req.worker_rate,
            duration_minutes: req.duration,
            category: req.category,
            image_url: req.image_url,
            is_active: req.is_active.unwrap_or(true),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<f64>,
    pub worker_rate: Option<f64>,
    pub duration: Option<i32>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

impl From<UpdateServiceRequest> for ServicePatch {
    fn from(req: UpdateServiceRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            base_price: req.base_price,
            worker_rate: req.worker_rate,
            duration_minutes: req.duration,
            category: req.category,
            image_url: req.image_url,
            is_active: req.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub target_type: CommentTarget,
    pub target_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
}

// ============================================================================
// Response Models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub base_price: f64,
    pub worker_rate: f64,
    pub duration: i32,
    pub category: String,
    pub is_active: bool,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Service> for ServiceResponse {
    fn from(service: Service) -> Self {
        Self {
            id: service.id,
            name: service.name,
            description: service.description,
            base_price: service.base_price,
            worker_rate: service.worker_rate,
            duration: service.duration_minutes,
            category: service.category,
            is_active: service.is_active,
            image_url: service.image_url,
            created_at: service.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AppointmentResponse {
    pub id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub assigned_worker_id: Option<Uuid>,
    pub assigned_worker_name: Option<String>,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub appointment_time: NaiveTime,
    pub requested_date: Option<NaiveDate>,
    #[serde(serialize_with = "hhmm::option::serialize")]
    pub requested_time: Option<NaiveTime>,
    pub reschedule_reason: Option<String>,
    pub final_price: f64,
    pub worker_rate: f64,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub is_published: bool,
    pub created_by: CreatedBy,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl From<Appointment> for AppointmentResponse {
    fn from(apt: Appointment) -> Self {
        let (worker_id, worker_name) = match apt.assigned_worker {
            Some(worker) => (Some(worker.id), Some(worker.name)),
            None => (None, None),
        };
        let (requested_date, requested_time, reschedule_reason) = match apt.reschedule {
            Some(request) => (Some(request.date), Some(request.time), Some(request.reason)),
            None => (None, None, None),
        };
        Self {
            id: apt.id,
            service_id: apt.service_id,
            service_name: apt.service_name,
            client_id: apt.client_id,
            client_name: apt.client_name,
            client_email: apt.client_email,
            client_phone: apt.client_phone,
            assigned_worker_id: worker_id,
            assigned_worker_name: worker_name,
            appointment_date: apt.date,
            appointment_time: apt.time,
            requested_date,
            requested_time,
            reschedule_reason,
            final_price: apt.final_price,
            worker_rate: apt.worker_rate,
            status: apt.status,
            payment_status: apt.payment_status,
            is_published: apt.is_published,
            created_by: apt.created_by,
            cancellation_reason: apt.cancellation_reason,
            created_at: apt.created_at,
            updated_at: apt.updated_at,
            version: apt.version,
        }
    }
}

/// An appointment with the comment thread its reader may see.
#[derive(Debug, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: AppointmentResponse,
    pub comments: Vec<CommentResponse>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
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

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            appointment_id: p.appointment_id,
            client_id: p.client_id,
            client_name: p.client_name,
            worker_id: p.worker_id,
            worker_name: p.worker_name,
            total_amount: p.total_amount,
            worker_amount: p.worker_amount,
            date: p.date,
            due_date: p.due_date,
            is_paid: p.is_paid,
            payment_method: p.payment_method,
            paid_at: p.paid_at,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub related_id: Option<Uuid>,
    pub related_type: Option<RelatedType>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            title: n.title,
            message: n.message,
            kind: n.kind,
            created_at: n.created_at,
            is_read: n.is_read,
            related_id: n.related_id,
            related_type: n.related_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationCenter {
    pub unread_count: usize,
    pub notifications: Vec<NotificationResponse>,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
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

impl From<Comment> for CommentResponse {
    fn from(c: Comment) -> Self {
        Self {
            id: c.id,
            target_type: c.target_type,
            target_id: c.target_id,
            user_id: c.user_id,
            user_name: c.user_name,
            user_role: c.user_role,
            content: c.content,
            is_internal: c.is_internal,
            created_at: c.created_at,
        }
    }
}

/// Convert a list of domain values into their wire form.
pub fn list<T, W: From<T>>(items: Vec<T>) -> Vec<W> {
    items.into_iter().map(W::from).collect()
}

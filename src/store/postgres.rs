//! PostgreSQL entity store.
//!
//! Enumerations are stored as their text labels through their `sqlx::Type`
//! derives. Payment settlement runs in a transaction so the payment and its
//! appointment never disagree.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{AppointmentFilter, EntityStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Appointment, AppointmentStatus, Comment, CommentTarget, CreatedBy, Notification,
    NotificationKind, Payment, PaymentMethod, PaymentStatus, RelatedType, RescheduleRequest, Role,
    Service, User, WorkerRef,
};

/// Entity store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then bring the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Connected to booking database");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Booking database migrations complete");

        Ok(Self::new(pool))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ============================================================================
// Rows (sqlx::FromRow)
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    role: Role,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    description: String,
    base_price: f64,
    worker_rate: f64,
    duration_minutes: i32,
    category: String,
    is_active: bool,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            base_price: row.base_price,
            worker_rate: row.worker_rate,
            duration_minutes: row.duration_minutes,
            category: row.category,
            is_active: row.is_active,
            image_url: row.image_url,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    service_id: Uuid,
    service_name: String,
    client_id: Uuid,
    client_name: String,
    client_email: Option<String>,
    client_phone: Option<String>,
    assigned_worker_id: Option<Uuid>,
    assigned_worker_name: Option<String>,
    appointment_date: NaiveDate,
    appointment_time: NaiveTime,
    requested_date: Option<NaiveDate>,
    requested_time: Option<NaiveTime>,
    reschedule_reason: Option<String>,
    final_price: f64,
    worker_rate: f64,
    status: AppointmentStatus,
    payment_status: PaymentStatus,
    is_published: bool,
    created_by: CreatedBy,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> StoreResult<Self> {
        let assigned_worker = match (row.assigned_worker_id, row.assigned_worker_name) {
            (Some(id), Some(name)) => Some(WorkerRef { id, name }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt {
                    entity: "appointment",
                    detail: format!("{}: worker id and name must be set together", row.id),
                })
            }
        };
        let reschedule = match (row.requested_date, row.requested_time) {
            (Some(date), Some(time)) => Some(RescheduleRequest {
                date,
                time,
                reason: row.reschedule_reason.unwrap_or_default(),
            }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt {
                    entity: "appointment",
                    detail: format!("{}: requested date and time must be set together", row.id),
                })
            }
        };

        Ok(Self {
            id: row.id,
            service_id: row.service_id,
            service_name: row.service_name,
            client_id: row.client_id,
            client_name: row.client_name,
            client_email: row.client_email,
            client_phone: row.client_phone,
            assigned_worker,
            date: row.appointment_date,
            time: row.appointment_time,
            reschedule,
            final_price: row.final_price,
            worker_rate: row.worker_rate,
            status: row.status,
            payment_status: row.payment_status,
            is_published: row.is_published,
            created_by: row.created_by,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    appointment_id: Uuid,
    client_id: Uuid,
    client_name: String,
    worker_id: Uuid,
    worker_name: String,
    total_amount: f64,
    worker_amount: f64,
    payment_date: NaiveDate,
    due_date: NaiveDate,
    is_paid: bool,
    payment_method: Option<PaymentMethod>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            appointment_id: row.appointment_id,
            client_id: row.client_id,
            client_name: row.client_name,
            worker_id: row.worker_id,
            worker_name: row.worker_name,
            total_amount: row.total_amount,
            worker_amount: row.worker_amount,
            date: row.payment_date,
            due_date: row.due_date,
            is_paid: row.is_paid,
            payment_method: row.payment_method,
            paid_at: row.paid_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    message: String,
    kind: NotificationKind,
    is_read: bool,
    related_id: Option<Uuid>,
    related_type: Option<RelatedType>,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            message: row.message,
            kind: row.kind,
            created_at: row.created_at,
            is_read: row.is_read,
            related_id: row.related_id,
            related_type: row.related_type,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    target_type: CommentTarget,
    target_id: Uuid,
    user_id: Uuid,
    user_name: String,
    user_role: Role,
    content: String,
    is_internal: bool,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            target_type: row.target_type,
            target_id: row.target_id,
            user_id: row.user_id,
            user_name: row.user_name,
            user_role: row.user_role,
            content: row.content,
            is_internal: row.is_internal,
            created_at: row.created_at,
        }
    }
}

fn convert_all<R, T: From<R>>(rows: Vec<R>) -> Vec<T> {
    rows.into_iter().map(T::from).collect()
}

/// Compare-and-swap write of an appointment. `None` means no row matched
/// both the id and the expected version.
async fn write_appointment<'e, E: PgExecutor<'e>>(
    executor: E,
    appointment: &Appointment,
) -> StoreResult<Option<AppointmentRow>> {
    let worker = appointment.assigned_worker.as_ref();
    let reschedule = appointment.reschedule.as_ref();
    let row = sqlx::query_as(
        r#"
        UPDATE appointments
        SET service_name = $3, client_name = $4, client_email = $5, client_phone = $6,
            assigned_worker_id = $7, assigned_worker_name = $8,
            appointment_date = $9, appointment_time = $10,
            requested_date = $11, requested_time = $12, reschedule_reason = $13,
            final_price = $14, worker_rate = $15, status = $16, payment_status = $17,
            is_published = $18, cancellation_reason = $19, updated_at = $20,
            version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING *
        "#,
    )
    .bind(appointment.id)
    .bind(appointment.version)
    .bind(&appointment.service_name)
    .bind(&appointment.client_name)
    .bind(&appointment.client_email)
    .bind(&appointment.client_phone)
    .bind(worker.map(|w| w.id))
    .bind(worker.map(|w| w.name.clone()))
    .bind(appointment.date)
    .bind(appointment.time)
    .bind(reschedule.map(|r| r.date))
    .bind(reschedule.map(|r| r.time))
    .bind(reschedule.map(|r| r.reason.clone()))
    .bind(appointment.final_price)
    .bind(appointment.worker_rate)
    .bind(appointment.status)
    .bind(appointment.payment_status)
    .bind(appointment.is_published)
    .bind(&appointment.cancellation_reason)
    .bind(appointment.updated_at)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

async fn write_payment<'e, E: PgExecutor<'e>>(executor: E, payment: &Payment) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET total_amount = $2, worker_amount = $3, due_date = $4, is_paid = $5,
            payment_method = $6, paid_at = $7
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(payment.total_amount)
    .bind(payment.worker_amount)
    .bind(payment.due_date)
    .bind(payment.is_paid)
    .bind(payment.payment_method)
    .bind(payment.paid_at)
    .execute(executor)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::Missing { entity: "payment", id: payment.id });
    }
    Ok(())
}

impl PgStore {
    /// Explains why a compare-and-swap write matched no row.
    async fn rejected_write(&self, appointment: &Appointment) -> StoreError {
        let exists: Result<Option<Uuid>, sqlx::Error> =
            sqlx::query_scalar("SELECT id FROM appointments WHERE id = $1")
                .bind(appointment.id)
                .fetch_optional(&self.pool)
                .await;
        match exists {
            Ok(Some(_)) => StoreError::VersionConflict {
                id: appointment.id,
                expected: appointment.version,
            },
            Ok(None) => StoreError::Missing { entity: "appointment", id: appointment.id },
            Err(e) => e.into(),
        }
    }
}

// ============================================================================
// EntityStore
// ============================================================================

#[async_trait]
impl EntityStore for PgStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE ($1::TEXT IS NULL OR role = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(convert_all(rows))
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, phone, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate { entity: "user", id: user.id }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> StoreResult<Option<Service>> {
        let row: Option<ServiceRow> = sqlx::query_as("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Service::from))
    }

    async fn list_services(&self) -> StoreResult<Vec<Service>> {
        let rows: Vec<ServiceRow> =
            sqlx::query_as("SELECT * FROM services ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(convert_all(rows))
    }

    async fn insert_service(&self, service: &Service) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO services (id, name, description, base_price, worker_rate,
                                  duration_minutes, category, is_active, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(service.id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.base_price)
        .bind(service.worker_rate)
        .bind(service.duration_minutes)
        .bind(&service.category)
        .bind(service.is_active)
        .bind(&service.image_url)
        .bind(service.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_service(&self, service: &Service) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE services
            SET name = $2, description = $3, base_price = $4, worker_rate = $5,
                duration_minutes = $6, category = $7, is_active = $8, image_url = $9
            WHERE id = $1
            "#,
        )
        .bind(service.id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.base_price)
        .bind(service.worker_rate)
        .bind(service.duration_minutes)
        .bind(&service.category)
        .bind(service.is_active)
        .bind(&service.image_url)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing { entity: "service", id: service.id });
        }
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        let row: Option<AppointmentRow> =
            sqlx::query_as("SELECT * FROM appointments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Appointment::try_from).transpose()
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(
            r#"
            SELECT * FROM appointments
            WHERE ($1::UUID IS NULL OR client_id = $1)
              AND ($2::UUID IS NULL OR assigned_worker_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
              AND (NOT $4 OR is_published)
            ORDER BY appointment_date, appointment_time, created_at
            "#,
        )
        .bind(filter.client_id)
        .bind(filter.assigned_worker_id)
        .bind(filter.status)
        .bind(filter.published_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> StoreResult<()> {
        let worker = appointment.assigned_worker.as_ref();
        let reschedule = appointment.reschedule.as_ref();
        sqlx::query(
            r#"
            INSERT INTO appointments (
                id, service_id, service_name, client_id, client_name, client_email, client_phone,
                assigned_worker_id, assigned_worker_name, appointment_date, appointment_time,
                requested_date, requested_time, reschedule_reason, final_price, worker_rate,
                status, payment_status, is_published, created_by, cancellation_reason,
                created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(appointment.id)
        .bind(appointment.service_id)
        .bind(&appointment.service_name)
        .bind(appointment.client_id)
        .bind(&appointment.client_name)
        .bind(&appointment.client_email)
        .bind(&appointment.client_phone)
        .bind(worker.map(|w| w.id))
        .bind(worker.map(|w| w.name.clone()))
        .bind(appointment.date)
        .bind(appointment.time)
        .bind(reschedule.map(|r| r.date))
        .bind(reschedule.map(|r| r.time))
        .bind(reschedule.map(|r| r.reason.clone()))
        .bind(appointment.final_price)
        .bind(appointment.worker_rate)
        .bind(appointment.status)
        .bind(appointment.payment_status)
        .bind(appointment.is_published)
        .bind(appointment.created_by)
        .bind(&appointment.cancellation_reason)
        .bind(appointment.created_at)
        .bind(appointment.updated_at)
        .bind(appointment.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> StoreResult<Appointment> {
        match write_appointment(&self.pool, appointment).await? {
            Some(row) => Appointment::try_from(row),
            None => Err(self.rejected_write(appointment).await),
        }
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Payment::from))
    }

    async fn get_payment_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as("SELECT * FROM payments WHERE appointment_id = $1")
                .bind(appointment_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Payment::from))
    }

    async fn list_payments(&self) -> StoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> =
            sqlx::query_as("SELECT * FROM payments ORDER BY due_date, created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(convert_all(rows))
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, appointment_id, client_id, client_name, worker_id,
                                  worker_name, total_amount, worker_amount, payment_date,
                                  due_date, is_paid, payment_method, paid_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(payment.id)
        .bind(payment.appointment_id)
        .bind(payment.client_id)
        .bind(&payment.client_name)
        .bind(payment.worker_id)
        .bind(&payment.worker_name)
        .bind(payment.total_amount)
        .bind(payment.worker_amount)
        .bind(payment.date)
        .bind(payment.due_date)
        .bind(payment.is_paid)
        .bind(payment.payment_method)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate {
                    entity: "payment for appointment",
                    id: payment.appointment_id,
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> StoreResult<()> {
        write_payment(&self.pool, payment).await
    }

    async fn settle_payment(
        &self,
        payment: &Payment,
        appointment: &Appointment,
    ) -> StoreResult<Appointment> {
        let mut tx = self.pool.begin().await?;
        write_payment(&mut *tx, payment).await?;
        match write_appointment(&mut *tx, appointment).await? {
            Some(row) => {
                tx.commit().await?;
                Appointment::try_from(row)
            }
            None => {
                tx.rollback().await?;
                Err(self.rejected_write(appointment).await)
            }
        }
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, kind, is_read,
                                       related_id, related_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind)
        .bind(notification.is_read)
        .bind(notification.related_id)
        .bind(notification.related_type)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        let row: Option<NotificationRow> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Notification::from))
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(convert_all(rows))
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing { entity: "notification", id });
        }
        Ok(())
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, target_type, target_id, user_id, user_name, user_role,
                                  content, is_internal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(comment.id)
        .bind(comment.target_type)
        .bind(comment.target_id)
        .bind(comment.user_id)
        .bind(&comment.user_name)
        .bind(comment.user_role)
        .bind(&comment.content)
        .bind(comment.is_internal)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_comments(
        &self,
        target_type: CommentTarget,
        target_id: Uuid,
    ) -> StoreResult<Vec<Comment>> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            r#"
            SELECT * FROM comments
            WHERE target_type = $1 AND target_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(target_type)
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(convert_all(rows))
    }
}

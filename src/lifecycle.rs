//! # Appointment Lifecycle Engine
//!
//! Every appointment mutation goes through this module. Each operation:
//!
//! 1. checks the actor's role (and ownership where it applies)
//! 2. takes the appointment's lock and loads the current record
//! 3. validates the transition against the current status
//! 4. commits all changed fields in one versioned write
//! 5. asks the payment ledger and the notification dispatcher to react
//!
//! A rejected operation leaves the record untouched. Side effects in step 5
//! run after the commit and are logged, never propagated: a lost
//! notification must not undo a transition.
//!
//! ```text
//!            book / create
//!                 │
//!                 ▼
//!   ┌──────── pending ──────────┐ assignWorker / requestAppointment
//!   │            │  ▲           ▼
//!   │  request-  │  │ reject  assigned ──── markCompleted ──▶ completed
//!   │  Reschedule▼  │           │  ▲
//!   │      reschedule-requested◀┘  │ approve / reject
//!   │            │                 │
//!   └─── cancel ─┴──── cancel ─────┴──▶ cancelled
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::ledger::PaymentLedger;
use crate::locks::AppointmentLocks;
use crate::models::{
    Actor, Appointment, AppointmentStatus, CreatedBy, NotificationKind, Payment, PaymentMethod,
    PaymentStatus, RelatedType, RescheduleRequest, Role, Service, User, WorkerRef,
};
use crate::notifications::{Draft, NotificationDispatcher};
use crate::store::EntityStore;

/// Client booking of an active service.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Admin-originated appointment on behalf of a client.
#[derive(Debug, Clone)]
pub struct AdminBookingRequest {
    pub service_id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub final_price: Option<f64>,
    pub worker_rate: Option<f64>,
    pub is_published: bool,
}

/// Client-proposed replacement slot.
#[derive(Debug, Clone)]
pub struct RescheduleProposal {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: String,
}

pub struct LifecycleEngine {
    store: Arc<dyn EntityStore>,
    notifier: NotificationDispatcher,
    ledger: PaymentLedger,
    locks: AppointmentLocks,
}

fn require_role(actor: &Actor, allowed: &[Role], operation: &str) -> BookingResult<()> {
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(BookingError::permission(format!(
            "{} may not {}",
            actor.role, operation
        )))
    }
}

fn require_status(
    appointment: &Appointment,
    allowed: &[AppointmentStatus],
    operation: &str,
) -> BookingResult<()> {
    if allowed.contains(&appointment.status) {
        Ok(())
    } else {
        Err(BookingError::conflict(format!(
            "cannot {} appointment {} while it is {}",
            operation, appointment.id, appointment.status
        )))
    }
}

fn validate_amount(field: &str, value: f64) -> BookingResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(BookingError::validation(format!(
            "{field} must be a non-negative amount"
        )))
    }
}

fn slot(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M"))
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        notifier: NotificationDispatcher,
        ledger: PaymentLedger,
    ) -> Self {
        Self {
            store,
            notifier,
            ledger,
            locks: AppointmentLocks::new(),
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// A client books an active service. The price and the worker's cut are
    /// snapshotted from the service at this moment.
    pub async fn book(&self, actor: &Actor, request: BookingRequest) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Client], "book appointments")?;
        let service = self.load_service(request.service_id).await?;
        if !service.is_active {
            return Err(BookingError::validation(format!(
                "service '{}' is not available for booking",
                service.name
            )));
        }
        let client = self.load_user(actor.id).await?;

        let appointment = new_appointment(
            &service,
            &client,
            request.date,
            request.time,
            service.base_price,
            service.worker_rate,
            true,
            CreatedBy::Client,
        );
        self.store.insert_appointment(&appointment).await?;

        info!(
            "Appointment {} booked by client {} for {} at {}",
            appointment.id,
            client.id,
            service.name,
            slot(appointment.date, appointment.time)
        );

        let booked = Draft::new(
            NotificationKind::Info,
            "New booking",
            format!(
                "{} booked {} for {}",
                appointment.client_name,
                appointment.service_name,
                slot(appointment.date, appointment.time)
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify_role(Role::Admin, None, &booked).await;
        self.announce_to_workers(&appointment).await;

        Ok(appointment)
    }

    /// An admin creates an appointment for a client, optionally overriding the
    /// service's prices and keeping it unpublished.
    pub async fn create_for_client(
        &self,
        actor: &Actor,
        request: AdminBookingRequest,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin], "create appointments for clients")?;
        let service = self.load_service(request.service_id).await?;
        let client = self.load_user(request.client_id).await?;
        if client.role != Role::Client {
            return Err(BookingError::validation(format!(
                "user {} is not a client",
                client.id
            )));
        }
        let final_price = request.final_price.unwrap_or(service.base_price);
        let worker_rate = request.worker_rate.unwrap_or(service.worker_rate);
        validate_amount("final_price", final_price)?;
        validate_amount("worker_rate", worker_rate)?;

        let appointment = new_appointment(
            &service,
            &client,
            request.date,
            request.time,
            final_price,
            worker_rate,
            request.is_published,
            CreatedBy::Admin,
        );
        self.store.insert_appointment(&appointment).await?;

        info!(
            "Appointment {} created by admin {} for client {} ({})",
            appointment.id, actor.id, client.id, service.name
        );

        let scheduled = Draft::new(
            NotificationKind::Info,
            "Appointment scheduled",
            format!(
                "Your {} appointment is scheduled for {}",
                appointment.service_name,
                slot(appointment.date, appointment.time)
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify(client.id, &scheduled).await;
        if appointment.is_published {
            self.announce_to_workers(&appointment).await;
        }

        Ok(appointment)
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// An admin assigns a worker to a pending appointment.
    pub async fn assign_worker(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin], "assign workers")?;
        let worker = self.load_user(worker_id).await?;
        if worker.role != Role::Worker {
            return Err(BookingError::validation(format!(
                "user {} is not a worker",
                worker.id
            )));
        }

        let (_, appointment) = self
            .transition(appointment_id, "assign", |apt| {
                require_status(apt, &[AppointmentStatus::Pending], "assign a worker to")?;
                apt.assigned_worker = Some(WorkerRef {
                    id: worker.id,
                    name: worker.name.clone(),
                });
                apt.status = AppointmentStatus::Assigned;
                Ok(())
            })
            .await?;

        self.open_payment(&appointment).await;
        self.confirm_to_client(&appointment).await;
        let assigned = Draft::new(
            NotificationKind::Info,
            "New assignment",
            format!(
                "You were assigned {} with {} on {} ({:.2} earnings)",
                appointment.service_name,
                appointment.client_name,
                slot(appointment.date, appointment.time),
                appointment.worker_rate
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify(worker.id, &assigned).await;

        Ok(appointment)
    }

    /// A worker claims a published pending appointment for themselves.
    pub async fn request_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Worker], "claim appointments")?;
        let worker = WorkerRef {
            id: actor.id,
            name: actor.name.clone(),
        };

        let (_, appointment) = self
            .transition(appointment_id, "claim", |apt| {
                if !apt.is_published {
                    return Err(BookingError::permission(format!(
                        "appointment {} is not published",
                        apt.id
                    )));
                }
                require_status(apt, &[AppointmentStatus::Pending], "claim")?;
                apt.assigned_worker = Some(worker);
                apt.status = AppointmentStatus::Assigned;
                Ok(())
            })
            .await?;

        self.open_payment(&appointment).await;
        self.confirm_to_client(&appointment).await;
        let claimed = Draft::new(
            NotificationKind::Info,
            "Appointment claimed",
            format!(
                "{} took {} with {} on {}",
                actor.name,
                appointment.service_name,
                appointment.client_name,
                slot(appointment.date, appointment.time)
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify_role(Role::Admin, None, &claimed).await;

        Ok(appointment)
    }

    // ========================================================================
    // Rescheduling
    // ========================================================================

    /// The owning client proposes a new slot.
    pub async fn request_reschedule(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        proposal: RescheduleProposal,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Client], "request reschedules")?;
        let client_id = actor.id;

        let (_, appointment) = self
            .transition(appointment_id, "request reschedule", |apt| {
                if apt.client_id != client_id {
                    return Err(BookingError::permission(
                        "clients can only reschedule their own appointments",
                    ));
                }
                require_status(
                    apt,
                    &[AppointmentStatus::Pending, AppointmentStatus::Assigned],
                    "reschedule",
                )?;
                apt.reschedule = Some(RescheduleRequest {
                    date: proposal.date,
                    time: proposal.time,
                    reason: proposal.reason.trim().to_string(),
                });
                apt.status = AppointmentStatus::RescheduleRequested;
                Ok(())
            })
            .await?;

        let requested = appointment
            .reschedule
            .as_ref()
            .map(|r| slot(r.date, r.time))
            .unwrap_or_default();
        let draft = Draft::new(
            NotificationKind::Warning,
            "Reschedule requested",
            format!(
                "{} asked to move {} from {} to {}",
                appointment.client_name,
                appointment.service_name,
                slot(appointment.date, appointment.time),
                requested
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify_role(Role::Admin, None, &draft).await;
        if let Some(worker_id) = appointment.worker_id() {
            self.notifier.notify(worker_id, &draft).await;
        }

        Ok(appointment)
    }

    /// An admin accepts the proposed slot. The appointment returns to
    /// `assigned`, or to `pending` when no worker has been assigned yet.
    pub async fn approve_reschedule(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin], "approve reschedules")?;

        let (before, appointment) = self
            .transition(appointment_id, "approve reschedule", |apt| {
                require_status(
                    apt,
                    &[AppointmentStatus::RescheduleRequested],
                    "approve a reschedule for",
                )?;
                let request = apt.reschedule.take().ok_or_else(|| {
                    BookingError::conflict(format!(
                        "appointment {} has no pending reschedule request",
                        apt.id
                    ))
                })?;
                apt.date = request.date;
                apt.time = request.time;
                apt.status = apt.settled_status();
                Ok(())
            })
            .await?;

        let draft = Draft::new(
            NotificationKind::Success,
            "Reschedule approved",
            format!(
                "{} moved from {} to {}",
                appointment.service_name,
                slot(before.date, before.time),
                slot(appointment.date, appointment.time)
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify(appointment.client_id, &draft).await;
        if let Some(worker_id) = appointment.worker_id() {
            self.notifier.notify(worker_id, &draft).await;
        }

        Ok(appointment)
    }

    /// An admin declines the proposed slot; the appointment keeps its
    /// original date and returns to its pre-request status.
    pub async fn reject_reschedule(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin], "reject reschedules")?;

        let (_, appointment) = self
            .transition(appointment_id, "reject reschedule", |apt| {
                require_status(
                    apt,
                    &[AppointmentStatus::RescheduleRequested],
                    "reject a reschedule for",
                )?;
                apt.reschedule = None;
                apt.status = apt.settled_status();
                Ok(())
            })
            .await?;

        let draft = Draft::new(
            NotificationKind::Warning,
            "Reschedule declined",
            format!(
                "Your {} appointment stays on {}",
                appointment.service_name,
                slot(appointment.date, appointment.time)
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify(appointment.client_id, &draft).await;

        Ok(appointment)
    }

    // ========================================================================
    // Completion and cancellation
    // ========================================================================

    /// An admin, or the owning client, cancels a non-terminal appointment.
    /// The payment record, if any, is left untouched.
    pub async fn cancel(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        reason: &str,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin, Role::Client], "cancel appointments")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BookingError::validation("a cancellation reason is required"));
        }
        let actor_id = actor.id;
        let is_admin = actor.is_admin();

        let (_, appointment) = self
            .transition(appointment_id, "cancel", |apt| {
                if !is_admin && apt.client_id != actor_id {
                    return Err(BookingError::permission(
                        "clients can only cancel their own appointments",
                    ));
                }
                if apt.status.is_terminal() {
                    return Err(BookingError::conflict(format!(
                        "appointment {} is already {}",
                        apt.id, apt.status
                    )));
                }
                apt.reschedule = None;
                apt.cancellation_reason = Some(reason.to_string());
                apt.status = AppointmentStatus::Cancelled;
                Ok(())
            })
            .await?;

        let draft = Draft::new(
            NotificationKind::Warning,
            "Appointment cancelled",
            format!(
                "{} for {} on {} was cancelled: {}",
                appointment.service_name,
                appointment.client_name,
                slot(appointment.date, appointment.time),
                reason
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        if is_admin {
            self.notifier.notify(appointment.client_id, &draft).await;
        } else {
            self.notifier.notify_role(Role::Admin, None, &draft).await;
        }
        if let Some(worker_id) = appointment.worker_id() {
            self.notifier.notify(worker_id, &draft).await;
        }

        Ok(appointment)
    }

    /// An admin or the assigned worker marks the service as delivered.
    pub async fn mark_completed(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin, Role::Worker], "complete appointments")?;
        let actor_id = actor.id;
        let is_admin = actor.is_admin();

        let (_, appointment) = self
            .transition(appointment_id, "complete", |apt| {
                if !is_admin && !apt.is_assigned_to(actor_id) {
                    return Err(BookingError::permission(
                        "workers can only complete appointments assigned to them",
                    ));
                }
                require_status(apt, &[AppointmentStatus::Assigned], "complete")?;
                apt.status = AppointmentStatus::Completed;
                Ok(())
            })
            .await?;

        self.open_payment(&appointment).await;
        let draft = Draft::new(
            NotificationKind::Success,
            "Appointment completed",
            format!(
                "{} with {} is complete",
                appointment.service_name,
                appointment
                    .assigned_worker
                    .as_ref()
                    .map(|w| w.name.as_str())
                    .unwrap_or("your stylist")
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify(appointment.client_id, &draft).await;
        if !is_admin {
            self.notifier.notify_role(Role::Admin, None, &draft).await;
        }

        Ok(appointment)
    }

    // ========================================================================
    // Billing
    // ========================================================================

    /// An admin records a payment as settled. The ledger writes the paid
    /// payment and the appointment's payment status together, so a failed
    /// write leaves both untouched and the confirmation can be retried.
    pub async fn confirm_payment(
        &self,
        actor: &Actor,
        payment_id: Uuid,
        method: PaymentMethod,
    ) -> BookingResult<Payment> {
        require_role(actor, &[Role::Admin], "confirm payments")?;
        let payment = self.ledger.get(payment_id).await?;

        let guard = self.locks.acquire(payment.appointment_id).await;
        let (payment, appointment) = self.ledger.confirm_payment(payment_id, method).await?;
        drop(guard);

        let draft = Draft::new(
            NotificationKind::Success,
            "Payment confirmed",
            format!(
                "Payment of {:.2} for {} received ({})",
                payment.total_amount, appointment.service_name, method
            ),
        )
        .about(payment.id, RelatedType::Payment);
        self.notifier
            .notify_all([payment.client_id, payment.worker_id], &draft)
            .await;

        Ok(payment)
    }

    /// Override the snapshotted prices of a still-pending appointment.
    pub async fn override_pricing(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        final_price: f64,
        worker_rate: f64,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin], "override prices")?;
        validate_amount("final_price", final_price)?;
        validate_amount("worker_rate", worker_rate)?;
        if worker_rate > final_price {
            warn!(
                "Worker rate {:.2} exceeds final price {:.2} on appointment {}",
                worker_rate, final_price, appointment_id
            );
        }

        let (_, appointment) = self
            .transition(appointment_id, "override pricing", |apt| {
                require_status(apt, &[AppointmentStatus::Pending], "reprice")?;
                apt.final_price = final_price;
                apt.worker_rate = worker_rate;
                Ok(())
            })
            .await?;
        Ok(appointment)
    }

    /// Publish or withdraw a pending appointment from the worker pool.
    pub async fn set_published(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        published: bool,
    ) -> BookingResult<Appointment> {
        require_role(actor, &[Role::Admin], "publish appointments")?;

        let (before, appointment) = self
            .transition(appointment_id, "publish", |apt| {
                require_status(apt, &[AppointmentStatus::Pending], "change visibility of")?;
                apt.is_published = published;
                Ok(())
            })
            .await?;

        if published && !before.is_published {
            self.announce_to_workers(&appointment).await;
        }
        Ok(appointment)
    }

    /// Flag appointments whose payment is past due. Cancelled appointments and
    /// appointments already marked paid or overdue are left alone. Returns the
    /// ids that were flagged.
    pub async fn sweep_overdue(&self, today: NaiveDate) -> BookingResult<Vec<Uuid>> {
        let candidates = self.ledger.overdue(today).await?;
        let mut flagged = Vec::new();

        for candidate in candidates {
            let guard = self.locks.acquire(candidate.appointment_id).await;
            // Re-read under the lock: the payment may have been confirmed since.
            let payment = match self.store.get_payment(candidate.id).await? {
                Some(payment) if payment.is_overdue(today) => payment,
                _ => continue,
            };
            let result = self
                .apply_locked(payment.appointment_id, "flag overdue", |apt| {
                    if apt.status == AppointmentStatus::Cancelled
                        || apt.payment_status != PaymentStatus::Pending
                    {
                        return Err(BookingError::conflict("not eligible"));
                    }
                    apt.payment_status = PaymentStatus::Overdue;
                    Ok(())
                })
                .await;
            drop(guard);

            match result {
                Ok((_, appointment)) => {
                    info!(
                        "Payment {} for appointment {} is overdue (due {})",
                        payment.id, appointment.id, payment.due_date
                    );
                    let draft = Draft::new(
                        NotificationKind::Warning,
                        "Payment overdue",
                        format!(
                            "{} has an overdue payment of {:.2} for {}",
                            payment.client_name, payment.total_amount, appointment.service_name
                        ),
                    )
                    .about(payment.id, RelatedType::Payment);
                    self.notifier.notify_role(Role::Admin, None, &draft).await;
                    self.notifier.notify(payment.client_id, &draft).await;
                    flagged.push(appointment.id);
                }
                Err(BookingError::StateConflict(_)) | Err(BookingError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(flagged)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Lock, load, mutate and commit one appointment. Returns the record as
    /// it was before and after the transition.
    async fn transition<F>(
        &self,
        appointment_id: Uuid,
        operation: &str,
        apply: F,
    ) -> BookingResult<(Appointment, Appointment)>
    where
        F: FnOnce(&mut Appointment) -> BookingResult<()> + Send,
    {
        let _guard = self.locks.acquire(appointment_id).await;
        self.apply_locked(appointment_id, operation, apply).await
    }

    /// Same as `transition` for callers already holding the lock.
    async fn apply_locked<F>(
        &self,
        appointment_id: Uuid,
        operation: &str,
        apply: F,
    ) -> BookingResult<(Appointment, Appointment)>
    where
        F: FnOnce(&mut Appointment) -> BookingResult<()> + Send,
    {
        let before = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment", appointment_id))?;

        let mut next = before.clone();
        if let Err(e) = apply(&mut next) {
            debug!("Rejected {} on appointment {}: {}", operation, appointment_id, e);
            return Err(e);
        }
        if let Some(violation) = next.invariant_violation() {
            error!(
                "Refusing {} on appointment {}: {}",
                operation, appointment_id, violation
            );
            return Err(BookingError::conflict(format!(
                "{operation} would leave appointment {appointment_id} inconsistent: {violation}"
            )));
        }
        next.updated_at = Utc::now();

        let committed = self.store.update_appointment(&next).await?;
        info!(
            "Appointment {} {}: {} -> {}",
            appointment_id, operation, before.status, committed.status
        );
        Ok((before, committed))
    }

    async fn load_service(&self, service_id: Uuid) -> BookingResult<Service> {
        self.store
            .get_service(service_id)
            .await?
            .ok_or_else(|| BookingError::not_found("service", service_id))
    }

    async fn load_user(&self, user_id: Uuid) -> BookingResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| BookingError::not_found("user", user_id))
    }

    async fn open_payment(&self, appointment: &Appointment) {
        if let Err(e) = self.ledger.ensure_payment(appointment).await {
            error!(
                "Failed to open payment for appointment {}: {}",
                appointment.id, e
            );
        }
    }

    async fn confirm_to_client(&self, appointment: &Appointment) {
        let worker = appointment
            .assigned_worker
            .as_ref()
            .map(|w| w.name.as_str())
            .unwrap_or_default();
        let draft = Draft::new(
            NotificationKind::Success,
            "Appointment confirmed",
            format!(
                "Your {} appointment on {} is confirmed with {}",
                appointment.service_name,
                slot(appointment.date, appointment.time),
                worker
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify(appointment.client_id, &draft).await;
    }

    async fn announce_to_workers(&self, appointment: &Appointment) {
        if !appointment.is_published {
            return;
        }
        let draft = Draft::new(
            NotificationKind::Info,
            "New appointment available",
            format!(
                "{} - {} - {:.2} earnings",
                appointment.service_name, appointment.client_name, appointment.worker_rate
            ),
        )
        .about(appointment.id, RelatedType::Appointment);
        self.notifier.notify_role(Role::Worker, None, &draft).await;
    }
}

#[allow(clippy::too_many_arguments)]
fn new_appointment(
    service: &Service,
    client: &User,
    date: NaiveDate,
    time: NaiveTime,
    final_price: f64,
    worker_rate: f64,
    is_published: bool,
    created_by: CreatedBy,
) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        service_id: service.id,
        service_name: service.name.clone(),
        client_id: client.id,
        client_name: client.name.clone(),
        client_email: Some(client.email.clone()),
        client_phone: client.phone.clone(),
        assigned_worker: None,
        date,
        time,
        reschedule: None,
        final_price,
        worker_rate,
        status: AppointmentStatus::Pending,
        payment_status: PaymentStatus::Pending,
        is_published,
        created_by,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ServiceCatalog, ServicePatch};
    use crate::store::MemoryStore;

    struct Salon {
        store: Arc<MemoryStore>,
        engine: LifecycleEngine,
        admin: Actor,
        worker: Actor,
        other_worker: Actor,
        client: Actor,
        other_client: Actor,
        manicure: Service,
    }

    async fn add_user(store: &MemoryStore, name: &str, role: Role) -> Actor {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@nikybeautystudio.test", name.to_lowercase().replace(' ', ".")),
            phone: None,
            role,
            created_at: Utc::now(),
        };
        store.insert_user(&user).await.unwrap();
        Actor::from(&user)
    }

    async fn salon() -> Salon {
        let store = Arc::new(MemoryStore::new());
        let admin = add_user(&store, "Administradora NBS", Role::Admin).await;
        let worker = add_user(&store, "Sofía", Role::Worker).await;
        let other_worker = add_user(&store, "Lucía", Role::Worker).await;
        let client = add_user(&store, "María González", Role::Client).await;
        let other_client = add_user(&store, "Ana Torres", Role::Client).await;

        let manicure = Service {
            id: Uuid::new_v4(),
            name: "Manicure Clásico".to_string(),
            description: "Limpieza, corte y esmaltado básico".to_string(),
            base_price: 25.0,
            worker_rate: 15.0,
            duration_minutes: 60,
            category: "Uñas".to_string(),
            is_active: true,
            image_url: None,
            created_at: Utc::now(),
        };
        store.insert_service(&manicure).await.unwrap();

        let notifier = NotificationDispatcher::new(store.clone());
        let ledger = PaymentLedger::new(store.clone(), 0);
        let engine = LifecycleEngine::new(store.clone(), notifier, ledger);
        Salon {
            store,
            engine,
            admin,
            worker,
            other_worker,
            client,
            other_client,
            manicure,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
    }

    fn time(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap()
    }

    impl Salon {
        async fn book(&self) -> Appointment {
            self.engine
                .book(
                    &self.client,
                    BookingRequest {
                        service_id: self.manicure.id,
                        date: date(1),
                        time: time(10),
                    },
                )
                .await
                .unwrap()
        }

        async fn assigned(&self) -> Appointment {
            let apt = self.book().await;
            self.engine
                .assign_worker(&self.admin, apt.id, self.worker.id)
                .await
                .unwrap()
        }

        async fn notifications_for(&self, actor: &Actor) -> usize {
            self.store.list_notifications(actor.id).await.unwrap().len()
        }

        async fn stored(&self, id: Uuid) -> Appointment {
            self.store.get_appointment(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn client_booking_snapshots_service_prices() {
        let salon = salon().await;
        let apt = salon.book().await;

        assert_eq!(apt.status, AppointmentStatus::Pending);
        assert_eq!(apt.payment_status, PaymentStatus::Pending);
        assert_eq!(apt.final_price, 25.0);
        assert_eq!(apt.worker_rate, 15.0);
        assert_eq!(apt.created_by, CreatedBy::Client);
        assert!(apt.is_published);
        assert_eq!(apt.service_name, "Manicure Clásico");
        assert_eq!(apt.client_name, "María González");

        // Admin and both workers hear about the new booking.
        assert_eq!(salon.notifications_for(&salon.admin).await, 1);
        assert_eq!(salon.notifications_for(&salon.worker).await, 1);
        assert_eq!(salon.notifications_for(&salon.other_worker).await, 1);
    }

    #[tokio::test]
    async fn catalog_edits_do_not_reach_booked_appointments() {
        let salon = salon().await;
        let apt = salon.book().await;

        let catalog = ServiceCatalog::new(salon.store.clone());
        catalog
            .update(
                &salon.admin,
                salon.manicure.id,
                ServicePatch {
                    name: Some("Manicure Premium".to_string()),
                    base_price: Some(99.0),
                    worker_rate: Some(60.0),
                    is_active: Some(false),
                    ..ServicePatch::default()
                },
            )
            .await
            .unwrap();

        let stored = salon.stored(apt.id).await;
        assert_eq!(stored.service_name, "Manicure Clásico");
        assert_eq!(stored.final_price, 25.0);
        assert_eq!(stored.worker_rate, 15.0);

        let assigned = salon
            .engine
            .assign_worker(&salon.admin, apt.id, salon.worker.id)
            .await
            .unwrap();
        assert_eq!(assigned.status, AppointmentStatus::Assigned);
        assert_eq!(assigned.service_name, "Manicure Clásico");
        assert_eq!(assigned.final_price, 25.0);

        let payment = salon.store.get_payment_for_appointment(apt.id).await.unwrap().unwrap();
        assert_eq!(payment.total_amount, 25.0);
        assert_eq!(payment.worker_amount, 15.0);
    }

    #[tokio::test]
    async fn booking_an_inactive_service_is_a_validation_error() {
        let salon = salon().await;
        let mut retired = salon.manicure.clone();
        retired.is_active = false;
        salon.store.update_service(&retired).await.unwrap();

        let err = salon
            .engine
            .book(
                &salon.client,
                BookingRequest {
                    service_id: retired.id,
                    date: date(1),
                    time: time(10),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert!(salon
            .store
            .list_appointments(&Default::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn only_clients_book() {
        let salon = salon().await;
        let err = salon
            .engine
            .book(
                &salon.worker,
                BookingRequest {
                    service_id: salon.manicure.id,
                    date: date(1),
                    time: time(10),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));
    }

    #[tokio::test]
    async fn admin_assignment_notifies_client_and_opens_payment() {
        let salon = salon().await;
        let apt = salon.book().await;
        let client_before = salon.notifications_for(&salon.client).await;

        let assigned = salon
            .engine
            .assign_worker(&salon.admin, apt.id, salon.worker.id)
            .await
            .unwrap();

        assert_eq!(assigned.status, AppointmentStatus::Assigned);
        assert_eq!(assigned.assigned_worker.as_ref().unwrap().name, "Sofía");
        assert_eq!(salon.notifications_for(&salon.client).await, client_before + 1);

        let payment = salon
            .store
            .get_payment_for_appointment(apt.id)
            .await
            .unwrap()
            .expect("payment opened on assignment");
        assert_eq!(payment.total_amount, 25.0);
        assert_eq!(payment.worker_amount, 15.0);
        assert!(!payment.is_paid);
    }

    #[tokio::test]
    async fn assigning_a_non_pending_appointment_conflicts() {
        let salon = salon().await;
        let apt = salon.assigned().await;

        let err = salon
            .engine
            .assign_worker(&salon.admin, apt.id, salon.other_worker.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
        assert_eq!(salon.stored(apt.id).await.worker_id(), Some(salon.worker.id));
    }

    #[tokio::test]
    async fn assigning_a_client_as_worker_is_rejected() {
        let salon = salon().await;
        let apt = salon.book().await;
        let err = salon
            .engine
            .assign_worker(&salon.admin, apt.id, salon.other_client.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn worker_claims_published_pending_appointment() {
        let salon = salon().await;
        let apt = salon.book().await;

        let claimed = salon
            .engine
            .request_appointment(&salon.worker, apt.id)
            .await
            .unwrap();
        assert_eq!(claimed.status, AppointmentStatus::Assigned);
        assert_eq!(claimed.worker_id(), Some(salon.worker.id));

        let err = salon
            .engine
            .request_appointment(&salon.other_worker, apt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
    }

    #[tokio::test]
    async fn unpublished_appointment_cannot_be_claimed() {
        let salon = salon().await;
        let apt = salon
            .engine
            .create_for_client(
                &salon.admin,
                AdminBookingRequest {
                    service_id: salon.manicure.id,
                    client_id: salon.client.id,
                    date: date(3),
                    time: time(9),
                    final_price: Some(20.0),
                    worker_rate: None,
                    is_published: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(apt.created_by, CreatedBy::Admin);
        assert_eq!(apt.final_price, 20.0);
        assert_eq!(apt.worker_rate, 15.0);

        let err = salon
            .engine
            .request_appointment(&salon.worker, apt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));

        salon.engine.set_published(&salon.admin, apt.id, true).await.unwrap();
        salon
            .engine
            .request_appointment(&salon.worker, apt.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn approved_reschedule_moves_the_slot() {
        let salon = salon().await;
        let apt = salon.assigned().await;

        let requested = salon
            .engine
            .request_reschedule(
                &salon.client,
                apt.id,
                RescheduleProposal {
                    date: date(2),
                    time: time(11),
                    reason: "conflict".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(requested.status, AppointmentStatus::RescheduleRequested);
        let request = requested.reschedule.as_ref().unwrap();
        assert_eq!(request.date, date(2));
        assert_eq!(request.time, time(11));
        assert_eq!(request.reason, "conflict");

        let approved = salon.engine.approve_reschedule(&salon.admin, apt.id).await.unwrap();
        assert_eq!(approved.status, AppointmentStatus::Assigned);
        assert_eq!(approved.date, date(2));
        assert_eq!(approved.time, time(11));
        assert!(approved.reschedule.is_none());
    }

    #[tokio::test]
    async fn rejected_reschedule_restores_prior_status() {
        let salon = salon().await;
        for assign in [false, true] {
            let apt = if assign {
                salon.assigned().await
            } else {
                salon.book().await
            };
            let prior = apt.status;

            salon
                .engine
                .request_reschedule(
                    &salon.client,
                    apt.id,
                    RescheduleProposal {
                        date: date(5),
                        time: time(15),
                        reason: "travel".to_string(),
                    },
                )
                .await
                .unwrap();
            let rejected = salon.engine.reject_reschedule(&salon.admin, apt.id).await.unwrap();

            assert_eq!(rejected.status, prior);
            assert!(rejected.reschedule.is_none());
            assert_eq!(rejected.date, date(1));
            assert_eq!(rejected.time, time(10));
        }
    }

    #[tokio::test]
    async fn approve_without_request_conflicts() {
        let salon = salon().await;
        let apt = salon.assigned().await;
        let err = salon
            .engine
            .approve_reschedule(&salon.admin, apt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
    }

    #[tokio::test]
    async fn clients_cannot_reschedule_others_appointments() {
        let salon = salon().await;
        let apt = salon.book().await;
        let err = salon
            .engine
            .request_reschedule(
                &salon.other_client,
                apt.id,
                RescheduleProposal {
                    date: date(2),
                    time: time(11),
                    reason: "mine now".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));
        assert_eq!(salon.stored(apt.id).await.status, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_requires_a_reason() {
        let salon = salon().await;
        let apt = salon.book().await;
        let err = salon.engine.cancel(&salon.admin, apt.id, "   ").await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_eq!(salon.stored(apt.id).await.status, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_clears_pending_reschedule() {
        let salon = salon().await;
        let apt = salon.book().await;
        salon
            .engine
            .request_reschedule(
                &salon.client,
                apt.id,
                RescheduleProposal {
                    date: date(9),
                    time: time(12),
                    reason: "sick".to_string(),
                },
            )
            .await
            .unwrap();

        let cancelled = salon
            .engine
            .cancel(&salon.client, apt.id, "Cancelled by client")
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(cancelled.reschedule.is_none());
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Cancelled by client"));

        let err = salon
            .engine
            .cancel(&salon.admin, apt.id, "again")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
    }

    #[tokio::test]
    async fn workers_cannot_cancel_and_clients_only_their_own() {
        let salon = salon().await;
        let apt = salon.assigned().await;

        let err = salon.engine.cancel(&salon.worker, apt.id, "busy").await.unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));

        let err = salon
            .engine
            .cancel(&salon.other_client, apt.id, "not mine")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));
    }

    #[tokio::test]
    async fn cancelling_an_overdue_appointment_leaves_the_ledger_alone() {
        let salon = salon().await;
        let apt = salon.assigned().await;

        let flagged = salon.engine.sweep_overdue(date(2)).await.unwrap();
        assert_eq!(flagged, vec![apt.id]);
        assert_eq!(salon.stored(apt.id).await.payment_status, PaymentStatus::Overdue);

        let cancelled = salon.engine.cancel(&salon.admin, apt.id, "no payment").await.unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("no payment"));
        assert_eq!(cancelled.payment_status, PaymentStatus::Overdue);

        let payment = salon.store.get_payment_for_appointment(apt.id).await.unwrap().unwrap();
        assert!(!payment.is_paid);
    }

    #[tokio::test]
    async fn sweep_skips_paid_cancelled_and_not_yet_due() {
        let salon = salon().await;
        let paid = salon.assigned().await;
        let cancelled = salon.assigned().await;
        let unpaid = salon.assigned().await;

        let payment = salon.store.get_payment_for_appointment(paid.id).await.unwrap().unwrap();
        salon
            .engine
            .confirm_payment(&salon.admin, payment.id, PaymentMethod::Cash)
            .await
            .unwrap();
        salon.engine.cancel(&salon.admin, cancelled.id, "client moved").await.unwrap();

        // Everything is due on 2025-09-01, so the first of the month flags nothing.
        assert!(salon.engine.sweep_overdue(date(1)).await.unwrap().is_empty());

        let flagged = salon.engine.sweep_overdue(date(2)).await.unwrap();
        assert_eq!(flagged, vec![unpaid.id]);
        // A second sweep does not flag or notify again.
        assert!(salon.engine.sweep_overdue(date(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_by_assigned_worker_only() {
        let salon = salon().await;
        let apt = salon.assigned().await;

        let err = salon
            .engine
            .mark_completed(&salon.other_worker, apt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));

        let done = salon.engine.mark_completed(&salon.worker, apt.id).await.unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert_eq!(done.worker_id(), Some(salon.worker.id));

        let err = salon
            .engine
            .request_reschedule(
                &salon.client,
                apt.id,
                RescheduleProposal {
                    date: date(2),
                    time: time(11),
                    reason: "too late".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
    }

    #[tokio::test]
    async fn completing_a_pending_appointment_conflicts() {
        let salon = salon().await;
        let apt = salon.book().await;
        let err = salon.engine.mark_completed(&salon.admin, apt.id).await.unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
    }

    #[tokio::test]
    async fn confirm_payment_marks_appointment_paid() {
        let salon = salon().await;
        let apt = salon.assigned().await;
        let payment = salon.store.get_payment_for_appointment(apt.id).await.unwrap().unwrap();

        let err = salon
            .engine
            .confirm_payment(&salon.client, payment.id, PaymentMethod::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));

        let paid = salon
            .engine
            .confirm_payment(&salon.admin, payment.id, PaymentMethod::Card)
            .await
            .unwrap();
        assert!(paid.is_paid);
        assert_eq!(salon.stored(apt.id).await.payment_status, PaymentStatus::Paid);

        let err = salon
            .engine
            .confirm_payment(&salon.admin, payment.id, PaymentMethod::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
    }

    #[tokio::test]
    async fn pricing_override_only_while_pending() {
        let salon = salon().await;
        let apt = salon.book().await;

        let err = salon
            .engine
            .override_pricing(&salon.admin, apt.id, -1.0, 5.0)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));

        let repriced = salon
            .engine
            .override_pricing(&salon.admin, apt.id, 30.0, 18.0)
            .await
            .unwrap();
        assert_eq!(repriced.final_price, 30.0);
        assert_eq!(repriced.worker_rate, 18.0);

        salon
            .engine
            .assign_worker(&salon.admin, apt.id, salon.worker.id)
            .await
            .unwrap();
        let err = salon
            .engine
            .override_pricing(&salon.admin, apt.id, 10.0, 5.0)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StateConflict(_)));
    }

    #[tokio::test]
    async fn unknown_appointment_is_not_found() {
        let salon = salon().await;
        let err = salon
            .engine
            .approve_reschedule(&salon.admin, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { entity: "appointment", .. }));
    }

    #[tokio::test]
    async fn concurrent_claims_have_a_single_winner() {
        let salon = Arc::new(salon().await);
        let apt = salon.book().await;

        let first = {
            let salon = Arc::clone(&salon);
            tokio::spawn(async move { salon.engine.request_appointment(&salon.worker, apt.id).await })
        };
        let second = {
            let salon = Arc::clone(&salon);
            tokio::spawn(async move {
                salon
                    .engine
                    .request_appointment(&salon.other_worker, apt.id)
                    .await
            })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(BookingError::StateConflict(_)))));
        assert_eq!(
            salon.store.list_payments().await.unwrap().len(),
            1,
            "exactly one payment for the claimed appointment"
        );
    }

    #[tokio::test]
    async fn invariants_hold_across_a_full_lifecycle() {
        let salon = salon().await;
        let apt = salon.book().await;
        let mut seen = vec![salon.stored(apt.id).await];

        salon.engine.request_appointment(&salon.worker, apt.id).await.unwrap();
        seen.push(salon.stored(apt.id).await);
        salon
            .engine
            .request_reschedule(
                &salon.client,
                apt.id,
                RescheduleProposal {
                    date: date(4),
                    time: time(16),
                    reason: "work".to_string(),
                },
            )
            .await
            .unwrap();
        seen.push(salon.stored(apt.id).await);
        salon.engine.approve_reschedule(&salon.admin, apt.id).await.unwrap();
        seen.push(salon.stored(apt.id).await);
        salon.engine.mark_completed(&salon.admin, apt.id).await.unwrap();
        seen.push(salon.stored(apt.id).await);

        for record in &seen {
            assert_eq!(record.invariant_violation(), None, "{:?}", record.status);
            assert_eq!(
                record.status == AppointmentStatus::RescheduleRequested,
                record.reschedule.is_some()
            );
            assert_eq!(
                record.status == AppointmentStatus::Cancelled,
                record.cancellation_reason.is_some()
            );
        }
        let versions: Vec<i64> = seen.iter().map(|a| a.version).collect();
        assert_eq!(versions, vec![0, 1, 2, 3, 4]);
    }
}

//! # Role-Scoped Query Layer
//!
//! Read-only views over the entity store. Nothing here mutates or caches:
//! every call reflects the store as it is now.
//!
//! | Role   | Appointments visible                                  |
//! |--------|-------------------------------------------------------|
//! | admin  | all                                                   |
//! | client | own (`client_id == self`)                             |
//! | worker | published AND (pending OR assigned to self)           |

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::models::{
    Actor, Appointment, AppointmentStatus, CreatedBy, Payment, PaymentStatus, Role, Service, User,
};
use crate::store::{AppointmentFilter, EntityStore};

/// Whether `actor` may see `appointment`.
pub fn visible_to(actor: &Actor, appointment: &Appointment) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Client => appointment.client_id == actor.id,
        Role::Worker => {
            appointment.is_published
                && (appointment.status == AppointmentStatus::Pending
                    || appointment.is_assigned_to(actor.id))
        }
    }
}

fn payment_visible_to(actor: &Actor, payment: &Payment) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Client => payment.client_id == actor.id,
        Role::Worker => payment.worker_id == actor.id,
    }
}

/// Earnings overview for a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerEarnings {
    /// Sum of the worker rate over own appointments that were not cancelled.
    pub total_earnings: f64,
    /// Worker share of payments already confirmed.
    pub paid_out: f64,
    pub pending_payout: f64,
    pub assigned_count: usize,
    pub completed_count: usize,
    /// Published pending appointments open for claiming.
    pub available_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminSummary {
    pub total_appointments: usize,
    pub appointments_by_status: BTreeMap<String, usize>,
    pub client_bookings: usize,
    pub pending_reschedules: usize,
    pub unpaid_payments: usize,
    pub overdue_payments: usize,
    pub revenue_collected: f64,
    pub unread_notifications: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientSummary {
    pub total_appointments: usize,
    pub upcoming: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub amount_due: f64,
    pub unread_notifications: usize,
}

/// Role-specific landing view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Admin(AdminSummary),
    Worker(WorkerEarnings),
    Client(ClientSummary),
}

#[derive(Clone)]
pub struct QueryLayer {
    store: Arc<dyn EntityStore>,
}

impl QueryLayer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Appointments visible to `actor`, ordered by date then time.
    pub async fn appointments_for(&self, actor: &Actor) -> BookingResult<Vec<Appointment>> {
        let filter = match actor.role {
            Role::Admin => AppointmentFilter::default(),
            Role::Client => AppointmentFilter::for_client(actor.id),
            Role::Worker => AppointmentFilter::published(),
        };
        let appointments = self.store.list_appointments(&filter).await?;
        Ok(appointments
            .into_iter()
            .filter(|apt| visible_to(actor, apt))
            .collect())
    }

    /// One appointment, reported as not found when the actor cannot see it.
    pub async fn appointment_for(&self, actor: &Actor, id: Uuid) -> BookingResult<Appointment> {
        match self.store.get_appointment(id).await? {
            Some(apt) if visible_to(actor, &apt) => Ok(apt),
            _ => Err(BookingError::not_found("appointment", id)),
        }
    }

    /// Admins see the whole catalog; everyone else only active services.
    pub async fn services_for(&self, actor: &Actor) -> BookingResult<Vec<Service>> {
        let services = self.store.list_services().await?;
        Ok(services
            .into_iter()
            .filter(|service| actor.is_admin() || service.is_active)
            .collect())
    }

    pub async fn payments_for(&self, actor: &Actor) -> BookingResult<Vec<Payment>> {
        let payments = self.store.list_payments().await?;
        Ok(payments
            .into_iter()
            .filter(|payment| payment_visible_to(actor, payment))
            .collect())
    }

    pub async fn users(&self, actor: &Actor, role: Option<Role>) -> BookingResult<Vec<User>> {
        if !actor.is_admin() {
            return Err(BookingError::permission("only admins may list users"));
        }
        Ok(self.store.list_users(role).await?)
    }

    pub async fn worker_earnings(&self, worker_id: Uuid) -> BookingResult<WorkerEarnings> {
        let own = self
            .store
            .list_appointments(&AppointmentFilter {
                assigned_worker_id: Some(worker_id),
                ..AppointmentFilter::default()
            })
            .await?;
        let available = self
            .store
            .list_appointments(&AppointmentFilter {
                status: Some(AppointmentStatus::Pending),
                published_only: true,
                ..AppointmentFilter::default()
            })
            .await?;
        let payments = self.store.list_payments().await?;

        let mut earnings = WorkerEarnings {
            available_count: available.len(),
            ..WorkerEarnings::default()
        };
        for apt in &own {
            match apt.status {
                AppointmentStatus::Cancelled => continue,
                AppointmentStatus::Completed => earnings.completed_count += 1,
                AppointmentStatus::Assigned => earnings.assigned_count += 1,
                _ => {}
            }
            earnings.total_earnings += apt.worker_rate;
        }
        for payment in payments.iter().filter(|p| p.worker_id == worker_id) {
            if payment.is_paid {
                earnings.paid_out += payment.worker_amount;
            } else {
                earnings.pending_payout += payment.worker_amount;
            }
        }
        Ok(earnings)
    }

    pub async fn admin_summary(&self, admin: &Actor) -> BookingResult<AdminSummary> {
        let appointments = self.store.list_appointments(&AppointmentFilter::default()).await?;
        let payments = self.store.list_payments().await?;
        let notifications = self.store.list_notifications(admin.id).await?;

        let mut summary = AdminSummary {
            total_appointments: appointments.len(),
            appointments_by_status: AppointmentStatus::ALL
                .iter()
                .map(|status| (status.to_string(), 0))
                .collect(),
            unread_notifications: notifications.iter().filter(|n| !n.is_read).count(),
            ..AdminSummary::default()
        };
        for apt in &appointments {
            *summary
                .appointments_by_status
                .entry(apt.status.to_string())
                .or_default() += 1;
            if apt.created_by == CreatedBy::Client {
                summary.client_bookings += 1;
            }
            if apt.status == AppointmentStatus::RescheduleRequested {
                summary.pending_reschedules += 1;
            }
            if apt.payment_status == PaymentStatus::Overdue {
                summary.overdue_payments += 1;
            }
        }
        for payment in &payments {
            if payment.is_paid {
                summary.revenue_collected += payment.total_amount;
            } else {
                summary.unpaid_payments += 1;
            }
        }
        Ok(summary)
    }

    pub async fn client_summary(&self, client: &Actor) -> BookingResult<ClientSummary> {
        let appointments = self
            .store
            .list_appointments(&AppointmentFilter::for_client(client.id))
            .await?;
        let payments = self.store.list_payments().await?;
        let notifications = self.store.list_notifications(client.id).await?;

        let mut summary = ClientSummary {
            total_appointments: appointments.len(),
            unread_notifications: notifications.iter().filter(|n| !n.is_read).count(),
            ..ClientSummary::default()
        };
        for apt in &appointments {
            match apt.status {
                AppointmentStatus::Completed => summary.completed += 1,
                AppointmentStatus::Cancelled => summary.cancelled += 1,
                _ => summary.upcoming += 1,
            }
        }
        summary.amount_due = payments
            .iter()
            .filter(|p| p.client_id == client.id && !p.is_paid)
            .map(|p| p.total_amount)
            .sum();
        Ok(summary)
    }

    pub async fn dashboard(&self, actor: &Actor) -> BookingResult<Dashboard> {
        Ok(match actor.role {
            Role::Admin => Dashboard::Admin(self.admin_summary(actor).await?),
            Role::Worker => Dashboard::Worker(self.worker_earnings(actor.id).await?),
            Role::Client => Dashboard::Client(self.client_summary(actor).await?),
        })
    }
}

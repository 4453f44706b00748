//! # Payment Ledger
//!
//! Owns payment records. The lifecycle engine asks for a record when an
//! appointment becomes billable (assigned or completed); the ledger alone
//! flips `is_paid`, and does so in the same store write that marks the
//! appointment paid.
//!
//! `ensure_payment` is idempotent per appointment: the store enforces one
//! payment per appointment id, and a lost insert race resolves to the record
//! that won.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult, StoreError};
use crate::models::{Appointment, AppointmentStatus, Payment, PaymentMethod, PaymentStatus};
use crate::store::EntityStore;

#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn EntityStore>,
    grace_days: i64,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn EntityStore>, grace_days: i64) -> Self {
        Self { store, grace_days }
    }

    pub fn due_date_for(&self, service_date: NaiveDate) -> BookingResult<NaiveDate> {
        Duration::try_days(self.grace_days)
            .and_then(|grace| service_date.checked_add_signed(grace))
            .ok_or_else(|| {
                BookingError::validation(format!(
                    "a grace period of {} days from {service_date} is out of range",
                    self.grace_days
                ))
            })
    }

    /// Return the appointment's payment, creating it on first call.
    pub async fn ensure_payment(&self, appointment: &Appointment) -> BookingResult<Payment> {
        if !matches!(
            appointment.status,
            AppointmentStatus::Assigned | AppointmentStatus::Completed
        ) {
            return Err(BookingError::conflict(format!(
                "appointment {} is {} and not billable",
                appointment.id, appointment.status
            )));
        }
        let worker = appointment.assigned_worker.as_ref().ok_or_else(|| {
            BookingError::conflict(format!("appointment {} has no worker to pay", appointment.id))
        })?;

        if let Some(existing) = self.store.get_payment_for_appointment(appointment.id).await? {
            return Ok(existing);
        }
        let due_date = self.due_date_for(appointment.date)?;

        let payment = Payment {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            client_id: appointment.client_id,
            client_name: appointment.client_name.clone(),
            worker_id: worker.id,
            worker_name: worker.name.clone(),
            total_amount: appointment.final_price,
            worker_amount: appointment.worker_rate,
            date: appointment.date,
            due_date,
            is_paid: false,
            payment_method: None,
            paid_at: None,
            created_at: Utc::now(),
        };

        match self.store.insert_payment(&payment).await {
            Ok(()) => {
                info!(
                    "Payment {} opened for appointment {}: total={:.2}, worker={:.2}, due {}",
                    payment.id,
                    appointment.id,
                    payment.total_amount,
                    payment.worker_amount,
                    payment.due_date
                );
                Ok(payment)
            }
            Err(StoreError::Duplicate { .. }) => self
                .store
                .get_payment_for_appointment(appointment.id)
                .await?
                .ok_or_else(|| BookingError::not_found("payment for appointment", appointment.id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a payment as settled with `method` and flag its appointment
    /// paid. Both records are written in one store call; returns them as
    /// committed.
    pub async fn confirm_payment(
        &self,
        payment_id: Uuid,
        method: PaymentMethod,
    ) -> BookingResult<(Payment, Appointment)> {
        let mut payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment", payment_id))?;
        if payment.is_paid {
            return Err(BookingError::conflict(format!(
                "payment {payment_id} is already paid"
            )));
        }
        let mut appointment = self
            .store
            .get_appointment(payment.appointment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("appointment", payment.appointment_id))?;

        let now = Utc::now();
        payment.is_paid = true;
        payment.payment_method = Some(method);
        payment.paid_at = Some(now);
        appointment.payment_status = PaymentStatus::Paid;
        appointment.updated_at = now;
        let appointment = self.store.settle_payment(&payment, &appointment).await?;

        info!(
            "Payment {} confirmed via {} ({:.2}), appointment {} now v{}",
            payment.id, method, payment.total_amount, appointment.id, appointment.version
        );
        Ok((payment, appointment))
    }

    pub async fn get(&self, payment_id: Uuid) -> BookingResult<Payment> {
        self.store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| BookingError::not_found("payment", payment_id))
    }

    /// Unpaid payments whose due date is before `today`.
    pub async fn overdue(&self, today: NaiveDate) -> BookingResult<Vec<Payment>> {
        let payments = self.store.list_payments().await?;
        Ok(payments.into_iter().filter(|p| p.is_overdue(today)).collect())
    }
}

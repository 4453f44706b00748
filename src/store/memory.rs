//! In-process entity store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AppointmentFilter, EntityStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Appointment, Comment, CommentTarget, Notification, Payment, Role, Service, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    services: HashMap<Uuid, Service>,
    appointments: HashMap<Uuid, Appointment>,
    payments: HashMap<Uuid, Payment>,
    payment_by_appointment: HashMap<Uuid, Uuid>,
    notifications: Vec<Notification>,
    comments: Vec<Comment>,
}

/// Entity store backed by hash maps behind a single async lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|user| role.map_or(true, |role| user.role == role))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Duplicate { entity: "user", id: user.id });
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> StoreResult<Option<Service>> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn list_services(&self) -> StoreResult<Vec<Service>> {
        let tables = self.tables.read().await;
        let mut services: Vec<Service> = tables.services.values().cloned().collect();
        services.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(services)
    }

    async fn insert_service(&self, service: &Service) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.services.contains_key(&service.id) {
            return Err(StoreError::Duplicate { entity: "service", id: service.id });
        }
        tables.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn update_service(&self, service: &Service) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.services.get_mut(&service.id) {
            Some(slot) => {
                *slot = service.clone();
                Ok(())
            }
            None => Err(StoreError::Missing { entity: "service", id: service.id }),
        }
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect();
        appointments.sort_by(|a, b| (a.date, a.time, a.created_at).cmp(&(b.date, b.time, b.created_at)));
        Ok(appointments)
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.appointments.contains_key(&appointment.id) {
            return Err(StoreError::Duplicate { entity: "appointment", id: appointment.id });
        }
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn update_appointment(&self, appointment: &Appointment) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .appointments
            .get_mut(&appointment.id)
            .ok_or(StoreError::Missing { entity: "appointment", id: appointment.id })?;
        if stored.version != appointment.version {
            return Err(StoreError::VersionConflict {
                id: appointment.id,
                expected: appointment.version,
            });
        }
        let mut next = appointment.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn get_payment_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payment_by_appointment
            .get(&appointment_id)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn list_payments(&self) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables.payments.values().cloned().collect();
        payments.sort_by(|a, b| (a.due_date, a.created_at).cmp(&(b.due_date, b.created_at)));
        Ok(payments)
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.payment_by_appointment.contains_key(&payment.appointment_id) {
            return Err(StoreError::Duplicate {
                entity: "payment for appointment",
                id: payment.appointment_id,
            });
        }
        if tables.payments.contains_key(&payment.id) {
            return Err(StoreError::Duplicate { entity: "payment", id: payment.id });
        }
        tables
            .payment_by_appointment
            .insert(payment.appointment_id, payment.id);
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.payments.get_mut(&payment.id) {
            Some(slot) => {
                *slot = payment.clone();
                Ok(())
            }
            None => Err(StoreError::Missing { entity: "payment", id: payment.id }),
        }
    }

    async fn settle_payment(
        &self,
        payment: &Payment,
        appointment: &Appointment,
    ) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        if !tables.payments.contains_key(&payment.id) {
            return Err(StoreError::Missing { entity: "payment", id: payment.id });
        }
        let stored = tables
            .appointments
            .get(&appointment.id)
            .ok_or(StoreError::Missing { entity: "appointment", id: appointment.id })?;
        if stored.version != appointment.version {
            return Err(StoreError::VersionConflict {
                id: appointment.id,
                expected: appointment.version,
            });
        }
        let mut next = appointment.clone();
        next.version += 1;
        tables.appointments.insert(next.id, next.clone());
        tables.payments.insert(payment.id, payment.clone());
        Ok(next)
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.tables.write().await.notifications.push(notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        let tables = self.tables.read().await;
        Ok(tables.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.read().await;
        // Stored in insertion order; reversing keeps same-instant entries newest first.
        let mut notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.is_read = true;
                Ok(())
            }
            None => Err(StoreError::Missing { entity: "notification", id }),
        }
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        self.tables.write().await.comments.push(comment.clone());
        Ok(())
    }

    async fn list_comments(
        &self,
        target_type: CommentTarget,
        target_id: Uuid,
    ) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.target_type == target_type && c.target_id == target_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, CreatedBy, PaymentStatus};
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn appointment(day: u32) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            service_name: "Pedicure Spa".to_string(),
            client_id: Uuid::new_v4(),
            client_name: "María González".to_string(),
            client_email: None,
            client_phone: None,
            assigned_worker: None,
            date: NaiveDate::from_ymd_opt(2025, 9, day).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            reschedule: None,
            final_price: 35.0,
            worker_rate: 20.0,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            is_published: true,
            created_by: CreatedBy::Client,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemoryStore::new();
        let original = appointment(1);
        store.insert_appointment(&original).await.unwrap();

        let mut first = original.clone();
        first.is_published = false;
        let stored = store.update_appointment(&first).await.unwrap();
        assert_eq!(stored.version, 1);

        let err = store.update_appointment(&original).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, .. }));
    }

    #[tokio::test]
    async fn appointments_are_listed_by_date() {
        let store = MemoryStore::new();
        let late = appointment(20);
        let early = appointment(2);
        store.insert_appointment(&late).await.unwrap();
        store.insert_appointment(&early).await.unwrap();

        let listed = store.list_appointments(&AppointmentFilter::default()).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);

        let only_late = store
            .list_appointments(&AppointmentFilter::for_client(late.client_id))
            .await
            .unwrap();
        assert_eq!(only_late.len(), 1);
        assert_eq!(only_late[0].id, late.id);
    }

    #[tokio::test]
    async fn second_payment_for_appointment_is_duplicate() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let payment = Payment {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "María González".to_string(),
            worker_id: Uuid::new_v4(),
            worker_name: "Sofía Ramírez".to_string(),
            total_amount: 25.0,
            worker_amount: 15.0,
            date,
            due_date: date,
            is_paid: false,
            payment_method: None,
            paid_at: None,
            created_at: Utc::now(),
        };
        store.insert_payment(&payment).await.unwrap();

        let again = Payment { id: Uuid::new_v4(), ..payment.clone() };
        let err = store.insert_payment(&again).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.list_payments().await.unwrap().len(), 1);
    }
}

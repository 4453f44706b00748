//! # PostgreSQL Store Tests
//!
//! These run against a live database and are skipped when `DATABASE_URL` is
//! unset. Every test writes rows under fresh ids, so they can share a
//! database with each other and with a running server.
//!
//! ## Running Tests
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/salon_test cargo test --test postgres_store
//! ```

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    use salon_booking::error::StoreError;
    use salon_booking::models::{
        Appointment, AppointmentStatus, CreatedBy, Payment, PaymentMethod, PaymentStatus,
        RescheduleRequest, Role, Service, User, WorkerRef,
    };
    use salon_booking::store::{AppointmentFilter, EntityStore, PgStore};

    async fn connect() -> Option<PgStore> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            println!("DATABASE_URL not set, skipping PostgreSQL store test");
            return None;
        };
        Some(
            PgStore::connect(&url, 2)
                .await
                .expect("Failed to connect to DATABASE_URL"),
        )
    }

    struct Fixture {
        store: PgStore,
        client: User,
        worker: User,
        service: Service,
    }

    async fn fixture() -> Option<Fixture> {
        let store = connect().await?;
        let now = Utc::now();
        let person = |name: &str, role: Role| User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@nikybeautystudio.test", Uuid::new_v4()),
            phone: None,
            role,
            created_at: now,
        };
        let client = person("María González", Role::Client);
        let worker = person("Sofía Ramírez", Role::Worker);
        store.insert_user(&client).await.unwrap();
        store.insert_user(&worker).await.unwrap();

        let service = Service {
            id: Uuid::new_v4(),
            name: "Corte y Peinado".to_string(),
            description: "Corte personalizado y peinado profesional".to_string(),
            base_price: 40.0,
            worker_rate: 25.0,
            duration_minutes: 120,
            category: "Cabello".to_string(),
            is_active: true,
            image_url: None,
            created_at: now,
        };
        store.insert_service(&service).await.unwrap();

        Some(Fixture { store, client, worker, service })
    }

    impl Fixture {
        fn appointment(&self) -> Appointment {
            // Postgres keeps microseconds, so round-tripped timestamps are truncated.
            let now = chrono::DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
            Appointment {
                id: Uuid::new_v4(),
                service_id: self.service.id,
                service_name: self.service.name.clone(),
                client_id: self.client.id,
                client_name: self.client.name.clone(),
                client_email: Some(self.client.email.clone()),
                client_phone: None,
                assigned_worker: Some(WorkerRef {
                    id: self.worker.id,
                    name: self.worker.name.clone(),
                }),
                date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
                time: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
                reschedule: None,
                final_price: 40.0,
                worker_rate: 25.0,
                status: AppointmentStatus::Assigned,
                payment_status: PaymentStatus::Pending,
                is_published: true,
                created_by: CreatedBy::Admin,
                cancellation_reason: None,
                created_at: now,
                updated_at: now,
                version: 0,
            }
        }

        fn payment(&self, appointment: &Appointment) -> Payment {
            Payment {
                id: Uuid::new_v4(),
                appointment_id: appointment.id,
                client_id: self.client.id,
                client_name: self.client.name.clone(),
                worker_id: self.worker.id,
                worker_name: self.worker.name.clone(),
                total_amount: appointment.final_price,
                worker_amount: appointment.worker_rate,
                date: appointment.date,
                due_date: appointment.date,
                is_paid: false,
                payment_method: None,
                paid_at: None,
                created_at: appointment.created_at,
            }
        }
    }

    #[tokio::test]
    async fn test_appointment_round_trip() {
        let Some(f) = fixture().await else { return };
        let mut apt = f.appointment();
        apt.status = AppointmentStatus::RescheduleRequested;
        apt.reschedule = Some(RescheduleRequest {
            date: NaiveDate::from_ymd_opt(2025, 9, 3).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            reason: "Cita médica".to_string(),
        });
        f.store.insert_appointment(&apt).await.unwrap();

        let stored = f.store.get_appointment(apt.id).await.unwrap().unwrap();
        assert_eq!(stored, apt);

        let listed = f
            .store
            .list_appointments(&AppointmentFilter {
                status: Some(AppointmentStatus::RescheduleRequested),
                ..AppointmentFilter::for_client(f.client.id)
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, apt.id);

        let workers = f.store.list_users(Some(Role::Worker)).await.unwrap();
        assert!(workers.iter().any(|w| w.id == f.worker.id && w.role == Role::Worker));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let Some(f) = fixture().await else { return };
        let original = f.appointment();
        f.store.insert_appointment(&original).await.unwrap();

        let mut first = original.clone();
        first.is_published = false;
        let stored = f.store.update_appointment(&first).await.unwrap();
        assert_eq!(stored.version, 1);
        assert!(!stored.is_published);

        let err = f.store.update_appointment(&original).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, .. }));

        let ghost = f.appointment();
        let err = f.store.update_appointment(&ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing { entity: "appointment", .. }));
    }

    #[tokio::test]
    async fn test_second_payment_for_appointment_is_duplicate() {
        let Some(f) = fixture().await else { return };
        let apt = f.appointment();
        f.store.insert_appointment(&apt).await.unwrap();

        let payment = f.payment(&apt);
        f.store.insert_payment(&payment).await.unwrap();

        let again = Payment { id: Uuid::new_v4(), ..payment.clone() };
        let err = f.store.insert_payment(&again).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));

        let stored = f.store.get_payment_for_appointment(apt.id).await.unwrap().unwrap();
        assert_eq!(stored.id, payment.id);
    }

    #[tokio::test]
    async fn test_settlement_is_all_or_nothing() {
        let Some(f) = fixture().await else { return };
        let apt = f.appointment();
        f.store.insert_appointment(&apt).await.unwrap();
        let payment = f.payment(&apt);
        f.store.insert_payment(&payment).await.unwrap();

        // Someone else moves the appointment first.
        let mut moved = apt.clone();
        moved.is_published = false;
        f.store.update_appointment(&moved).await.unwrap();

        let mut paid = payment.clone();
        paid.is_paid = true;
        paid.payment_method = Some(PaymentMethod::Transfer);
        let mut stale = apt.clone();
        stale.payment_status = PaymentStatus::Paid;
        let err = f.store.settle_payment(&paid, &stale).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        // The payment write was rolled back with the rejected appointment write.
        let stored = f.store.get_payment(payment.id).await.unwrap().unwrap();
        assert!(!stored.is_paid);
        assert_eq!(stored.payment_method, None);

        let mut current = f.store.get_appointment(apt.id).await.unwrap().unwrap();
        current.payment_status = PaymentStatus::Paid;
        let settled = f.store.settle_payment(&paid, &current).await.unwrap();
        assert_eq!(settled.version, 2);
        assert_eq!(settled.payment_status, PaymentStatus::Paid);

        let stored = f.store.get_payment(payment.id).await.unwrap().unwrap();
        assert!(stored.is_paid);
        assert_eq!(stored.payment_method, Some(PaymentMethod::Transfer));
    }
}

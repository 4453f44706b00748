//! Demo data for an empty store: one user per role, the starter service
//! menu, two appointments for tomorrow and their side records.
//!
//! Seeding is skipped when any admin already exists.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    Appointment, AppointmentStatus, Comment, CommentTarget, CreatedBy, Notification,
    NotificationKind, Payment, PaymentMethod, PaymentStatus, RelatedType, Role, Service, User,
    WorkerRef,
};
use crate::store::EntityStore;

const SERVICES: [(&str, &str, f64, f64, i32, &str); 4] = [
    ("Manicure Clásico", "Limpieza, corte y esmaltado básico", 25.0, 15.0, 60, "Uñas"),
    ("Pedicure Spa", "Tratamiento completo para pies con exfoliación", 35.0, 20.0, 90, "Uñas"),
    ("Corte y Peinado", "Corte personalizado y peinado profesional", 40.0, 25.0, 120, "Cabello"),
    ("Tratamiento Facial", "Limpieza facial profunda con hidratación", 50.0, 30.0, 90, "Facial"),
];

fn user(name: &str, email: &str, phone: Option<&str>, role: Role, now: DateTime<Utc>) -> User {
    User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.map(str::to_string),
        role,
        created_at: now,
    }
}

fn notification(user_id: Uuid, title: &str, message: &str, kind: NotificationKind, now: DateTime<Utc>) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id,
        title: title.to_string(),
        message: message.to_string(),
        kind,
        created_at: now,
        is_read: false,
        related_id: None,
        related_type: None,
    }
}

/// Seed demo records relative to `today`. Returns `false` when the store
/// already had an admin and nothing was written.
pub async fn seed_demo_data(store: &dyn EntityStore, today: NaiveDate) -> StoreResult<bool> {
    if !store.list_users(Some(Role::Admin)).await?.is_empty() {
        return Ok(false);
    }

    let now = Utc::now();
    let admin = user("Administradora NBS", "admin@nikybeautystudio.com", None, Role::Admin, now);
    let worker = user("Sofía Ramírez", "worker@nikybeautystudio.com", None, Role::Worker, now);
    let client = user(
        "María González",
        "cliente@nikybeautystudio.com",
        Some("+51 987654321"),
        Role::Client,
        now,
    );
    for u in [&admin, &worker, &client] {
        store.insert_user(u).await?;
    }

    let mut services = Vec::with_capacity(SERVICES.len());
    for (name, description, base_price, worker_rate, duration_minutes, category) in SERVICES {
        let service = Service {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            base_price,
            worker_rate,
            duration_minutes,
            category: category.to_string(),
            is_active: true,
            image_url: None,
            created_at: now,
        };
        store.insert_service(&service).await?;
        services.push(service);
    }

    let tomorrow = today + Duration::days(1);
    let base = |service: &Service, hour: u32, minute: u32| Appointment {
        id: Uuid::new_v4(),
        service_id: service.id,
        service_name: service.name.clone(),
        client_id: client.id,
        client_name: client.name.clone(),
        client_email: Some(client.email.clone()),
        client_phone: client.phone.clone(),
        assigned_worker: None,
        date: tomorrow,
        time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default(),
        reschedule: None,
        final_price: service.base_price,
        worker_rate: service.worker_rate,
        status: AppointmentStatus::Pending,
        payment_status: PaymentStatus::Pending,
        is_published: true,
        created_by: CreatedBy::Client,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
        version: 0,
    };

    let open = Appointment {
        final_price: 30.0,
        worker_rate: 18.0,
        ..base(&services[0], 10, 0)
    };
    let confirmed = Appointment {
        assigned_worker: Some(WorkerRef {
            id: worker.id,
            name: worker.name.clone(),
        }),
        status: AppointmentStatus::Assigned,
        payment_status: PaymentStatus::Paid,
        created_by: CreatedBy::Admin,
        ..base(&services[1], 14, 30)
    };
    store.insert_appointment(&open).await?;
    store.insert_appointment(&confirmed).await?;

    store
        .insert_payment(&Payment {
            id: Uuid::new_v4(),
            appointment_id: confirmed.id,
            client_id: client.id,
            client_name: client.name.clone(),
            worker_id: worker.id,
            worker_name: worker.name.clone(),
            total_amount: confirmed.final_price,
            worker_amount: confirmed.worker_rate,
            date: confirmed.date,
            due_date: confirmed.date,
            is_paid: true,
            payment_method: Some(PaymentMethod::Card),
            paid_at: Some(now),
            created_at: now,
        })
        .await?;

    store
        .insert_comment(&Comment {
            id: Uuid::new_v4(),
            target_type: CommentTarget::Service,
            target_id: services[0].id,
            user_id: admin.id,
            user_name: admin.name.clone(),
            user_role: Role::Admin,
            content: "Recordar usar esmalte de larga duración para este servicio".to_string(),
            is_internal: true,
            created_at: now,
        })
        .await?;

    let mut available = notification(
        worker.id,
        "New appointment available",
        "Manicure Clásico - María González - 18.00 earnings",
        NotificationKind::Info,
        now,
    );
    available.related_id = Some(open.id);
    available.related_type = Some(RelatedType::Appointment);
    let mut booked = notification(
        admin.id,
        "New booking",
        "María González booked Manicure Clásico",
        NotificationKind::Info,
        now,
    );
    booked.related_id = Some(open.id);
    booked.related_type = Some(RelatedType::Appointment);
    let mut confirmed_note = notification(
        client.id,
        "Appointment confirmed",
        "Your Pedicure Spa appointment is confirmed",
        NotificationKind::Success,
        now,
    );
    confirmed_note.related_id = Some(confirmed.id);
    confirmed_note.related_type = Some(RelatedType::Appointment);
    for n in [&available, &booked, &confirmed_note] {
        store.insert_notification(n).await?;
    }

    info!(
        "Seeded demo data: 3 users, {} services, 2 appointments (admin id {})",
        services.len(),
        admin.id
    );
    Ok(true)
}

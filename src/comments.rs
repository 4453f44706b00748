//! Append-only comment log on services and appointments.
//!
//! Internal comments are written by admins only and never shown to other
//! roles. Appointment threads follow the same visibility as the appointment.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::models::{Actor, Comment, CommentTarget};
use crate::queries::visible_to;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct CommentLog {
    store: Arc<dyn EntityStore>,
}

impl CommentLog {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn add(
        &self,
        actor: &Actor,
        target_type: CommentTarget,
        target_id: Uuid,
        content: &str,
        is_internal: bool,
    ) -> BookingResult<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(BookingError::validation("comment content cannot be empty"));
        }
        if is_internal && !actor.is_admin() {
            return Err(BookingError::permission("only admins may post internal comments"));
        }
        self.check_target(actor, target_type, target_id, true).await?;

        let comment = Comment {
            id: Uuid::new_v4(),
            target_type,
            target_id,
            user_id: actor.id,
            user_name: actor.name.clone(),
            user_role: actor.role,
            content: content.to_string(),
            is_internal,
            created_at: Utc::now(),
        };
        self.store.insert_comment(&comment).await?;
        info!(
            "Comment {} added to {} {} by {} ({})",
            comment.id, target_type, target_id, actor.id, actor.role
        );
        Ok(comment)
    }

    /// Comments on a target, oldest first, with internal ones removed for
    /// non-admins.
    pub async fn list(
        &self,
        actor: &Actor,
        target_type: CommentTarget,
        target_id: Uuid,
    ) -> BookingResult<Vec<Comment>> {
        self.check_target(actor, target_type, target_id, false).await?;
        let comments = self.store.list_comments(target_type, target_id).await?;
        Ok(comments
            .into_iter()
            .filter(|comment| actor.is_admin() || !comment.is_internal)
            .collect())
    }

    /// Reading a hidden appointment looks like a missing one; writing to it
    /// is a permission error.
    async fn check_target(
        &self,
        actor: &Actor,
        target_type: CommentTarget,
        target_id: Uuid,
        writing: bool,
    ) -> BookingResult<()> {
        match target_type {
            CommentTarget::Service => {
                self.store
                    .get_service(target_id)
                    .await?
                    .ok_or_else(|| BookingError::not_found("service", target_id))?;
            }
            CommentTarget::Appointment => {
                let appointment = self
                    .store
                    .get_appointment(target_id)
                    .await?
                    .ok_or_else(|| BookingError::not_found("appointment", target_id))?;
                if !visible_to(actor, &appointment) {
                    return Err(if writing {
                        BookingError::permission(
                            "you can only comment on appointments you take part in",
                        )
                    } else {
                        BookingError::not_found("appointment", target_id)
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Appointment, AppointmentStatus, CreatedBy, PaymentStatus, Role, User,
    };
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveTime};

    async fn actor(store: &MemoryStore, name: &str, role: Role) -> Actor {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@nbs.test", name.to_lowercase()),
            phone: None,
            role,
            created_at: Utc::now(),
        };
        store.insert_user(&user).await.unwrap();
        Actor::from(&user)
    }

    async fn appointment_for(store: &MemoryStore, client: &Actor, published: bool) -> Appointment {
        let now = Utc::now();
        let apt = Appointment {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            service_name: "Corte y Peinado".to_string(),
            client_id: client.id,
            client_name: client.name.clone(),
            client_email: None,
            client_phone: None,
            assigned_worker: None,
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            reschedule: None,
            final_price: 40.0,
            worker_rate: 25.0,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            is_published: published,
            created_by: CreatedBy::Client,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        store.insert_appointment(&apt).await.unwrap();
        apt
    }

    #[tokio::test]
    async fn internal_comments_are_admin_only() {
        let store = Arc::new(MemoryStore::new());
        let admin = actor(&store, "Admin", Role::Admin).await;
        let client = actor(&store, "Maria", Role::Client).await;
        let apt = appointment_for(&store, &client, true).await;
        let log = CommentLog::new(store.clone());

        let err = log
            .add(&client, CommentTarget::Appointment, apt.id, "note", true)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));

        log.add(&admin, CommentTarget::Appointment, apt.id, "prefers mornings", true)
            .await
            .unwrap();
        log.add(&client, CommentTarget::Appointment, apt.id, "  see you soon ", false)
            .await
            .unwrap();

        let for_client = log.list(&client, CommentTarget::Appointment, apt.id).await.unwrap();
        assert_eq!(for_client.len(), 1);
        assert_eq!(for_client[0].content, "see you soon");
        assert_eq!(
            log.list(&admin, CommentTarget::Appointment, apt.id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn clients_cannot_comment_on_other_appointments() {
        let store = Arc::new(MemoryStore::new());
        let owner = actor(&store, "Maria", Role::Client).await;
        let stranger = actor(&store, "Ana", Role::Client).await;
        let apt = appointment_for(&store, &owner, true).await;
        let log = CommentLog::new(store.clone());

        let err = log
            .add(&stranger, CommentTarget::Appointment, apt.id, "hello", false)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));

        let err = log
            .list(&stranger, CommentTarget::Appointment, apt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn workers_comment_only_on_visible_appointments() {
        let store = Arc::new(MemoryStore::new());
        let client = actor(&store, "Maria", Role::Client).await;
        let worker = actor(&store, "Sofia", Role::Worker).await;
        let hidden = appointment_for(&store, &client, false).await;
        let open = appointment_for(&store, &client, true).await;
        let log = CommentLog::new(store.clone());

        assert!(log
            .add(&worker, CommentTarget::Appointment, hidden.id, "can I?", false)
            .await
            .is_err());
        assert!(log
            .add(&worker, CommentTarget::Appointment, open.id, "I can take it", false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn empty_content_and_unknown_targets_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let client = actor(&store, "Maria", Role::Client).await;
        let log = CommentLog::new(store.clone());

        let err = log
            .add(&client, CommentTarget::Service, Uuid::new_v4(), "   ", false)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));

        let err = log
            .add(&client, CommentTarget::Service, Uuid::new_v4(), "nice", false)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { entity: "service", .. }));
    }
}

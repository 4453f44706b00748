//! # Notification Dispatcher
//!
//! Turns lifecycle events into per-user notification records and serves each
//! user's notification center.
//!
//! Dispatch is a side effect of an already committed transition, so
//! `notify` never fails: a store error is logged and the caller moves on.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::models::{Actor, Notification, NotificationKind, RelatedType, Role};
use crate::store::EntityStore;

/// Content of a notification before it is addressed to a recipient.
#[derive(Debug, Clone)]
pub struct Draft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related: Option<(Uuid, RelatedType)>,
}

/// A user's notification center: every notification, newest first, and how
/// many of them are unread.
#[derive(Debug, Clone)]
pub struct Inbox {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

impl Draft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            related: None,
        }
    }

    pub fn about(mut self, id: Uuid, related_type: RelatedType) -> Self {
        self.related = Some((id, related_type));
        self
    }

    fn address(&self, recipient: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: recipient,
            title: self.title.clone(),
            message: self.message.clone(),
            kind: self.kind,
            created_at: Utc::now(),
            is_read: false,
            related_id: self.related.map(|(id, _)| id),
            related_type: self.related.map(|(_, kind)| kind),
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn EntityStore>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Append one unread notification for `recipient`.
    pub async fn notify(&self, recipient: Uuid, draft: &Draft) -> Option<Notification> {
        let notification = draft.address(recipient);
        match self.store.insert_notification(&notification).await {
            Ok(()) => {
                debug!(
                    "Notification '{}' queued for user {}",
                    notification.title, recipient
                );
                Some(notification)
            }
            Err(e) => {
                warn!(
                    "Failed to store notification '{}' for user {}: {}",
                    draft.title, recipient, e
                );
                None
            }
        }
    }

    /// Notify each recipient once, skipping duplicates. Returns how many
    /// notifications were stored.
    pub async fn notify_all(&self, recipients: impl IntoIterator<Item = Uuid>, draft: &Draft) -> usize {
        let mut seen = Vec::new();
        let mut stored = 0;
        for recipient in recipients {
            if seen.contains(&recipient) {
                continue;
            }
            seen.push(recipient);
            if self.notify(recipient, draft).await.is_some() {
                stored += 1;
            }
        }
        stored
    }

    /// Notify every user holding `role`, except `skip` (usually the actor).
    pub async fn notify_role(&self, role: Role, skip: Option<Uuid>, draft: &Draft) -> usize {
        match self.store.list_users(Some(role)).await {
            Ok(users) => {
                let recipients = users
                    .into_iter()
                    .map(|user| user.id)
                    .filter(|id| Some(*id) != skip);
                self.notify_all(recipients, draft).await
            }
            Err(e) => {
                warn!("Failed to resolve {} recipients for '{}': {}", role, draft.title, e);
                0
            }
        }
    }

    // ------------------------------------------------------------------------
    // Notification center
    // ------------------------------------------------------------------------

    pub async fn inbox(&self, actor: &Actor) -> BookingResult<Inbox> {
        let notifications = self.store.list_notifications(actor.id).await?;
        let unread = notifications.iter().filter(|n| !n.is_read).count();
        Ok(Inbox { notifications, unread })
    }

    /// Only the recipient may mark a notification as read.
    pub async fn mark_read(&self, actor: &Actor, id: Uuid) -> BookingResult<Notification> {
        let mut notification = self
            .store
            .get_notification(id)
            .await?
            .ok_or_else(|| BookingError::not_found("notification", id))?;
        if notification.user_id != actor.id {
            return Err(BookingError::permission(
                "notifications can only be marked as read by their recipient",
            ));
        }
        if !notification.is_read {
            self.store.mark_notification_read(id).await?;
            notification.is_read = true;
        }
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::store::MemoryStore;

    async fn user(store: &MemoryStore, name: &str, role: Role) -> Actor {
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

    #[tokio::test]
    async fn notify_role_reaches_every_member_but_the_actor() {
        let store = Arc::new(MemoryStore::new());
        let first = user(&store, "Sofia", Role::Worker).await;
        let second = user(&store, "Lucia", Role::Worker).await;
        let dispatcher = NotificationDispatcher::new(store.clone());

        let draft = Draft::new(NotificationKind::Info, "New appointment available", "Manicure");
        let stored = dispatcher.notify_role(Role::Worker, Some(first.id), &draft).await;

        assert_eq!(stored, 1);
        assert!(dispatcher.inbox(&first).await.unwrap().notifications.is_empty());
        let received = dispatcher.inbox(&second).await.unwrap();
        assert_eq!(received.notifications.len(), 1);
        assert_eq!(received.unread, 1);
        assert!(!received.notifications[0].is_read);
    }

    #[tokio::test]
    async fn duplicate_recipients_are_notified_once() {
        let store = Arc::new(MemoryStore::new());
        let client = user(&store, "Maria", Role::Client).await;
        let dispatcher = NotificationDispatcher::new(store.clone());

        let draft = Draft::new(NotificationKind::Success, "Appointment confirmed", "See you soon");
        let stored = dispatcher.notify_all([client.id, client.id], &draft).await;
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn only_recipient_can_mark_read() {
        let store = Arc::new(MemoryStore::new());
        let client = user(&store, "Maria", Role::Client).await;
        let other = user(&store, "Ana", Role::Client).await;
        let dispatcher = NotificationDispatcher::new(store.clone());

        let draft = Draft::new(NotificationKind::Info, "Hello", "World");
        let notification = dispatcher.notify(client.id, &draft).await.unwrap();

        let err = dispatcher.mark_read(&other, notification.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Permission(_)));

        assert_eq!(dispatcher.inbox(&client).await.unwrap().unread, 1);
        let read = dispatcher.mark_read(&client, notification.id).await.unwrap();
        assert!(read.is_read);
        assert_eq!(dispatcher.inbox(&client).await.unwrap().unread, 0);
    }
}

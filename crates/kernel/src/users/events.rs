//! Account lifecycle events.

use tokio::sync::broadcast;

use crate::models::User;

const CHANNEL_CAPACITY: usize = 256;

/// Something that happened to a user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    /// An active account was created.
    AccountCreated(User),
    /// An account was created pending registration.
    RegistrationCreated(User),
    /// An account was removed.
    AccountDeleted(User),
}

impl UserEvent {
    pub fn user(&self) -> &User {
        match self {
            Self::AccountCreated(u) | Self::RegistrationCreated(u) | Self::AccountDeleted(u) => u,
        }
    }
}

/// Broadcasts user events to every subscriber.
///
/// Clones share the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<UserEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish to current subscribers. Returns how many received it.
    pub fn publish(&self, event: UserEvent) -> usize {
        tracing::debug!(user = %event.user().name, ?event, "user event");
        // No subscribers is fine.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> User {
        User {
            id: Uuid::now_v7(),
            name: "alice".to_string(),
            pass: String::new(),
            mail: "alice@example.com".to_string(),
            is_admin: false,
            activated: 1,
            registered: chrono::Utc::now(),
            theme: String::new(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish(UserEvent::AccountDeleted(user())), 1);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, UserEvent::AccountDeleted(u) if u.name == "alice"));
    }

    #[test]
    fn publish_without_subscribers() {
        assert_eq!(EventBus::new().publish(UserEvent::AccountCreated(user())), 0);
    }
}

//! Authentication event stream.
//!
//! Token lifecycle transitions are published on a broadcast channel so the
//! host application can react (refresh UI session state, log analytics)
//! without polling. Emitting with no subscribers is a no-op.

use tokio::sync::broadcast;

use crate::error::AuthErrorKind;
use crate::model::DeviceToken;

/// Default channel depth before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 32;

/// A token lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A brand-new token was minted (first run or post-expiry recovery).
    TokenGenerated {
        /// The freshly minted token record.
        token: DeviceToken,
    },
    /// A token was rotated, keeping the device identity.
    TokenRefreshed {
        /// The superseded token string.
        old_token: String,
        /// The replacement token record.
        new_token: DeviceToken,
    },
    /// A token was revoked (logout).
    TokenRevoked {
        /// The revoked token string.
        token: String,
    },
    /// Authentication succeeded.
    AuthSuccess {
        /// The authenticated user id.
        user_id: String,
    },
    /// Authentication failed.
    AuthFailure {
        /// The failure kind.
        kind: AuthErrorKind,
        /// Human-readable message.
        message: String,
    },
}

/// Broadcast publisher for [`AuthEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to all events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Silently dropped when nobody is listening.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.sender.send(event);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(AuthEvent::AuthSuccess {
            user_id: "user_abc".into(),
        });
        bus.emit(AuthEvent::TokenRevoked {
            token: "a".repeat(64),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::AuthSuccess {
                user_id: "user_abc".into()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::TokenRevoked {
                token: "a".repeat(64)
            }
        );
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.emit(AuthEvent::AuthFailure {
            kind: AuthErrorKind::NetworkError,
            message: "offline".into(),
        });
    }

    #[tokio::test]
    async fn subscription_starts_at_the_point_of_subscribe() {
        let bus = EventBus::new();
        bus.emit(AuthEvent::AuthSuccess {
            user_id: "before".into(),
        });

        let mut rx = bus.subscribe();
        bus.emit(AuthEvent::AuthSuccess {
            user_id: "after".into(),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::AuthSuccess {
                user_id: "after".into()
            }
        );
    }
}

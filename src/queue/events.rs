use super::types::{SessionId, SessionStatus, TokenId, TokenStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Change notifications emitted by the queue engine.
///
/// Emitted after the change is committed to the store. Status pages stay
/// correct under plain polling; listeners exist so a deployment can push
/// updates instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A session was created.
    SessionCreated {
        /// New session
        session_id: SessionId,
    },
    /// A session's operational status changed.
    SessionStatusChanged {
        /// Affected session
        session_id: SessionId,
        /// Status before
        from: SessionStatus,
        /// Status after
        to: SessionStatus,
    },
    /// Booking was opened or closed.
    BookingToggled {
        /// Affected session
        session_id: SessionId,
        /// New flag value
        booking_open: bool,
    },
    /// Capacity or consultation length changed.
    SessionUpdated {
        /// Affected session
        session_id: SessionId,
    },
    /// A session and its tokens were removed.
    SessionDeleted {
        /// Removed session
        session_id: SessionId,
    },
    /// A token was admitted.
    TokenAdmitted {
        /// Owning session
        session_id: SessionId,
        /// New token
        token_id: TokenId,
        /// Its number
        token_number: u32,
    },
    /// A token changed status.
    TokenStatusChanged {
        /// Owning session
        session_id: SessionId,
        /// Affected token
        token_id: TokenId,
        /// Its number
        token_number: u32,
        /// New status
        status: TokenStatus,
    },
    /// A token was hard-deleted.
    TokenDeleted {
        /// Owning session
        session_id: SessionId,
        /// Removed token
        token_id: TokenId,
        /// Its number, never reused
        token_number: u32,
    },
}

impl QueueEvent {
    /// The session this event belongs to.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            QueueEvent::SessionCreated { session_id }
            | QueueEvent::SessionStatusChanged { session_id, .. }
            | QueueEvent::BookingToggled { session_id, .. }
            | QueueEvent::SessionUpdated { session_id }
            | QueueEvent::SessionDeleted { session_id }
            | QueueEvent::TokenAdmitted { session_id, .. }
            | QueueEvent::TokenStatusChanged { session_id, .. }
            | QueueEvent::TokenDeleted { session_id, .. } => *session_id,
        }
    }
}

/// A thread-safe listener callback for queue events.
pub type QueueEventListener = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

#[inline]
pub(crate) fn emit(listener: &Option<QueueEventListener>, event: QueueEvent) {
    if let Some(listener) = listener {
        listener(&event);
    }
}

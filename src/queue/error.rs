//! Queue engine error types

use super::types::{SessionId, SessionStatus, TokenId, TokenStatus};
use std::fmt;

/// Coarse grouping of [`QueueError`] kinds.
///
/// Callers use the category to decide how to react: admission and lookup
/// errors are shown to the public, progression errors to operators, transient
/// errors are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Refused at token creation time.
    Admission,
    /// Refused by the token state machine.
    Progression,
    /// Public status lookup outcome.
    Lookup,
    /// Retry after a short wait.
    Transient,
    /// Bad operator input.
    Validation,
    /// Stored or imported data failed a consistency check.
    Integrity,
}

/// Errors that can occur within the queue engine
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum QueueError {
    /// No session with this id.
    SessionNotFound(SessionId),

    /// Session exists but `booking_open` is false.
    BookingClosed(SessionId),

    /// Session status is `closed`.
    SessionNotAcceptingNew(SessionId),

    /// Session already holds `capacity` non-cancelled tokens.
    SessionFull {
        /// The full session
        session_id: SessionId,
        /// Its capacity
        capacity: u32,
    },

    /// A concurrent write won the race for the same slot.
    Conflict {
        /// Description of the conflicting write
        message: String,
    },

    /// The session's serialization point could not be acquired in time.
    Busy(SessionId),

    /// `call_next` found a token already being served.
    CurrentAlreadyServing {
        /// Session being advanced
        session_id: SessionId,
        /// Number of the token still current
        token_number: u32,
    },

    /// No waiting tokens left in the session.
    QueueEmpty(SessionId),

    /// `complete` on a token that is not current.
    NotCurrent {
        /// Token that was asked to complete
        token_id: TokenId,
        /// Its actual status
        status: TokenStatus,
    },

    /// Any other transition the state machine does not allow.
    InvalidTransition {
        /// Token being moved
        token_id: TokenId,
        /// Status before
        from: TokenStatus,
        /// Requested status
        to: TokenStatus,
    },

    /// No token with this id.
    TokenNotFound(TokenId),

    /// Public lookup matched nothing for the phone/date.
    NotFound,

    /// Public lookup matched a completed or cancelled token.
    AlreadyServed {
        /// Number of the matched token
        token_number: u32,
        /// Its terminal status
        status: TokenStatus,
    },

    /// Caller exceeded its request budget.
    RateLimited {
        /// Seconds until a request would be admitted again
        retry_after_secs: u64,
    },

    /// Internal fault on the public read path, or a timeout.
    NetworkError,

    /// Session end is not after its start.
    InvalidRange {
        /// Description of the bad range
        message: String,
    },

    /// Capacity must be at least one.
    InvalidCapacity(u32),

    /// Average consultation length must be at least one minute.
    InvalidConsultationMinutes(u32),

    /// Requested capacity is below the number of tokens already booked.
    CapacityBelowBooked {
        /// Requested capacity
        requested: u32,
        /// Non-cancelled tokens in the session
        booked: u32,
    },

    /// Session still has waiting or current tokens.
    SessionHasActiveTokens {
        /// Session that was asked to be deleted
        session_id: SessionId,
        /// Number of waiting/current tokens
        active: u32,
    },

    /// Underlying storage failure.
    Storage {
        /// Description of the failure
        message: String,
    },

    /// An external collaborator (patient directory, chamber directory) failed.
    Collaborator {
        /// Description of the failure
        message: String,
    },

    /// Error while serializing snapshot data
    SerializationError {
        /// Underlying error message
        message: String,
    },

    /// Error while deserializing snapshot data
    DeserializationError {
        /// Underlying error message
        message: String,
    },

    /// Snapshot integrity check failed
    ChecksumMismatch {
        /// Expected checksum value
        expected: String,
        /// Actual checksum value
        actual: String,
    },

    /// Operation not permitted in the current state
    InvalidOperation {
        /// Description of the error
        message: String,
    },
}

impl QueueError {
    /// The category this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::SessionNotFound(_)
            | QueueError::BookingClosed(_)
            | QueueError::SessionNotAcceptingNew(_)
            | QueueError::SessionFull { .. } => ErrorCategory::Admission,
            QueueError::CurrentAlreadyServing { .. }
            | QueueError::QueueEmpty(_)
            | QueueError::NotCurrent { .. }
            | QueueError::InvalidTransition { .. }
            | QueueError::TokenNotFound(_) => ErrorCategory::Progression,
            QueueError::NotFound
            | QueueError::AlreadyServed { .. }
            | QueueError::RateLimited { .. } => ErrorCategory::Lookup,
            QueueError::Conflict { .. }
            | QueueError::Busy(_)
            | QueueError::NetworkError
            | QueueError::Storage { .. }
            | QueueError::Collaborator { .. } => ErrorCategory::Transient,
            QueueError::InvalidRange { .. }
            | QueueError::InvalidCapacity(_)
            | QueueError::InvalidConsultationMinutes(_)
            | QueueError::CapacityBelowBooked { .. }
            | QueueError::SessionHasActiveTokens { .. }
            | QueueError::InvalidOperation { .. } => ErrorCategory::Validation,
            QueueError::SerializationError { .. }
            | QueueError::DeserializationError { .. }
            | QueueError::ChecksumMismatch { .. } => ErrorCategory::Integrity,
        }
    }

    /// Whether repeating the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueueError::Busy(_)
                | QueueError::Conflict { .. }
                | QueueError::RateLimited { .. }
                | QueueError::NetworkError
        )
    }

    /// Message suitable for a public booking widget or status page.
    ///
    /// Never includes ids or internal detail.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            QueueError::SessionNotFound(_) => {
                "This session is no longer available. Please pick another session."
            }
            QueueError::BookingClosed(_) => {
                "Booking for this session is closed. Please pick another session."
            }
            QueueError::SessionNotAcceptingNew(_) => {
                "This session has ended and is not accepting new patients."
            }
            QueueError::SessionFull { .. } => {
                "This session is full. Please pick another session."
            }
            QueueError::Conflict { .. } | QueueError::Busy(_) => {
                "Many people are booking right now. Please try again."
            }
            QueueError::NotFound => {
                "No booking was found for this phone number today. Please contact the clinic."
            }
            QueueError::AlreadyServed { .. } => {
                "Your visit for this booking has already been completed or cancelled."
            }
            QueueError::RateLimited { .. } => {
                "Too many requests. Please wait a moment and try again."
            }
            QueueError::NetworkError => "We could not load the queue status. Please retry shortly.",
            _ => "Something went wrong. Please contact the clinic.",
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::SessionNotFound(id) => write!(f, "Session not found: {id}"),
            QueueError::BookingClosed(id) => write!(f, "Booking closed for session {id}"),
            QueueError::SessionNotAcceptingNew(id) => {
                write!(
                    f,
                    "Session {id} is {} and not accepting new tokens",
                    SessionStatus::Closed
                )
            }
            QueueError::SessionFull {
                session_id,
                capacity,
            } => {
                write!(f, "Session {session_id} is full (capacity {capacity})")
            }
            QueueError::Conflict { message } => write!(f, "Conflicting write: {message}"),
            QueueError::Busy(id) => {
                write!(f, "Session {id} is busy, lock not acquired in time")
            }
            QueueError::CurrentAlreadyServing {
                session_id,
                token_number,
            } => {
                write!(
                    f,
                    "Session {session_id} is still serving token {token_number}"
                )
            }
            QueueError::QueueEmpty(id) => write!(f, "No waiting tokens in session {id}"),
            QueueError::NotCurrent { token_id, status } => {
                write!(f, "Token {token_id} is {status}, not current")
            }
            QueueError::InvalidTransition { token_id, from, to } => {
                write!(f, "Token {token_id} cannot move from {from} to {to}")
            }
            QueueError::TokenNotFound(id) => write!(f, "Token not found: {id}"),
            QueueError::NotFound => write!(f, "No booking matches the lookup"),
            QueueError::AlreadyServed {
                token_number,
                status,
            } => {
                write!(f, "Token {token_number} is already {status}")
            }
            QueueError::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited, retry after {retry_after_secs}s")
            }
            QueueError::NetworkError => write!(f, "Queue status temporarily unavailable"),
            QueueError::InvalidRange { message } => write!(f, "Invalid time range: {message}"),
            QueueError::InvalidCapacity(capacity) => {
                write!(f, "Invalid capacity {capacity}: must be at least 1")
            }
            QueueError::InvalidConsultationMinutes(minutes) => {
                write!(
                    f,
                    "Invalid average consultation length {minutes}: must be at least 1 minute"
                )
            }
            QueueError::CapacityBelowBooked { requested, booked } => {
                write!(
                    f,
                    "Capacity {requested} is below the {booked} tokens already booked"
                )
            }
            QueueError::SessionHasActiveTokens { session_id, active } => {
                write!(
                    f,
                    "Session {session_id} still has {active} waiting or current tokens"
                )
            }
            QueueError::Storage { message } => write!(f, "Storage error: {message}"),
            QueueError::Collaborator { message } => write!(f, "Collaborator error: {message}"),
            QueueError::SerializationError { message } => {
                write!(f, "Serialization error: {message}")
            }
            QueueError::DeserializationError { message } => {
                write!(f, "Deserialization error: {message}")
            }
            QueueError::ChecksumMismatch { expected, actual } => {
                write!(
                    f,
                    "Checksum mismatch: expected {expected}, but computed {actual}"
                )
            }
            QueueError::InvalidOperation { message } => {
                write!(f, "Invalid operation: {message}")
            }
        }
    }
}

impl std::error::Error for QueueError {}

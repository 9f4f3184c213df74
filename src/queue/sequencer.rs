//! Token admission.
//!
//! Admissions for one session are linearized through that session's
//! admission lock: under the lock the capacity check, number assignment and
//! token insert happen as one step. The store's `(session, token_number)`
//! uniqueness constraint backs this up and turns a lost race into
//! [`QueueError::Conflict`] rather than a duplicate.
//!
//! Numbers come from the session's high-water mark, so a number freed by a
//! cancellation or deletion is never handed out again.

use super::error::QueueError;
use super::events::{QueueEvent, QueueEventListener, emit};
use super::locks::SessionLocks;
use super::store::QueueStore;
use super::telemetry;
use super::types::{
    BookedBy, PatientDetails, QueueSession, QueueToken, RecordLink, SessionId, SessionStatus,
    TokenId, TokenStatus,
};
use crate::utils::{SharedClock, normalize_phone};
use std::sync::Arc;
use tracing::{info, trace, warn};

/// One request to add a patient to a session's line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// Target session.
    pub session_id: SessionId,
    /// Patient identity fields.
    pub patient: PatientDetails,
    /// Booking channel.
    pub booked_by: BookedBy,
    /// Optional reason for the visit.
    pub visiting_reason: Option<String>,
}

impl AdmissionRequest {
    /// Creates a request without a visiting reason.
    pub fn new(session_id: SessionId, patient: PatientDetails, booked_by: BookedBy) -> Self {
        Self {
            session_id,
            patient,
            booked_by,
            visiting_reason: None,
        }
    }

    /// Attaches a visiting reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.visiting_reason = Some(reason.into());
        self
    }
}

/// Assigns token numbers and enforces capacity.
pub struct TokenSequencer {
    store: Arc<dyn QueueStore>,
    locks: Arc<SessionLocks>,
    clock: SharedClock,
    listener: Option<QueueEventListener>,
}

impl TokenSequencer {
    /// Creates a sequencer over a store.
    pub fn new(store: Arc<dyn QueueStore>, locks: Arc<SessionLocks>, clock: SharedClock) -> Self {
        Self {
            store,
            locks,
            clock,
            listener: None,
        }
    }

    /// Registers a change listener.
    pub fn with_listener(mut self, listener: Option<QueueEventListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Admit a patient and return the committed token. The phone is stored
    /// normalised, so it matches status lookups.
    ///
    /// # Errors
    /// - [`QueueError::SessionNotFound`]
    /// - [`QueueError::BookingClosed`] when booking is off, whatever the capacity
    /// - [`QueueError::SessionNotAcceptingNew`] when the session is closed
    /// - [`QueueError::SessionFull`] when all capacity slots are taken
    /// - [`QueueError::Busy`] / [`QueueError::Conflict`], both retryable
    pub async fn admit(&self, request: AdmissionRequest) -> Result<QueueToken, QueueError> {
        let session_id = request.session_id;
        let result = self.admit_serialized(request).await;
        match &result {
            Ok(token) => {
                telemetry::record_admission("admitted");
                info!(
                    "session {}: admitted token #{} ({})",
                    session_id, token.token_number, token.booked_by
                );
            }
            Err(error) => {
                telemetry::record_admission(admission_outcome(error));
                warn!("session {}: admission rejected: {}", session_id, error);
            }
        }
        result
    }

    async fn admit_serialized(&self, request: AdmissionRequest) -> Result<QueueToken, QueueError> {
        let session_id = request.session_id;

        // Reject early without queuing on the lock; re-checked below.
        Self::check_accepting(&self.load(session_id)?)?;

        let _guard = self.locks.admission(session_id).await?;
        let session = self.load(session_id)?;
        Self::check_accepting(&session)?;

        let booked = self.store.count_tokens(session_id)?.booked();
        if booked >= session.max_patients {
            return Err(QueueError::SessionFull {
                session_id,
                capacity: session.max_patients,
            });
        }

        let token_number = session.last_token_number + 1;
        let mut patient = request.patient;
        patient.phone = normalize_phone(&patient.phone);
        let token = QueueToken {
            id: TokenId::new(),
            session_id,
            chamber_id: session.chamber_id,
            date: session.date,
            patient,
            patient_id: None,
            token_number,
            status: TokenStatus::Waiting,
            booked_by: request.booked_by,
            visiting_reason: request.visiting_reason,
            note: None,
            record_link: RecordLink::default(),
            created_at: self.clock.now(),
            called_at: None,
            completed_at: None,
            cancelled_at: None,
        };
        self.store.insert_token(token.clone())?;

        let bumped = self.store.update_session(session_id, &mut |session| {
            session.last_token_number = session.last_token_number.max(token_number);
            Ok(())
        });
        if let Err(error) = bumped {
            // Without the high-water mark the number could be reissued.
            self.store.remove_token(token.id)?;
            return Err(error);
        }

        trace!(
            "session {}: token {} holds #{}",
            session_id, token.id, token_number
        );
        emit(
            &self.listener,
            QueueEvent::TokenAdmitted {
                session_id,
                token_id: token.id,
                token_number,
            },
        );
        Ok(token)
    }

    fn load(&self, session_id: SessionId) -> Result<QueueSession, QueueError> {
        self.store
            .session(session_id)?
            .ok_or(QueueError::SessionNotFound(session_id))
    }

    fn check_accepting(session: &QueueSession) -> Result<(), QueueError> {
        if !session.booking_open {
            return Err(QueueError::BookingClosed(session.id));
        }
        if session.status == SessionStatus::Closed {
            return Err(QueueError::SessionNotAcceptingNew(session.id));
        }
        Ok(())
    }
}

fn admission_outcome(error: &QueueError) -> &'static str {
    match error {
        QueueError::SessionNotFound(_) => "session_not_found",
        QueueError::BookingClosed(_) => "booking_closed",
        QueueError::SessionNotAcceptingNew(_) => "session_closed",
        QueueError::SessionFull { .. } => "session_full",
        QueueError::Busy(_) => "busy",
        QueueError::Conflict { .. } => "conflict",
        _ => "error",
    }
}

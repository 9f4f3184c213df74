//! Operator-driven queue progression.
//!
//! Every change to a token's status, and to the session's current-token
//! pointer, runs under the session's progression lock. That keeps the
//! "at most one current token" invariant without scanning the session.

use super::error::QueueError;
use super::events::{QueueEvent, QueueEventListener, emit};
use super::locks::SessionLocks;
use super::store::QueueStore;
use super::telemetry;
use super::types::{
    CurrentToken, PatientId, QueueSession, QueueToken, RecordLink, SessionId, TokenId,
    TokenStatus,
};
use crate::utils::SharedClock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of [`QueueProgressionController::advance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advance {
    /// The token that was current and is now completed.
    pub completed: Option<QueueToken>,
    /// The token that is now current.
    pub called: Option<QueueToken>,
}

/// Drives tokens through `waiting -> current -> completed` and the
/// cancellation escape edges.
pub struct QueueProgressionController {
    store: Arc<dyn QueueStore>,
    locks: Arc<SessionLocks>,
    clock: SharedClock,
    listener: Option<QueueEventListener>,
}

impl QueueProgressionController {
    /// Creates a controller over a store.
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

    /// Call the lowest-numbered waiting token.
    ///
    /// # Errors
    /// [`QueueError::CurrentAlreadyServing`] if a token is being served; complete
    /// or cancel it first, or use [`advance`](Self::advance).
    /// [`QueueError::QueueEmpty`] if nobody is waiting.
    pub async fn call_next(&self, session_id: SessionId) -> Result<QueueToken, QueueError> {
        let _guard = self.locks.progression(session_id).await?;
        let session = self.load_session(session_id)?;
        if let Some(current) = session.current_token {
            return Err(QueueError::CurrentAlreadyServing {
                session_id,
                token_number: current.token_number,
            });
        }
        self.promote_next(&session)
    }

    /// Complete the current token.
    ///
    /// # Errors
    /// [`QueueError::NotCurrent`] unless the token is current.
    pub async fn complete(&self, token_id: TokenId) -> Result<QueueToken, QueueError> {
        let session_id = self.load_token(token_id)?.session_id;
        let _guard = self.locks.progression(session_id).await?;
        let token = self.load_token(token_id)?;
        if token.status != TokenStatus::Current {
            return Err(QueueError::NotCurrent {
                token_id,
                status: token.status,
            });
        }
        self.finish(&token, TokenStatus::Completed)
    }

    /// Cancel a waiting or current token. Cancelling the current token leaves
    /// the session with nobody being served; the next call is explicit.
    ///
    /// # Errors
    /// [`QueueError::InvalidTransition`] from `completed` or `cancelled`.
    pub async fn cancel(&self, token_id: TokenId) -> Result<QueueToken, QueueError> {
        let session_id = self.load_token(token_id)?.session_id;
        let _guard = self.locks.progression(session_id).await?;
        let token = self.load_token(token_id)?;
        if !token.status.can_transition_to(TokenStatus::Cancelled) {
            return Err(QueueError::InvalidTransition {
                token_id,
                from: token.status,
                to: TokenStatus::Cancelled,
            });
        }
        self.finish(&token, TokenStatus::Cancelled)
    }

    /// Complete the current token, if any, then call the next one, as a
    /// single step under the session lock.
    ///
    /// # Errors
    /// [`QueueError::QueueEmpty`] only when there was nothing to complete and
    /// nobody to call.
    pub async fn advance(&self, session_id: SessionId) -> Result<Advance, QueueError> {
        let _guard = self.locks.progression(session_id).await?;
        let session = self.load_session(session_id)?;

        let completed = match session.current_token {
            Some(current) => {
                let token = self.load_token(current.token_id)?;
                Some(self.finish(&token, TokenStatus::Completed)?)
            }
            None => None,
        };

        let session = self.load_session(session_id)?;
        let called = match self.promote_next(&session) {
            Ok(token) => Some(token),
            Err(QueueError::QueueEmpty(_)) if completed.is_some() => None,
            Err(error) => return Err(error),
        };
        Ok(Advance { completed, called })
    }

    /// Attach or clear the internal staff note. Status is untouched.
    pub fn attach_note(
        &self,
        token_id: TokenId,
        note: Option<String>,
    ) -> Result<QueueToken, QueueError> {
        let token = self.store.update_token(token_id, &mut |token| {
            token.note = note.clone();
            Ok(())
        })?;
        debug!("token {}: note updated", token_id);
        Ok(token)
    }

    /// Link prescription and payment records to a token.
    pub fn link_record(
        &self,
        token_id: TokenId,
        link: RecordLink,
    ) -> Result<QueueToken, QueueError> {
        let token = self.store.update_token(token_id, &mut |token| {
            token.record_link = link.clone();
            Ok(())
        })?;
        debug!("token {}: record link updated", token_id);
        Ok(token)
    }

    /// Link the patient record returned by the patient directory.
    pub fn link_patient(
        &self,
        token_id: TokenId,
        patient_id: PatientId,
    ) -> Result<QueueToken, QueueError> {
        self.store.update_token(token_id, &mut |token| {
            token.patient_id = Some(patient_id);
            Ok(())
        })
    }

    /// Hard-delete a token, e.g. a mis-entry. Other numbers are left alone
    /// and the deleted number is never issued again.
    pub async fn delete_token(&self, token_id: TokenId) -> Result<QueueToken, QueueError> {
        let session_id = self.load_token(token_id)?.session_id;
        let _guard = self.locks.progression(session_id).await?;

        let removed = self
            .store
            .remove_token(token_id)?
            .ok_or(QueueError::TokenNotFound(token_id))?;
        self.clear_pointer_if(session_id, token_id)?;

        info!(
            "session {}: token #{} deleted",
            session_id, removed.token_number
        );
        telemetry::record_progression("delete");
        emit(
            &self.listener,
            QueueEvent::TokenDeleted {
                session_id,
                token_id,
                token_number: removed.token_number,
            },
        );
        Ok(removed)
    }

    /// The token being served, read through the session's pointer.
    pub fn current_token(&self, session_id: SessionId) -> Result<Option<QueueToken>, QueueError> {
        match self.load_session(session_id)?.current_token {
            Some(current) => self.store.token(current.token_id),
            None => Ok(None),
        }
    }

    /// All tokens of a session in token-number order.
    pub fn tokens(&self, session_id: SessionId) -> Result<Vec<QueueToken>, QueueError> {
        self.load_session(session_id)?;
        self.store.session_tokens(session_id)
    }

    /// Fetch a token.
    pub fn token(&self, token_id: TokenId) -> Result<QueueToken, QueueError> {
        self.load_token(token_id)
    }

    // Caller holds the progression lock and has checked there is no current token.
    fn promote_next(&self, session: &QueueSession) -> Result<QueueToken, QueueError> {
        let next = self
            .store
            .first_waiting(session.id)?
            .ok_or(QueueError::QueueEmpty(session.id))?;
        let now = self.clock.now();

        let called = self.store.update_token(next.id, &mut |token| {
            if !token.status.can_transition_to(TokenStatus::Current) {
                return Err(QueueError::InvalidTransition {
                    token_id: token.id,
                    from: token.status,
                    to: TokenStatus::Current,
                });
            }
            token.status = TokenStatus::Current;
            token.called_at = Some(now);
            Ok(())
        })?;

        let pointer = CurrentToken {
            token_id: called.id,
            token_number: called.token_number,
        };
        self.store.update_session(session.id, &mut |session| {
            session.current_token = Some(pointer);
            session.last_called_number = Some(pointer.token_number);
            Ok(())
        })?;

        info!(
            "session {}: now serving #{}",
            session.id, called.token_number
        );
        telemetry::record_progression("call");
        self.emit_status(&called);
        Ok(called)
    }

    // Caller holds the progression lock.
    fn finish(&self, token: &QueueToken, status: TokenStatus) -> Result<QueueToken, QueueError> {
        let now = self.clock.now();
        let updated = self.store.update_token(token.id, &mut |row| {
            if !row.status.can_transition_to(status) {
                return Err(QueueError::InvalidTransition {
                    token_id: row.id,
                    from: row.status,
                    to: status,
                });
            }
            row.status = status;
            match status {
                TokenStatus::Completed => row.completed_at = Some(now),
                TokenStatus::Cancelled => row.cancelled_at = Some(now),
                TokenStatus::Waiting | TokenStatus::Current => {}
            }
            Ok(())
        })?;
        self.clear_pointer_if(updated.session_id, updated.id)?;

        let action = if status == TokenStatus::Completed {
            "complete"
        } else {
            "cancel"
        };
        info!(
            "session {}: token #{} {}",
            updated.session_id, updated.token_number, status
        );
        telemetry::record_progression(action);
        self.emit_status(&updated);
        Ok(updated)
    }

    fn clear_pointer_if(&self, session_id: SessionId, token_id: TokenId) -> Result<(), QueueError> {
        let points_here = self
            .load_session(session_id)?
            .current_token
            .is_some_and(|current| current.token_id == token_id);
        if points_here {
            self.store.update_session(session_id, &mut |session| {
                session.current_token = None;
                Ok(())
            })?;
        }
        Ok(())
    }

    fn emit_status(&self, token: &QueueToken) {
        emit(
            &self.listener,
            QueueEvent::TokenStatusChanged {
                session_id: token.session_id,
                token_id: token.id,
                token_number: token.token_number,
                status: token.status,
            },
        );
    }

    fn load_session(&self, session_id: SessionId) -> Result<QueueSession, QueueError> {
        self.store
            .session(session_id)?
            .ok_or(QueueError::SessionNotFound(session_id))
    }

    fn load_token(&self, token_id: TokenId) -> Result<QueueToken, QueueError> {
        self.store
            .token(token_id)?
            .ok_or(QueueError::TokenNotFound(token_id))
    }
}

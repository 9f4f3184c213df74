//! Session lifecycle: creation, status, booking flag, capacity and deletion.

use super::error::QueueError;
use super::events::{QueueEvent, QueueEventListener, emit};
use super::locks::SessionLocks;
use super::store::{QueueStore, TokenCounts};
use super::types::{
    ChamberId, DEFAULT_AVG_CONSULTATION_MINUTES, DoctorId, QueueSession, SessionId,
    SessionStatus,
};
use crate::utils::SharedClock;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Parameters of a session to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    /// Hosting chamber.
    pub chamber_id: ChamberId,
    /// Doctor running the session.
    pub doctor_id: DoctorId,
    /// Calendar date.
    pub date: NaiveDate,
    /// Scheduled start.
    pub start_time: NaiveTime,
    /// Scheduled end.
    pub end_time: NaiveTime,
    /// Maximum number of non-cancelled tokens.
    pub max_patients: u32,
    /// Consultation length; the registry default applies when `None`.
    pub avg_consultation_minutes: Option<u32>,
    /// Initial booking flag.
    pub booking_open: bool,
}

impl NewSession {
    /// A session with booking open and the default consultation length.
    pub fn new(
        chamber_id: ChamberId,
        doctor_id: DoctorId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        max_patients: u32,
    ) -> Self {
        Self {
            chamber_id,
            doctor_id,
            date,
            start_time,
            end_time,
            max_patients,
            avg_consultation_minutes: None,
            booking_open: true,
        }
    }

    /// Sets the average consultation length.
    pub fn with_avg_consultation_minutes(mut self, minutes: u32) -> Self {
        self.avg_consultation_minutes = Some(minutes);
        self
    }

    /// Creates the session with booking closed.
    pub fn with_booking_closed(mut self) -> Self {
        self.booking_open = false;
        self
    }
}

/// Occupancy of one session, shown to a caller after a failed admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOccupancy {
    /// Session described.
    pub session_id: SessionId,
    /// Configured capacity.
    pub capacity: u32,
    /// Tokens per status.
    pub waiting: u32,
    /// Tokens being served.
    pub current: u32,
    /// Served tokens.
    pub completed: u32,
    /// Withdrawn tokens.
    pub cancelled: u32,
    /// Free capacity slots.
    pub remaining: u32,
    /// Number of the token being served.
    pub current_token_number: Option<u32>,
    /// Booking flag.
    pub booking_open: bool,
    /// Operational status.
    pub status: SessionStatus,
}

impl SessionOccupancy {
    fn new(session: &QueueSession, counts: TokenCounts) -> Self {
        Self {
            session_id: session.id,
            capacity: session.max_patients,
            waiting: counts.waiting,
            current: counts.current,
            completed: counts.completed,
            cancelled: counts.cancelled,
            remaining: session.max_patients.saturating_sub(counts.booked()),
            current_token_number: session.current_token_number(),
            booking_open: session.booking_open,
            status: session.status,
        }
    }

    /// `true` when an admission could succeed right now.
    #[must_use]
    pub fn accepts_bookings(&self) -> bool {
        self.booking_open && self.status != SessionStatus::Closed && self.remaining > 0
    }
}

/// Owner of session metadata.
///
/// Status and booking toggles are independent single-row writes. Capacity
/// changes and deletion take the session's admission lock so they cannot
/// interleave with a token being admitted.
pub struct SessionRegistry {
    store: Arc<dyn QueueStore>,
    locks: Arc<SessionLocks>,
    clock: SharedClock,
    listener: Option<QueueEventListener>,
    default_avg_consultation_minutes: u32,
}

impl SessionRegistry {
    /// Creates a registry over a store.
    pub fn new(store: Arc<dyn QueueStore>, locks: Arc<SessionLocks>, clock: SharedClock) -> Self {
        Self {
            store,
            locks,
            clock,
            listener: None,
            default_avg_consultation_minutes: DEFAULT_AVG_CONSULTATION_MINUTES,
        }
    }

    /// Registers a change listener.
    pub fn with_listener(mut self, listener: Option<QueueEventListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Consultation length for sessions created without one.
    pub fn with_default_avg_consultation_minutes(mut self, minutes: u32) -> Self {
        self.default_avg_consultation_minutes = minutes;
        self
    }

    /// Create a session.
    ///
    /// # Errors
    /// [`QueueError::InvalidRange`] if `end_time <= start_time`,
    /// [`QueueError::InvalidCapacity`] if capacity is zero,
    /// [`QueueError::InvalidConsultationMinutes`] if the consultation length is zero.
    pub fn create_session(&self, request: NewSession) -> Result<QueueSession, QueueError> {
        if request.end_time <= request.start_time {
            return Err(QueueError::InvalidRange {
                message: format!(
                    "session must end after it starts ({} -> {})",
                    request.start_time, request.end_time
                ),
            });
        }
        if request.max_patients < 1 {
            return Err(QueueError::InvalidCapacity(request.max_patients));
        }
        let avg = request
            .avg_consultation_minutes
            .unwrap_or(self.default_avg_consultation_minutes);
        if avg == 0 {
            return Err(QueueError::InvalidConsultationMinutes(avg));
        }

        let session = QueueSession {
            id: SessionId::new(),
            chamber_id: request.chamber_id,
            doctor_id: request.doctor_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            max_patients: request.max_patients,
            booking_open: request.booking_open,
            status: SessionStatus::Open,
            avg_consultation_minutes: avg,
            last_token_number: 0,
            current_token: None,
            last_called_number: None,
            created_at: self.clock.now(),
            status_changed_at: None,
        };
        self.store.insert_session(session.clone())?;

        info!(
            "session {} created for chamber {} on {} {}-{}, capacity {}",
            session.id,
            session.chamber_id,
            session.date,
            session.start_time,
            session.end_time,
            session.max_patients
        );
        emit(
            &self.listener,
            QueueEvent::SessionCreated {
                session_id: session.id,
            },
        );
        Ok(session)
    }

    /// Fetch a session.
    pub fn get_session(&self, session_id: SessionId) -> Result<QueueSession, QueueError> {
        self.store
            .session(session_id)?
            .ok_or(QueueError::SessionNotFound(session_id))
    }

    /// Sessions of a chamber on a date, earliest start first.
    pub fn list_sessions(
        &self,
        chamber_id: ChamberId,
        date: NaiveDate,
    ) -> Result<Vec<QueueSession>, QueueError> {
        self.store.sessions_on(chamber_id, date)
    }

    /// Move a session to any status. Operators may start early, finish late
    /// or reopen, so no ordering is enforced. The change time is recorded.
    pub fn set_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<QueueSession, QueueError> {
        let now = self.clock.now();
        let mut previous = status;
        let updated = self.store.update_session(session_id, &mut |session| {
            previous = session.status;
            if session.status != status {
                session.status = status;
                session.status_changed_at = Some(now);
            }
            Ok(())
        })?;

        if previous != status {
            info!("session {}: status {} -> {}", session_id, previous, status);
            emit(
                &self.listener,
                QueueEvent::SessionStatusChanged {
                    session_id,
                    from: previous,
                    to: status,
                },
            );
        }
        Ok(updated)
    }

    /// Open or close booking. Always permitted, whatever the status.
    pub fn set_booking_open(
        &self,
        session_id: SessionId,
        booking_open: bool,
    ) -> Result<QueueSession, QueueError> {
        let updated = self.store.update_session(session_id, &mut |session| {
            session.booking_open = booking_open;
            Ok(())
        })?;
        info!("session {}: booking_open = {}", session_id, booking_open);
        emit(
            &self.listener,
            QueueEvent::BookingToggled {
                session_id,
                booking_open,
            },
        );
        Ok(updated)
    }

    /// Change capacity.
    ///
    /// # Errors
    /// [`QueueError::InvalidCapacity`] for zero, [`QueueError::CapacityBelowBooked`]
    /// if fewer slots than non-cancelled tokens are requested,
    /// [`QueueError::Busy`] if an admission holds the session too long.
    pub async fn set_capacity(
        &self,
        session_id: SessionId,
        capacity: u32,
    ) -> Result<QueueSession, QueueError> {
        if capacity < 1 {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        // Unknown ids never get a lock entry.
        self.get_session(session_id)?;
        let _guard = self.locks.admission(session_id).await?;

        let booked = self.store.count_tokens(session_id)?.booked();
        if capacity < booked {
            warn!(
                "session {}: capacity {} rejected, {} already booked",
                session_id, capacity, booked
            );
            return Err(QueueError::CapacityBelowBooked {
                requested: capacity,
                booked,
            });
        }
        let updated = self.store.update_session(session_id, &mut |session| {
            session.max_patients = capacity;
            Ok(())
        })?;

        info!("session {}: capacity set to {}", session_id, capacity);
        emit(&self.listener, QueueEvent::SessionUpdated { session_id });
        Ok(updated)
    }

    /// Change the average consultation length. Estimates pick it up on the
    /// next read.
    pub fn set_avg_consultation_minutes(
        &self,
        session_id: SessionId,
        minutes: u32,
    ) -> Result<QueueSession, QueueError> {
        if minutes == 0 {
            return Err(QueueError::InvalidConsultationMinutes(minutes));
        }
        let updated = self.store.update_session(session_id, &mut |session| {
            session.avg_consultation_minutes = minutes;
            Ok(())
        })?;
        trace!("session {}: avg consultation {}m", session_id, minutes);
        emit(&self.listener, QueueEvent::SessionUpdated { session_id });
        Ok(updated)
    }

    /// Delete a session whose tokens are all completed or cancelled. Those
    /// tokens are removed with it.
    ///
    /// # Errors
    /// [`QueueError::SessionHasActiveTokens`] while any token waits or is
    /// being served.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<QueueSession, QueueError> {
        self.get_session(session_id)?;
        let _admission = self.locks.admission(session_id).await?;
        let _progression = self.locks.progression(session_id).await?;

        if self.store.session(session_id)?.is_none() {
            // Deleted while this call waited for the locks.
            self.locks.forget(session_id);
            return Err(QueueError::SessionNotFound(session_id));
        }
        let active = self.store.count_tokens(session_id)?.active();
        if active > 0 {
            warn!(
                "session {}: delete refused, {} active tokens",
                session_id, active
            );
            return Err(QueueError::SessionHasActiveTokens { session_id, active });
        }

        let removed = self
            .store
            .remove_session(session_id)?
            .ok_or(QueueError::SessionNotFound(session_id))?;
        self.locks.forget(session_id);

        info!("session {} deleted", session_id);
        emit(&self.listener, QueueEvent::SessionDeleted { session_id });
        Ok(removed)
    }

    /// Occupancy summary of a session.
    pub fn occupancy(&self, session_id: SessionId) -> Result<SessionOccupancy, QueueError> {
        let session = self.get_session(session_id)?;
        let counts = self.store.count_tokens(session_id)?;
        Ok(SessionOccupancy::new(&session, counts))
    }
}

//! Booking write path: the public form and the front desk.
//!
//! Requests are cleaned, rate limited on the public route, admitted through
//! the [`TokenSequencer`] and answered with a receipt carrying the wait
//! estimate. Linking the patient record happens after the token is
//! committed and never undoes it.

use crate::queue::directory::PatientDirectory;
use crate::queue::error::QueueError;
use crate::queue::estimate::{WaitEstimate, WaitEstimator};
use crate::queue::progression::QueueProgressionController;
use crate::queue::rate_limit::RateLimiter;
use crate::queue::registry::SessionRegistry;
use crate::queue::sequencer::{AdmissionRequest, TokenSequencer};
use crate::queue::telemetry;
use crate::queue::types::{BookedBy, PatientDetails, PatientId, QueueToken, SessionId, TokenId};
use crate::utils::{SharedClock, normalize_phone};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Booking form input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Session to book into.
    pub session_id: SessionId,
    /// Patient identity fields as typed.
    pub patient: PatientDetails,
    /// Optional reason for the visit.
    pub visiting_reason: Option<String>,
}

impl BookingRequest {
    /// Creates a booking request.
    pub fn new(session_id: SessionId, patient: PatientDetails) -> Self {
        Self {
            session_id,
            patient,
            visiting_reason: None,
        }
    }

    /// Attaches a visiting reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.visiting_reason = Some(reason.into());
        self
    }
}

/// What the booking widget shows after a successful booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReceipt {
    /// New token id.
    pub token_id: TokenId,
    /// Session booked into.
    pub session_id: SessionId,
    /// Assigned token number.
    pub token_number: u32,
    /// Position and expected call time at booking.
    pub estimate: WaitEstimate,
    /// Patient record id, when the patient directory accepted the upsert.
    pub patient_id: Option<PatientId>,
}

/// Write path for the public booking widget and the staff desk.
///
/// Patient-record upsert runs after the token is committed and can never
/// undo it: a failing directory is logged and the receipt comes back
/// without a patient id.
pub struct BookingGateway {
    registry: Arc<SessionRegistry>,
    sequencer: Arc<TokenSequencer>,
    controller: Arc<QueueProgressionController>,
    patients: Option<Arc<dyn PatientDirectory>>,
    limiter: RateLimiter,
    clock: SharedClock,
}

impl BookingGateway {
    /// Creates a booking gateway.
    pub fn new(
        registry: Arc<SessionRegistry>,
        sequencer: Arc<TokenSequencer>,
        controller: Arc<QueueProgressionController>,
        limiter: RateLimiter,
        clock: SharedClock,
    ) -> Self {
        Self {
            registry,
            sequencer,
            controller,
            patients: None,
            limiter,
            clock,
        }
    }

    /// Sets the patient-record collaborator.
    pub fn with_patient_directory(mut self, patients: Option<Arc<dyn PatientDirectory>>) -> Self {
        self.patients = patients;
        self
    }

    /// Public booking, charged against `client`'s rate budget.
    ///
    /// # Errors
    /// [`QueueError::RateLimited`] when over budget, any admission error
    /// otherwise.
    pub async fn book_public(
        &self,
        client: &str,
        request: BookingRequest,
    ) -> Result<BookingReceipt, QueueError> {
        if let Err(error) = self.limiter.check(client) {
            telemetry::record_rate_limited("booking");
            return Err(error);
        }
        self.book(request, BookedBy::Public).await
    }

    /// Staff-desk booking. Skips rate limiting; capacity and the booking
    /// flag still apply.
    pub async fn book_staff(&self, request: BookingRequest) -> Result<BookingReceipt, QueueError> {
        self.book(request, BookedBy::Staff).await
    }

    async fn book(
        &self,
        request: BookingRequest,
        booked_by: BookedBy,
    ) -> Result<BookingReceipt, QueueError> {
        let patient = Self::clean_patient(request.patient)?;
        let visiting_reason = request
            .visiting_reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());

        let token = self
            .sequencer
            .admit(AdmissionRequest {
                session_id: request.session_id,
                patient,
                booked_by,
                visiting_reason,
            })
            .await?;

        let patient_id = self.upsert_patient(&token);
        let session = self.registry.get_session(token.session_id)?;
        let estimate = WaitEstimator::estimate(&session, token.token_number, self.clock.now());

        Ok(BookingReceipt {
            token_id: token.id,
            session_id: token.session_id,
            token_number: token.token_number,
            estimate,
            patient_id,
        })
    }

    fn clean_patient(mut patient: PatientDetails) -> Result<PatientDetails, QueueError> {
        patient.name = patient.name.trim().to_string();
        patient.phone = normalize_phone(&patient.phone);
        if patient.name.is_empty() {
            return Err(QueueError::InvalidOperation {
                message: "patient name is required".to_string(),
            });
        }
        if !patient.phone.chars().any(|c| c.is_ascii_digit()) {
            return Err(QueueError::InvalidOperation {
                message: "patient phone number is required".to_string(),
            });
        }
        Ok(patient)
    }

    fn upsert_patient(&self, token: &QueueToken) -> Option<PatientId> {
        let directory = self.patients.as_ref()?;
        let patient_id = match directory.upsert_patient(token.chamber_id, &token.patient) {
            Ok(id) => id,
            Err(error) => {
                warn!(
                    "token {}: patient upsert failed, token kept: {}",
                    token.id, error
                );
                return None;
            }
        };
        if let Err(error) = self.controller.link_patient(token.id, patient_id) {
            warn!("token {}: patient link failed: {}", token.id, error);
            return None;
        }
        debug!("token {}: linked patient {}", token.id, patient_id);
        Some(patient_id)
    }
}

//! Public status lookup by phone number.

use crate::queue::directory::{ChamberDirectory, ChamberProfile, DoctorProfile};
use crate::queue::error::QueueError;
use crate::queue::estimate::{WaitEstimate, WaitEstimator};
use crate::queue::rate_limit::RateLimiter;
use crate::queue::store::QueueStore;
use crate::queue::telemetry;
use crate::queue::types::{QueueSession, QueueToken, SessionId, SessionStatus, TokenStatus};
use crate::utils::{SharedClock, normalize_phone};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Status page input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    /// Phone number used at booking, in any common format.
    pub phone: String,
    /// Booking date; today when absent.
    pub date: Option<NaiveDate>,
    /// Token number, to pick one of several bookings.
    pub token_number: Option<u32>,
}

impl StatusQuery {
    /// Lookup by phone for today.
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            date: None,
            token_number: None,
        }
    }

    /// Looks at a specific date.
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Narrows to one token number.
    pub fn with_token(mut self, token_number: u32) -> Self {
        self.token_number = Some(token_number);
        self
    }
}

/// What the public status page renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    /// Chamber description, if the directory knows it.
    pub chamber: Option<ChamberProfile>,
    /// Doctor description, if the directory knows it.
    pub doctor: Option<DoctorProfile>,
    /// Session of the matched token.
    pub session_id: SessionId,
    /// Session date.
    pub date: NaiveDate,
    /// Scheduled start.
    pub start_time: NaiveTime,
    /// Scheduled end.
    pub end_time: NaiveTime,
    /// Operational status of the session.
    pub session_status: SessionStatus,
    /// Caller's token number.
    pub token_number: u32,
    /// Caller's token status, `waiting` or `current`.
    pub token_status: TokenStatus,
    /// Token being served right now.
    pub current_token_number: Option<u32>,
    /// Position and expected call time.
    pub estimate: WaitEstimate,
}

/// Rate-limited, read-only lookup behind the polled status page.
///
/// Each lookup runs on the blocking pool under a deadline. Anything other
/// than `NotFound`, `AlreadyServed` or `RateLimited` reaches the caller as
/// [`QueueError::NetworkError`], so internal detail never leaks and a slow
/// store cannot hang a poller.
pub struct PublicStatusGateway {
    resolver: Arc<StatusResolver>,
    limiter: RateLimiter,
    timeout: Duration,
}

struct StatusResolver {
    store: Arc<dyn QueueStore>,
    chambers: Option<Arc<dyn ChamberDirectory>>,
    clock: SharedClock,
}

impl PublicStatusGateway {
    /// Creates a status gateway.
    pub fn new(
        store: Arc<dyn QueueStore>,
        limiter: RateLimiter,
        clock: SharedClock,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver: Arc::new(StatusResolver {
                store,
                chambers: None,
                clock,
            }),
            limiter,
            timeout,
        }
    }

    /// Sets the source of chamber and doctor descriptions.
    pub fn with_chamber_directory(mut self, chambers: Option<Arc<dyn ChamberDirectory>>) -> Self {
        let resolver = StatusResolver {
            store: Arc::clone(&self.resolver.store),
            chambers,
            clock: Arc::clone(&self.resolver.clock),
        };
        self.resolver = Arc::new(resolver);
        self
    }

    /// Look up the caller's place in line.
    ///
    /// # Errors
    /// - [`QueueError::RateLimited`]: over the client's budget
    /// - [`QueueError::NotFound`]: no booking for this phone and date
    /// - [`QueueError::AlreadyServed`]: the booking is completed or cancelled
    /// - [`QueueError::NetworkError`]: internal fault or deadline exceeded
    pub async fn lookup(&self, client: &str, query: StatusQuery) -> Result<StatusView, QueueError> {
        if let Err(error) = self.limiter.check(client) {
            telemetry::record_rate_limited("lookup");
            telemetry::record_lookup("rate_limited");
            return Err(error);
        }

        let resolver = Arc::clone(&self.resolver);
        let task = tokio::task::spawn_blocking(move || resolver.resolve(&query));
        let result = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                warn!("status lookup task failed: {}", join_error);
                Err(QueueError::NetworkError)
            }
            Err(_) => {
                warn!("status lookup exceeded {:?}", self.timeout);
                Err(QueueError::NetworkError)
            }
        };

        match result {
            Ok(view) => {
                telemetry::record_lookup("found");
                Ok(view)
            }
            Err(QueueError::NotFound) => {
                telemetry::record_lookup("not_found");
                Err(QueueError::NotFound)
            }
            Err(error @ QueueError::AlreadyServed { .. }) => {
                telemetry::record_lookup("already_served");
                Err(error)
            }
            Err(QueueError::NetworkError) => {
                telemetry::record_lookup("error");
                Err(QueueError::NetworkError)
            }
            Err(error) => {
                warn!("status lookup failed: {}", error);
                telemetry::record_lookup("error");
                Err(QueueError::NetworkError)
            }
        }
    }
}

impl StatusResolver {
    fn resolve(&self, query: &StatusQuery) -> Result<StatusView, QueueError> {
        let phone = normalize_phone(&query.phone);
        if phone.is_empty() {
            return Err(QueueError::NotFound);
        }
        let date = query.date.unwrap_or_else(|| self.clock.today());

        let candidates: Vec<QueueToken> = self
            .store
            .tokens_by_phone(&phone, date)?
            .into_iter()
            .filter(|token| query.token_number.is_none_or(|n| token.token_number == n))
            .collect();
        debug!(
            "status lookup on {}: {} candidate tokens",
            date,
            candidates.len()
        );
        if candidates.is_empty() {
            return Err(QueueError::NotFound);
        }

        let mut sessions: HashMap<SessionId, QueueSession> = HashMap::new();
        for token in &candidates {
            if let Entry::Vacant(slot) = sessions.entry(token.session_id) {
                let session = self.store.session(token.session_id)?.ok_or_else(|| {
                    QueueError::Storage {
                        message: format!("token {} has no session", token.id),
                    }
                })?;
                slot.insert(session);
            }
        }
        let order = |token: &QueueToken| {
            let start = sessions.get(&token.session_id).map(|s| s.start_time);
            (start, token.token_number)
        };

        let active = candidates
            .iter()
            .filter(|token| token.status.is_active())
            .min_by_key(|token| order(*token));
        let token = match active {
            Some(token) => token,
            None => {
                let latest = candidates
                    .iter()
                    .max_by_key(|token| order(*token))
                    .ok_or(QueueError::NotFound)?;
                return Err(QueueError::AlreadyServed {
                    token_number: latest.token_number,
                    status: latest.status,
                });
            }
        };

        let session = sessions
            .get(&token.session_id)
            .ok_or(QueueError::NotFound)?;
        let estimate = WaitEstimator::estimate(session, token.token_number, self.clock.now());
        let (chamber, doctor) = self.describe(session);

        Ok(StatusView {
            chamber,
            doctor,
            session_id: session.id,
            date: session.date,
            start_time: session.start_time,
            end_time: session.end_time,
            session_status: session.status,
            token_number: token.token_number,
            token_status: token.status,
            current_token_number: session.current_token_number(),
            estimate,
        })
    }

    // Descriptive only; a failing directory degrades the view, not the lookup.
    fn describe(&self, session: &QueueSession) -> (Option<ChamberProfile>, Option<DoctorProfile>) {
        let Some(directory) = &self.chambers else {
            return (None, None);
        };
        let chamber = directory.chamber(session.chamber_id).unwrap_or_else(|error| {
            warn!("chamber {} lookup failed: {}", session.chamber_id, error);
            None
        });
        let doctor = directory.doctor(session.doctor_id).unwrap_or_else(|error| {
            warn!("doctor {} lookup failed: {}", session.doctor_id, error);
            None
        });
        (chamber, doctor)
    }
}

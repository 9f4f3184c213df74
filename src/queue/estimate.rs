//! Position-in-line and wait-time estimates.
//!
//! Everything here is a pure function of the session, a token number and
//! "now". Nothing is cached: capacity edits, cancellations and a new current
//! token all shift the numbers, so callers recompute on every read.

use super::types::QueueSession;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Which formula produced the expected call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMode {
    /// Nobody has been called yet: offset from the scheduled start.
    PreSession,
    /// The queue is moving: offset from now.
    Live,
}

/// A computed estimate for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitEstimate {
    /// Token the estimate is for.
    pub token_number: u32,
    /// Current token, or the last one called if nobody is being served.
    pub progress_number: Option<u32>,
    /// Patients still to be seen before this token.
    pub patients_ahead: u32,
    /// `patients_ahead * avg_consultation_minutes`.
    pub estimated_wait_minutes: u32,
    /// Session start plus one consultation per earlier token.
    pub scheduled_call_time: NaiveDateTime,
    /// Best guess at when this token is called, per `mode`.
    pub expected_call_time: NaiveDateTime,
    /// Formula used for `expected_call_time`.
    pub mode: EstimateMode,
}

/// Wait-time arithmetic.
pub struct WaitEstimator;

impl WaitEstimator {
    /// Patients ahead of `token_number`.
    ///
    /// With nobody called yet everyone with a lower number is ahead.
    /// Otherwise only the tokens strictly between the current one and this one.
    #[must_use]
    pub fn patients_ahead(token_number: u32, current_token_number: Option<u32>) -> u32 {
        match current_token_number {
            None => token_number.saturating_sub(1),
            Some(current) => token_number.saturating_sub(current).saturating_sub(1),
        }
    }

    /// Minutes of waiting for `patients_ahead` consultations.
    #[must_use]
    #[inline]
    pub fn estimated_wait_minutes(patients_ahead: u32, avg_consultation_minutes: u32) -> u32 {
        patients_ahead.saturating_mul(avg_consultation_minutes)
    }

    /// Expected call time before the session starts serving.
    #[must_use]
    pub fn pre_session_call_time(session: &QueueSession, token_number: u32) -> NaiveDateTime {
        let offset = i64::from(token_number.saturating_sub(1))
            * i64::from(session.avg_consultation_minutes);
        session.starts_at() + Duration::minutes(offset)
    }

    /// Expected call time once the queue is moving.
    #[must_use]
    pub fn live_call_time(now: NaiveDateTime, estimated_wait_minutes: u32) -> NaiveDateTime {
        now + Duration::minutes(i64::from(estimated_wait_minutes))
    }

    /// Full estimate for `token_number` in `session` at `now`.
    #[must_use]
    pub fn estimate(session: &QueueSession, token_number: u32, now: NaiveDateTime) -> WaitEstimate {
        let progress_number = session.progress_marker();
        let patients_ahead = Self::patients_ahead(token_number, progress_number);
        let estimated_wait_minutes =
            Self::estimated_wait_minutes(patients_ahead, session.avg_consultation_minutes);
        let scheduled_call_time = Self::pre_session_call_time(session, token_number);

        let (mode, expected_call_time) = match progress_number {
            Some(_) => (
                EstimateMode::Live,
                Self::live_call_time(now, estimated_wait_minutes),
            ),
            None => (EstimateMode::PreSession, scheduled_call_time),
        };

        WaitEstimate {
            token_number,
            progress_number,
            patients_ahead,
            estimated_wait_minutes,
            scheduled_call_time,
            expected_call_time,
            mode,
        }
    }
}

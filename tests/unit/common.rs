#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use walkin_queue::{
    BookingRequest, ChamberId, DoctorId, ManualClock, MemoryStore, NewSession, PatientDetails,
    QueueConfig, QueueEngine, QueueEngineBuilder, QueueError, QueueSession, QueueStore,
    QueueToken, SessionId, SessionUpdate, TokenCounts, TokenId, TokenUpdate,
};

pub const CHAMBER: ChamberId = ChamberId::from_u128(0xC0FFEE);
pub const DOCTOR: DoctorId = DoctorId::from_u128(0xD0C);

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date")
}

pub fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(day().and_time(at(8, 0))))
}

pub fn builder(clock: &Arc<ManualClock>) -> QueueEngineBuilder {
    QueueEngine::builder().with_clock(clock.clone())
}

pub fn engine(clock: &Arc<ManualClock>) -> QueueEngine {
    builder(clock).build().expect("engine")
}

pub fn engine_with(clock: &Arc<ManualClock>, config: QueueConfig) -> QueueEngine {
    builder(clock).with_config(config).build().expect("engine")
}

pub fn evening_session(capacity: u32) -> NewSession {
    NewSession::new(CHAMBER, DOCTOR, day(), at(17, 0), at(20, 0), capacity)
}

pub fn open_session(engine: &QueueEngine, capacity: u32) -> SessionId {
    engine
        .registry()
        .create_session(evening_session(capacity))
        .expect("create session")
        .id
}

pub fn booking(session_id: SessionId, i: usize) -> BookingRequest {
    BookingRequest::new(
        session_id,
        PatientDetails::new(format!("Patient {i}"), format!("01800{i:06}")),
    )
}

pub fn phone(i: usize) -> String {
    format!("01800{i:06}")
}

/// Books `n` patients through the staff desk, returning their token numbers.
pub async fn book_many(engine: &QueueEngine, session_id: SessionId, n: usize) -> Vec<u32> {
    let mut numbers = Vec::with_capacity(n);
    for i in 0..n {
        let receipt = engine
            .booking()
            .book_staff(booking(session_id, i))
            .await
            .expect("staff booking");
        numbers.push(receipt.token_number);
    }
    numbers
}

/// A [`MemoryStore`] with switchable faults.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    phone_delay: Option<Duration>,
    phone_fault: bool,
    fail_token_insert: Option<usize>,
    token_inserts: AtomicUsize,
}

impl FaultyStore {
    /// Phone lookups block for `delay` before answering.
    pub fn slow_phone_lookups(delay: Duration) -> Self {
        Self {
            phone_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Phone lookups fail with a storage error.
    pub fn failing_phone_lookups() -> Self {
        Self {
            phone_fault: true,
            ..Self::default()
        }
    }

    /// Only the `nth` token insert (1-based) fails.
    pub fn failing_token_insert(nth: usize) -> Self {
        Self {
            fail_token_insert: Some(nth),
            ..Self::default()
        }
    }
}

impl QueueStore for FaultyStore {
    fn insert_session(&self, session: QueueSession) -> Result<(), QueueError> {
        self.inner.insert_session(session)
    }

    fn session(&self, id: SessionId) -> Result<Option<QueueSession>, QueueError> {
        self.inner.session(id)
    }

    fn update_session(
        &self,
        id: SessionId,
        update: SessionUpdate<'_>,
    ) -> Result<QueueSession, QueueError> {
        self.inner.update_session(id, update)
    }

    fn remove_session(&self, id: SessionId) -> Result<Option<QueueSession>, QueueError> {
        self.inner.remove_session(id)
    }

    fn sessions_on(
        &self,
        chamber_id: ChamberId,
        date: NaiveDate,
    ) -> Result<Vec<QueueSession>, QueueError> {
        self.inner.sessions_on(chamber_id, date)
    }

    fn all_sessions(&self) -> Result<Vec<QueueSession>, QueueError> {
        self.inner.all_sessions()
    }

    fn insert_token(&self, token: QueueToken) -> Result<(), QueueError> {
        let n = self.token_inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_token_insert == Some(n) {
            return Err(QueueError::Storage {
                message: format!("token insert {n} failed"),
            });
        }
        self.inner.insert_token(token)
    }

    fn token(&self, id: TokenId) -> Result<Option<QueueToken>, QueueError> {
        self.inner.token(id)
    }

    fn update_token(
        &self,
        id: TokenId,
        update: TokenUpdate<'_>,
    ) -> Result<QueueToken, QueueError> {
        self.inner.update_token(id, update)
    }

    fn remove_token(&self, id: TokenId) -> Result<Option<QueueToken>, QueueError> {
        self.inner.remove_token(id)
    }

    fn session_tokens(&self, session_id: SessionId) -> Result<Vec<QueueToken>, QueueError> {
        self.inner.session_tokens(session_id)
    }

    fn first_waiting(&self, session_id: SessionId) -> Result<Option<QueueToken>, QueueError> {
        self.inner.first_waiting(session_id)
    }

    fn count_tokens(&self, session_id: SessionId) -> Result<TokenCounts, QueueError> {
        self.inner.count_tokens(session_id)
    }

    fn tokens_by_phone(
        &self,
        phone: &str,
        date: NaiveDate,
    ) -> Result<Vec<QueueToken>, QueueError> {
        if let Some(delay) = self.phone_delay {
            std::thread::sleep(delay);
        }
        if self.phone_fault {
            return Err(QueueError::Storage {
                message: "phone index unavailable".to_string(),
            });
        }
        self.inner.tokens_by_phone(phone, date)
    }

    fn all_tokens(&self) -> Result<Vec<QueueToken>, QueueError> {
        self.inner.all_tokens()
    }
}

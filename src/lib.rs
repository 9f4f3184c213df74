//! # Walk-In Queue Engine
//!
//! A concurrent token queue for clinic walk-in sessions. Patients book into a capacity-limited time slot, receive a sequential token number, and follow their place in line from a polled status page while the doctor works through the queue.
//!
//! ## Key Features
//!
//! - **Race-Free Admission**: Token numbers are assigned under a per-session serialization point, backed by a `(session, token_number)` uniqueness constraint. Concurrent bookings never produce duplicates and never exceed capacity.
//!
//! - **Single Current Token**: Queue progression (`call_next`, `complete`, `cancel`, `advance`) keeps at most one token in the `current` state per session, tracked through an explicit pointer on the session.
//!
//! - **Session-Scoped Locking**: Locks are per session. Unrelated sessions never contend, and lock acquisition is bounded by a timeout that fails with a retryable `Busy` error.
//!
//! - **Wait Estimates**: Pure functions compute patients ahead, minutes of waiting and an expected call time, either from the scheduled start or live from the current token.
//!
//! - **Rate-Limited Public Paths**: Public booking and status lookup are protected by per-client token buckets. Lookups run under a deadline and map internal faults to a transient `NetworkError`.
//!
//! - **Snapshots**: Both logical tables can be exported to a checksummed JSON package and restored into an empty store.
//!
//! ## Components
//!
//! | Component | Role |
//! |---|---|
//! | [`SessionRegistry`] | Session lifecycle: create, status, booking flag, capacity, delete |
//! | [`TokenSequencer`] | Capacity-checked, collision-free token admission |
//! | [`QueueProgressionController`] | Token state machine and operator actions |
//! | [`WaitEstimator`] | Position and time estimates |
//! | [`BookingGateway`] | Public and staff booking write path |
//! | [`PublicStatusGateway`] | Polled, rate-limited status lookup |
//! | [`QueueEngine`] | Wires all of the above over one [`QueueStore`] |
//!
//! ## Token Lifecycle
//!
//! ```text
//! waiting -> current -> completed
//!    \          \
//!     +----------+--> cancelled
//! ```
//!
//! No transition leaves `completed` or `cancelled`. A token number is assigned once and never reused, even after the token is deleted.
//!
//! ## Error Model
//!
//! Every failure is a [`QueueError`] and is local to one request. [`QueueError::category`] groups errors into admission, progression, lookup, transient, validation and integrity kinds; [`QueueError::is_retryable`] tells a caller whether repeating the request can succeed; [`QueueError::public_message`] gives a safe message for public pages.
//!
//! ## Configuration
//!
//! [`QueueConfig`] holds lock and lookup timeouts, the default consultation length and both rate limits. It loads from JSON or from `WALKIN_QUEUE_*` environment variables and is validated before the engine starts.
//!
//! ## Observability
//!
//! The crate logs through `tracing` and installs no subscriber. With the `metrics` feature it also records admission, progression, lookup and rate-limit counters through the `metrics` facade.
//!
//! ## Example
//!
//! ```rust
//! use walkin_queue::prelude::*;
//! use chrono::{NaiveDate, NaiveTime};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let engine = QueueEngine::builder().build().expect("valid config");
//!
//! let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
//! let session = engine
//!     .registry()
//!     .create_session(NewSession::new(
//!         ChamberId::new(),
//!         DoctorId::new(),
//!         date,
//!         NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
//!         NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
//!         20,
//!     ))
//!     .unwrap();
//!
//! let receipt = engine
//!     .booking()
//!     .book_public(
//!         "203.0.113.7",
//!         BookingRequest::new(session.id, PatientDetails::new("Ayesha", "01711-111111")),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(receipt.token_number, 1);
//!
//! let called = engine.controller().call_next(session.id).await.unwrap();
//! assert_eq!(called.token_number, 1);
//! # });
//! ```
//!
//! ## Status
//! This project is in active development.

pub mod queue;

pub mod prelude;
mod utils;

pub use queue::config::{ConfigError, QueueConfig, RateLimitConfig};
pub use queue::directory::{
    ChamberDirectory, ChamberProfile, DoctorProfile, InMemoryChamberDirectory,
    InMemoryPatientDirectory, PatientDirectory,
};
pub use queue::engine::{QueueEngine, QueueEngineBuilder};
pub use queue::error::{ErrorCategory, QueueError};
pub use queue::estimate::{EstimateMode, WaitEstimate, WaitEstimator};
pub use queue::events::{QueueEvent, QueueEventListener};
pub use queue::gateway::{
    BookingGateway, BookingReceipt, BookingRequest, PublicStatusGateway, StatusQuery, StatusView,
};
pub use queue::progression::{Advance, QueueProgressionController};
pub use queue::rate_limit::RateLimiter;
pub use queue::registry::{NewSession, SessionOccupancy, SessionRegistry};
pub use queue::sequencer::{AdmissionRequest, TokenSequencer};
pub use queue::snapshot::{QUEUE_SNAPSHOT_FORMAT_VERSION, QueueSnapshot, QueueSnapshotPackage};
pub use queue::store::{MemoryStore, QueueStore, SessionUpdate, TokenCounts, TokenUpdate};
pub use queue::types::{
    BookedBy, ChamberId, CurrentToken, DoctorId, PatientDetails, PatientId, QueueSession,
    QueueToken, RecordLink, SessionId, SessionStatus, TokenId, TokenStatus,
};
pub use utils::{Clock, ManualClock, SharedClock, SystemClock, current_time_millis, normalize_phone};

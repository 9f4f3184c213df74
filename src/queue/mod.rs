//! Walk-in queue engine: sessions, token admission, progression and the public read path.

pub mod config;
/// Interfaces to patient, chamber and doctor records owned elsewhere.
pub mod directory;
/// Wiring of all components behind one handle.
pub mod engine;
pub mod error;
pub mod estimate;
/// Change notifications for push-style consumers.
pub mod events;
/// Booking write path and public status read path.
pub mod gateway;
pub mod locks;
/// Operator actions that move tokens through their lifecycle.
pub mod progression;
pub mod rate_limit;
/// Session lifecycle.
pub mod registry;
pub mod sequencer;
pub mod snapshot;
pub mod store;
mod telemetry;
pub mod types;

pub use config::{ConfigError, QueueConfig, RateLimitConfig};
pub use directory::{
    ChamberDirectory, ChamberProfile, DoctorProfile, InMemoryChamberDirectory,
    InMemoryPatientDirectory, PatientDirectory,
};
pub use engine::{QueueEngine, QueueEngineBuilder};
pub use error::{ErrorCategory, QueueError};
pub use estimate::{EstimateMode, WaitEstimate, WaitEstimator};
pub use events::{QueueEvent, QueueEventListener};
pub use gateway::{
    BookingGateway, BookingReceipt, BookingRequest, PublicStatusGateway, StatusQuery, StatusView,
};
pub use locks::SessionLocks;
pub use progression::{Advance, QueueProgressionController};
pub use rate_limit::RateLimiter;
pub use registry::{NewSession, SessionOccupancy, SessionRegistry};
pub use sequencer::{AdmissionRequest, TokenSequencer};
pub use snapshot::{QUEUE_SNAPSHOT_FORMAT_VERSION, QueueSnapshot, QueueSnapshotPackage};
pub use store::{MemoryStore, QueueStore, SessionUpdate, TokenCounts, TokenUpdate};
pub use types::{
    BookedBy, ChamberId, CurrentToken, DoctorId, PatientDetails, PatientId, QueueSession,
    QueueToken, RecordLink, SessionId, SessionStatus, TokenId, TokenStatus,
};

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Prelude module that re-exports commonly used types and traits.
//!
//! This module provides a convenient way to import the most commonly used
//! types, traits, and functions from the walkin-queue crate. Instead of
//! importing each type individually, you can use:
//!
//! ```rust
//! use walkin_queue::prelude::*;
//! ```
//!
//! This will import all the essential types needed for running a queue.

// Engine and components
pub use crate::queue::engine::{QueueEngine, QueueEngineBuilder};
pub use crate::queue::progression::{Advance, QueueProgressionController};
pub use crate::queue::registry::{NewSession, SessionOccupancy, SessionRegistry};
pub use crate::queue::sequencer::{AdmissionRequest, TokenSequencer};

// Records
pub use crate::queue::types::{
    BookedBy, ChamberId, DoctorId, PatientDetails, PatientId, QueueSession, QueueToken,
    RecordLink, SessionId, SessionStatus, TokenId, TokenStatus,
};

// Public paths
pub use crate::queue::gateway::{BookingReceipt, BookingRequest, StatusQuery, StatusView};

// Estimates
pub use crate::queue::estimate::{EstimateMode, WaitEstimate, WaitEstimator};

// Errors and configuration
pub use crate::queue::config::{QueueConfig, RateLimitConfig};
pub use crate::queue::error::{ErrorCategory, QueueError};

// Collaborators and events
pub use crate::queue::directory::{ChamberDirectory, PatientDirectory};
pub use crate::queue::events::{QueueEvent, QueueEventListener};

// Time
pub use crate::utils::{Clock, ManualClock, SystemClock};

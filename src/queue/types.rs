//! Core records of the walk-in queue: sessions, tokens and their identifiers.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default average consultation length in minutes used when a session is
/// created without an explicit value.
pub const DEFAULT_AVG_CONSULTATION_MINUTES: u32 = 10;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Builds a deterministic identifier from a small integer, handy in tests.
            pub const fn from_u128(value: u128) -> Self {
                Self(Uuid::from_u128(value))
            }

            /// Returns the underlying UUID.
            #[must_use]
            #[inline]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a [`QueueSession`].
    SessionId
);
uuid_id!(
    /// Identifier of a [`QueueToken`].
    TokenId
);
uuid_id!(
    /// Reference to a chamber (a physical or virtual practice location).
    ChamberId
);
uuid_id!(
    /// Reference to the doctor or provider running a session.
    DoctorId
);
uuid_id!(
    /// Reference to a patient record held by the patient directory.
    PatientId
);

/// Operational status of a session.
///
/// Independent of [`QueueSession::booking_open`]: a running session may have
/// booking closed and an open one may refuse bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Scheduled, not serving yet.
    #[default]
    Open,
    /// The doctor is seeing patients.
    Running,
    /// Finished for the day. No new admissions.
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Open => write!(f, "open"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Position of a token in its lifecycle.
///
/// ```text
/// waiting -> current -> completed
///    \          \
///     +----------+--> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Admitted and waiting to be called.
    Waiting,
    /// Being served right now.
    Current,
    /// Served.
    Completed,
    /// Withdrawn before or while being served.
    Cancelled,
}

impl TokenStatus {
    /// `true` for `Completed` and `Cancelled`, which have no outgoing edges.
    #[must_use]
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::Cancelled)
    }

    /// `true` when the token occupies a capacity slot (everything but `Cancelled`).
    #[must_use]
    #[inline]
    pub fn counts_toward_capacity(self) -> bool {
        self != TokenStatus::Cancelled
    }

    /// `true` for `Waiting` and `Current`.
    #[must_use]
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, TokenStatus::Waiting | TokenStatus::Current)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: TokenStatus) -> bool {
        matches!(
            (self, next),
            (TokenStatus::Waiting, TokenStatus::Current)
                | (TokenStatus::Current, TokenStatus::Completed)
                | (TokenStatus::Waiting, TokenStatus::Cancelled)
                | (TokenStatus::Current, TokenStatus::Cancelled)
        )
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStatus::Waiting => write!(f, "waiting"),
            TokenStatus::Current => write!(f, "current"),
            TokenStatus::Completed => write!(f, "completed"),
            TokenStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Who created a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookedBy {
    /// Entered by clinic staff at the desk.
    Staff,
    /// Booked through the public widget.
    Public,
}

impl fmt::Display for BookedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookedBy::Staff => write!(f, "staff"),
            BookedBy::Public => write!(f, "public"),
        }
    }
}

/// Identity fields captured with a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDetails {
    /// Patient's display name.
    pub name: String,
    /// Normalised phone number; the lookup key for the public status page.
    pub phone: String,
    /// Age in years, if given.
    pub age: Option<u8>,
    /// Free-form gender field, if given.
    pub gender: Option<String>,
}

impl PatientDetails {
    /// Creates details with just a name and phone number.
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            age: None,
            gender: None,
        }
    }
}

/// Links from a token to records owned by other parts of the product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLink {
    /// Prescription written during the visit.
    pub prescription_id: Option<Uuid>,
    /// Payment taken for the visit.
    pub payment_id: Option<Uuid>,
}

/// A bookable, capacity-bounded time slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSession {
    /// Session identifier.
    pub id: SessionId,
    /// Chamber hosting the session.
    pub chamber_id: ChamberId,
    /// Doctor running the session.
    pub doctor_id: DoctorId,
    /// Calendar date.
    pub date: NaiveDate,
    /// Scheduled start.
    pub start_time: NaiveTime,
    /// Scheduled end, strictly after `start_time`.
    pub end_time: NaiveTime,
    /// Maximum number of non-cancelled tokens.
    pub max_patients: u32,
    /// Whether new admissions are accepted.
    pub booking_open: bool,
    /// Operational status.
    pub status: SessionStatus,
    /// Average consultation length used for estimates.
    pub avg_consultation_minutes: u32,
    /// Highest token number ever assigned in this session.
    pub last_token_number: u32,
    /// Token currently being served, denormalised for cheap reads.
    pub current_token: Option<CurrentToken>,
    /// Number of the most recently called token. Survives completion, so
    /// estimates keep their reference point between two calls.
    #[serde(default)]
    pub last_called_number: Option<u32>,
    /// When the session record was created.
    pub created_at: NaiveDateTime,
    /// When `status` last changed, if ever.
    pub status_changed_at: Option<NaiveDateTime>,
}

impl QueueSession {
    /// Scheduled start as a full timestamp.
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Scheduled end as a full timestamp.
    #[must_use]
    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }

    /// Number of the token being served, if any.
    #[must_use]
    #[inline]
    pub fn current_token_number(&self) -> Option<u32> {
        self.current_token.map(|c| c.token_number)
    }

    /// Queue position used for estimates: the current token, else the last
    /// one called.
    #[must_use]
    pub fn progress_marker(&self) -> Option<u32> {
        self.current_token_number().or(self.last_called_number)
    }
}

/// Pointer from a session to its current token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentToken {
    /// Token id.
    pub token_id: TokenId,
    /// Token number.
    pub token_number: u32,
}

/// One patient's place in a session's line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueToken {
    /// Token identifier.
    pub id: TokenId,
    /// Owning session.
    pub session_id: SessionId,
    /// Chamber of the owning session.
    pub chamber_id: ChamberId,
    /// Date of the owning session.
    pub date: NaiveDate,
    /// Patient identity as captured at booking.
    pub patient: PatientDetails,
    /// Patient record id once the directory has upserted it.
    pub patient_id: Option<PatientId>,
    /// Position in the session, assigned once.
    pub token_number: u32,
    /// Lifecycle status.
    pub status: TokenStatus,
    /// Booking channel.
    pub booked_by: BookedBy,
    /// Reason for the visit as typed by the patient or staff.
    pub visiting_reason: Option<String>,
    /// Internal staff note.
    pub note: Option<String>,
    /// Prescription/payment linkage.
    pub record_link: RecordLink,
    /// Admission time.
    pub created_at: NaiveDateTime,
    /// When the token became current.
    pub called_at: Option<NaiveDateTime>,
    /// When the token was completed.
    pub completed_at: Option<NaiveDateTime>,
    /// When the token was cancelled.
    pub cancelled_at: Option<NaiveDateTime>,
}

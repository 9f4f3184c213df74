//! Time sources and small helpers shared by the queue engine.

use chrono::{Local, NaiveDate, NaiveDateTime};
use crossbeam::atomic::AtomicCell;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Source of the clinic-local "now".
///
/// Every component that stamps or estimates times reads the clock through this
/// trait so tests can pin time with [`ManualClock`].
pub trait Clock: Send + Sync {
    /// The current clinic-local date and time.
    fn now(&self) -> NaiveDateTime;

    /// The current clinic-local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicCell<NaiveDateTime>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: AtomicCell::new(now),
        }
    }

    /// Moves the clock to an absolute instant.
    pub fn set(&self, now: NaiveDateTime) {
        self.now.store(now);
    }

    /// Moves the clock forward by `minutes`.
    pub fn advance_minutes(&self, minutes: i64) {
        let next = self.now.load() + chrono::Duration::minutes(minutes);
        self.now.store(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.load()
    }
}

/// Normalises a phone number for indexing and lookup.
///
/// Keeps digits and a single leading `+`; spaces, dashes, dots and
/// parentheses are dropped.
///
/// ```
/// use walkin_queue::normalize_phone;
///
/// assert_eq!(normalize_phone(" +91 (98) 765-43210 "), "+919876543210");
/// assert_eq!(normalize_phone("0171.234.5678"), "01712345678");
/// ```
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(trimmed.chars().filter(char::is_ascii_digit));
    normalized
}

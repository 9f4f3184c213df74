//! Export and restore of the `queue_sessions` and `queue_tokens` tables.

use super::error::QueueError;
use super::types::{QueueSession, QueueToken, SessionId, TokenStatus};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Both queue tables at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Timestamp when the snapshot was created (milliseconds since epoch)
    pub timestamp: u64,

    /// `queue_sessions`, ordered by date, start time and id
    pub sessions: Vec<QueueSession>,

    /// `queue_tokens`, ordered by session and token number
    pub tokens: Vec<QueueToken>,
}

impl QueueSnapshot {
    /// Builds a snapshot with rows in canonical order, so equal contents
    /// always serialize, and therefore hash, the same.
    pub fn new(
        timestamp: u64,
        mut sessions: Vec<QueueSession>,
        mut tokens: Vec<QueueToken>,
    ) -> Self {
        sessions.sort_by_key(|s| (s.date, s.start_time, s.id));
        tokens.sort_by_key(|t| (t.session_id, t.token_number));
        Self {
            timestamp,
            sessions,
            tokens,
        }
    }

    /// Number of waiting or current tokens across all sessions.
    pub fn active_tokens(&self) -> usize {
        self.tokens.iter().filter(|t| t.status.is_active()).count()
    }

    /// Checks the cross-row invariants a store would otherwise assume:
    /// token ids are unique, every token has its session, numbers are unique
    /// per session and within the session's high-water mark, and each
    /// session has at most one current token, the one its pointer names.
    pub fn check_integrity(&self) -> Result<(), QueueError> {
        let sessions: HashMap<SessionId, &QueueSession> =
            self.sessions.iter().map(|s| (s.id, s)).collect();
        if sessions.len() != self.sessions.len() {
            return Err(invalid("duplicate session id"));
        }

        let mut ids = HashSet::new();
        let mut numbers = HashSet::new();
        let mut current: HashMap<SessionId, &QueueToken> = HashMap::new();
        for token in &self.tokens {
            let session = sessions.get(&token.session_id).ok_or_else(|| {
                invalid(format!("token {} references a missing session", token.id))
            })?;
            if !ids.insert(token.id) {
                return Err(invalid(format!("token id {} appears twice", token.id)));
            }
            if token.token_number == 0 || token.token_number > session.last_token_number {
                return Err(invalid(format!(
                    "token {} has number {} outside 1..={}",
                    token.id, token.token_number, session.last_token_number
                )));
            }
            if !numbers.insert((token.session_id, token.token_number)) {
                return Err(invalid(format!(
                    "number {} appears twice in session {}",
                    token.token_number, token.session_id
                )));
            }
            if token.status == TokenStatus::Current
                && current.insert(token.session_id, token).is_some()
            {
                return Err(invalid(format!(
                    "session {} has more than one current token",
                    token.session_id
                )));
            }
        }

        for session in &self.sessions {
            let pointer = session.current_token.map(|c| c.token_id);
            let actual = current.get(&session.id).map(|t| t.id);
            if pointer != actual {
                return Err(invalid(format!(
                    "session {} current pointer does not match its tokens",
                    session.id
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> QueueError {
    QueueError::InvalidOperation {
        message: message.into(),
    }
}

/// Format version used for checksum-enabled queue snapshots.
pub const QUEUE_SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Wrapper that provides checksum validation for [`QueueSnapshot`] instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshotPackage {
    /// Version of the snapshot schema for forward compatibility.
    pub version: u32,
    /// Snapshot payload.
    pub snapshot: QueueSnapshot,
    /// Hex-encoded SHA-256 of the serialized snapshot.
    pub checksum: String,
}

impl QueueSnapshotPackage {
    /// Creates a package, computing the checksum of the snapshot contents.
    pub fn new(snapshot: QueueSnapshot) -> Result<Self, QueueError> {
        let checksum = Self::compute_checksum(&snapshot)?;
        trace!(
            "snapshot package: {} sessions, {} tokens, checksum {}",
            snapshot.sessions.len(),
            snapshot.tokens.len(),
            checksum
        );
        Ok(Self {
            version: QUEUE_SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum,
        })
    }

    /// Serializes the package to JSON.
    pub fn to_json(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|error| QueueError::SerializationError {
            message: error.to_string(),
        })
    }

    /// Deserializes the package from JSON.
    pub fn from_json(data: &str) -> Result<Self, QueueError> {
        serde_json::from_str(data).map_err(|error| QueueError::DeserializationError {
            message: error.to_string(),
        })
    }

    /// Validates version, checksum and row integrity.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.version != QUEUE_SNAPSHOT_FORMAT_VERSION {
            return Err(QueueError::InvalidOperation {
                message: format!(
                    "Unsupported snapshot version: {} (expected {})",
                    self.version, QUEUE_SNAPSHOT_FORMAT_VERSION
                ),
            });
        }

        let computed = Self::compute_checksum(&self.snapshot)?;
        if computed != self.checksum {
            return Err(QueueError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual: computed,
            });
        }

        self.snapshot.check_integrity()
    }

    /// Consumes the package and returns the validated snapshot.
    pub fn into_snapshot(self) -> Result<QueueSnapshot, QueueError> {
        self.validate()?;
        Ok(self.snapshot)
    }

    fn compute_checksum(snapshot: &QueueSnapshot) -> Result<String, QueueError> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|error| QueueError::SerializationError {
                message: error.to_string(),
            })?;

        let mut hasher = Sha256::new();
        hasher.update(payload);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

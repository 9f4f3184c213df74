//! Per-session serialization points.
//!
//! Two independent async mutexes per session: the admission lock guards the
//! `(session, token_number)` space and capacity, the progression lock guards
//! the session's current-token pointer. Locks are scoped to a session, so
//! unrelated sessions never contend. Acquisition is bounded by a timeout and
//! fails with [`QueueError::Busy`] instead of blocking indefinitely.

use super::error::QueueError;
use super::types::SessionId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// Held while a session's serialized section runs.
pub type SessionGuard = OwnedMutexGuard<()>;

type LockTable = DashMap<SessionId, Arc<Mutex<()>>>;

/// Lock registry shared by the registry, sequencer and progression controller.
pub struct SessionLocks {
    admission: LockTable,
    progression: LockTable,
    admission_timeout: Duration,
    progression_timeout: Duration,
}

impl SessionLocks {
    /// Creates a lock registry with the given acquisition timeouts.
    pub fn new(admission_timeout: Duration, progression_timeout: Duration) -> Self {
        Self {
            admission: DashMap::new(),
            progression: DashMap::new(),
            admission_timeout,
            progression_timeout,
        }
    }

    /// Acquire the admission lock of `session_id`.
    ///
    /// # Errors
    /// [`QueueError::Busy`] if the lock is not free within the admission timeout.
    pub async fn admission(&self, session_id: SessionId) -> Result<SessionGuard, QueueError> {
        Self::acquire(&self.admission, session_id, self.admission_timeout, "admission").await
    }

    /// Acquire the progression lock of `session_id`.
    ///
    /// # Errors
    /// [`QueueError::Busy`] if the lock is not free within the progression timeout.
    pub async fn progression(&self, session_id: SessionId) -> Result<SessionGuard, QueueError> {
        Self::acquire(
            &self.progression,
            session_id,
            self.progression_timeout,
            "progression",
        )
        .await
    }

    /// Drop the locks of a deleted session.
    ///
    /// Holders of an existing guard keep it; later acquirers get a fresh mutex.
    pub fn forget(&self, session_id: SessionId) {
        self.admission.remove(&session_id);
        self.progression.remove(&session_id);
    }

    /// Number of sessions with an allocated admission lock.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.admission.len()
    }

    async fn acquire(
        table: &LockTable,
        session_id: SessionId,
        timeout: Duration,
        kind: &'static str,
    ) -> Result<SessionGuard, QueueError> {
        // Clone the Arc out so no map shard is held across the await.
        let lock = {
            let entry = table
                .entry(session_id)
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(
                    "{} lock for session {} not acquired within {:?}",
                    kind, session_id, timeout
                );
                Err(QueueError::Busy(session_id))
            }
        }
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(2))
    }
}

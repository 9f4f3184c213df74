/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Wiring of the queue components behind one handle.
//!
//! [`QueueEngine`] owns the store, the per-session locks and every component
//! built on them. Components are shared through `Arc`, so a handler can clone
//! out the one it needs.

use super::config::{ConfigError, QueueConfig};
use super::directory::{ChamberDirectory, PatientDirectory};
use super::error::QueueError;
use super::events::QueueEventListener;
use super::gateway::{BookingGateway, PublicStatusGateway};
use super::locks::SessionLocks;
use super::progression::QueueProgressionController;
use super::rate_limit::RateLimiter;
use super::registry::SessionRegistry;
use super::sequencer::TokenSequencer;
use super::snapshot::{QueueSnapshot, QueueSnapshotPackage};
use super::store::{MemoryStore, QueueStore};
use super::types::SessionId;
use crate::utils::{SharedClock, SystemClock, current_time_millis};
use std::sync::Arc;
use tracing::{info, warn};

/// The walk-in queue engine.
pub struct QueueEngine {
    config: QueueConfig,
    store: Arc<dyn QueueStore>,
    locks: Arc<SessionLocks>,
    registry: Arc<SessionRegistry>,
    sequencer: Arc<TokenSequencer>,
    controller: Arc<QueueProgressionController>,
    booking: BookingGateway,
    status: PublicStatusGateway,
}

impl QueueEngine {
    /// Starts a builder with default configuration, an in-memory store and
    /// the system clock.
    pub fn builder() -> QueueEngineBuilder {
        QueueEngineBuilder::default()
    }

    /// Session lifecycle operations.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Token admission.
    pub fn sequencer(&self) -> &Arc<TokenSequencer> {
        &self.sequencer
    }

    /// Operator queue actions.
    pub fn controller(&self) -> &Arc<QueueProgressionController> {
        &self.controller
    }

    /// Booking write path.
    pub fn booking(&self) -> &BookingGateway {
        &self.booking
    }

    /// Public status read path.
    pub fn status(&self) -> &PublicStatusGateway {
        &self.status
    }

    /// Active configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Both tables as they are now.
    ///
    /// Each session is read under its admission and progression locks, so
    /// its row and its tokens are captured between operations, never halfway
    /// through an admission or a call.
    ///
    /// # Errors
    /// [`QueueError::Busy`] if a session stays locked past the lock timeout.
    pub async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        let listed = self.store.all_sessions()?;
        let mut sessions = Vec::with_capacity(listed.len());
        let mut tokens = Vec::new();
        for session_id in listed.into_iter().map(|s| s.id) {
            let _admission = self.locks.admission(session_id).await?;
            let _progression = self.locks.progression(session_id).await?;
            let Some(session) = self.store.session(session_id)? else {
                // Deleted after the listing.
                self.locks.forget(session_id);
                continue;
            };
            tokens.extend(self.store.session_tokens(session_id)?);
            sessions.push(session);
        }
        Ok(QueueSnapshot::new(current_time_millis(), sessions, tokens))
    }

    /// A checksummed snapshot package.
    pub async fn snapshot_package(&self) -> Result<QueueSnapshotPackage, QueueError> {
        QueueSnapshotPackage::new(self.snapshot().await?)
    }

    /// The snapshot package serialized as JSON.
    pub async fn snapshot_to_json(&self) -> Result<String, QueueError> {
        self.snapshot_package().await?.to_json()
    }

    /// Load a validated package into this engine's store, which must be empty.
    ///
    /// Rows go through the store's normal inserts, so the
    /// `(session, token_number)` constraint is checked again. A failed
    /// restore removes the rows it had loaded and leaves the store empty.
    pub fn restore_from_package(&self, package: QueueSnapshotPackage) -> Result<(), QueueError> {
        let snapshot = package.into_snapshot()?;
        if !self.store.all_sessions()?.is_empty() {
            return Err(QueueError::InvalidOperation {
                message: "restore requires an empty store".to_string(),
            });
        }

        let (sessions, tokens) = (snapshot.sessions.len(), snapshot.tokens.len());
        let mut loaded = Vec::with_capacity(sessions);
        if let Err(error) = self.load_rows(snapshot, &mut loaded) {
            warn!("restore failed, unloading {} sessions: {}", loaded.len(), error);
            for session_id in loaded {
                if let Err(cleanup) = self.store.remove_session(session_id) {
                    warn!("could not unload session {}: {}", session_id, cleanup);
                }
            }
            return Err(error);
        }
        info!("restored {} sessions and {} tokens", sessions, tokens);
        Ok(())
    }

    fn load_rows(
        &self,
        snapshot: QueueSnapshot,
        loaded: &mut Vec<SessionId>,
    ) -> Result<(), QueueError> {
        for session in snapshot.sessions {
            let session_id = session.id;
            self.store.insert_session(session)?;
            loaded.push(session_id);
        }
        for token in snapshot.tokens {
            self.store.insert_token(token)?;
        }
        Ok(())
    }

    /// [`restore_from_package`](Self::restore_from_package) from JSON.
    pub fn restore_from_json(&self, data: &str) -> Result<(), QueueError> {
        self.restore_from_package(QueueSnapshotPackage::from_json(data)?)
    }
}

impl Default for QueueEngine {
    fn default() -> Self {
        QueueEngineBuilder::default().assemble()
    }
}

/// Builder for [`QueueEngine`].
pub struct QueueEngineBuilder {
    config: QueueConfig,
    store: Option<Arc<dyn QueueStore>>,
    clock: SharedClock,
    patients: Option<Arc<dyn PatientDirectory>>,
    chambers: Option<Arc<dyn ChamberDirectory>>,
    listener: Option<QueueEventListener>,
}

impl Default for QueueEngineBuilder {
    fn default() -> Self {
        Self {
            config: QueueConfig::default(),
            store: None,
            clock: Arc::new(SystemClock),
            patients: None,
            chambers: None,
            listener: None,
        }
    }
}

impl QueueEngineBuilder {
    /// Sets the configuration.
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses a specific store instead of a fresh [`MemoryStore`].
    pub fn with_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a specific clock.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the patient-record collaborator used after bookings.
    pub fn with_patient_directory(mut self, patients: Arc<dyn PatientDirectory>) -> Self {
        self.patients = Some(patients);
        self
    }

    /// Sets the chamber/doctor collaborator used by status lookups.
    pub fn with_chamber_directory(mut self, chambers: Arc<dyn ChamberDirectory>) -> Self {
        self.chambers = Some(chambers);
        self
    }

    /// Registers a change listener.
    pub fn with_event_listener(mut self, listener: QueueEventListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<QueueEngine, ConfigError> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> QueueEngine {
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn QueueStore>);
        let locks = Arc::new(SessionLocks::new(
            config.admission_timeout(),
            config.progression_timeout(),
        ));

        let registry = Arc::new(
            SessionRegistry::new(Arc::clone(&store), Arc::clone(&locks), Arc::clone(&self.clock))
                .with_listener(self.listener.clone())
                .with_default_avg_consultation_minutes(config.default_avg_consultation_minutes),
        );
        let sequencer = Arc::new(
            TokenSequencer::new(Arc::clone(&store), Arc::clone(&locks), Arc::clone(&self.clock))
                .with_listener(self.listener.clone()),
        );
        let controller = Arc::new(
            QueueProgressionController::new(
                Arc::clone(&store),
                Arc::clone(&locks),
                Arc::clone(&self.clock),
            )
            .with_listener(self.listener),
        );
        let booking = BookingGateway::new(
            Arc::clone(&registry),
            Arc::clone(&sequencer),
            Arc::clone(&controller),
            RateLimiter::new(config.booking_rate_limit),
            Arc::clone(&self.clock),
        )
        .with_patient_directory(self.patients);
        let status = PublicStatusGateway::new(
            Arc::clone(&store),
            RateLimiter::new(config.lookup_rate_limit),
            self.clock,
            config.lookup_timeout(),
        )
        .with_chamber_directory(self.chambers);

        QueueEngine {
            config,
            store,
            locks,
            registry,
            sequencer,
            controller,
            booking,
            status,
        }
    }
}

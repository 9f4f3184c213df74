//! Interfaces to the records the queue does not own: patients, chambers and
//! doctors. In-memory implementations back tests and demos.

use super::error::QueueError;
use super::types::{ChamberId, DoctorId, PatientDetails, PatientId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Patient-record collaborator.
pub trait PatientDirectory: Send + Sync {
    /// Create or update the patient keyed by `(chamber, phone)` and return its id.
    ///
    /// Must be idempotent: the same `(chamber, phone)` always yields the same id.
    fn upsert_patient(
        &self,
        chamber_id: ChamberId,
        patient: &PatientDetails,
    ) -> Result<PatientId, QueueError>;
}

/// Descriptive chamber fields shown on the status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChamberProfile {
    /// Chamber id.
    pub id: ChamberId,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: Option<String>,
    /// Front-desk phone.
    pub phone: Option<String>,
}

/// Descriptive doctor fields shown on the status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorProfile {
    /// Doctor id.
    pub id: DoctorId,
    /// Display name.
    pub name: String,
    /// Speciality line.
    pub specialization: Option<String>,
}

/// Source of chamber and doctor descriptions.
pub trait ChamberDirectory: Send + Sync {
    /// Look up a chamber.
    fn chamber(&self, id: ChamberId) -> Result<Option<ChamberProfile>, QueueError>;

    /// Look up a doctor.
    fn doctor(&self, id: DoctorId) -> Result<Option<DoctorProfile>, QueueError>;
}

/// [`PatientDirectory`] keeping the `(chamber, phone) -> id` map in memory.
#[derive(Debug, Default)]
pub struct InMemoryPatientDirectory {
    patients: DashMap<(ChamberId, String), (PatientId, PatientDetails)>,
}

impl InMemoryPatientDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest details stored for `(chamber, phone)`.
    pub fn get(&self, chamber_id: ChamberId, phone: &str) -> Option<(PatientId, PatientDetails)> {
        self.patients
            .get(&(chamber_id, phone.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Number of patient records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patients.len()
    }

    /// `true` if no patient has been upserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

impl PatientDirectory for InMemoryPatientDirectory {
    fn upsert_patient(
        &self,
        chamber_id: ChamberId,
        patient: &PatientDetails,
    ) -> Result<PatientId, QueueError> {
        let mut entry = self
            .patients
            .entry((chamber_id, patient.phone.clone()))
            .or_insert_with(|| (PatientId::new(), patient.clone()));
        entry.1 = patient.clone();
        trace!("patient {} upserted for chamber {}", entry.0, chamber_id);
        Ok(entry.0)
    }
}

/// [`ChamberDirectory`] over two in-memory maps.
#[derive(Debug, Default)]
pub struct InMemoryChamberDirectory {
    chambers: DashMap<ChamberId, ChamberProfile>,
    doctors: DashMap<DoctorId, DoctorProfile>,
}

impl InMemoryChamberDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a chamber.
    pub fn add_chamber(&self, profile: ChamberProfile) {
        self.chambers.insert(profile.id, profile);
    }

    /// Adds or replaces a doctor.
    pub fn add_doctor(&self, profile: DoctorProfile) {
        self.doctors.insert(profile.id, profile);
    }
}

impl ChamberDirectory for InMemoryChamberDirectory {
    fn chamber(&self, id: ChamberId) -> Result<Option<ChamberProfile>, QueueError> {
        Ok(self.chambers.get(&id).map(|entry| entry.value().clone()))
    }

    fn doctor(&self, id: DoctorId) -> Result<Option<DoctorProfile>, QueueError> {
        Ok(self.doctors.get(&id).map(|entry| entry.value().clone()))
    }
}

//! Mock patient directory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use lab_orders_core::patient::{DirectoryError, PatientDirectory};
use lab_orders_core::types::PatientId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// [`PatientDirectory`] backed by a map.
///
/// Unknown patients return [`DirectoryError::NotFound`]; [`Self::set_unavailable`] makes every
/// lookup fail.
#[derive(Clone, Debug, Default)]
pub struct MockPatientDirectory {
    names: Arc<Mutex<HashMap<PatientId, String>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockPatientDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a patient.
    #[must_use]
    pub fn with_patient(self, patient_id: PatientId, name: impl Into<String>) -> Self {
        self.add_patient(patient_id, name);
        self
    }

    /// Register a patient on a shared directory.
    pub fn add_patient(&self, patient_id: PatientId, name: impl Into<String>) {
        self.names.lock().unwrap().insert(patient_id, name.into());
    }

    /// Make every lookup fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

impl PatientDirectory for MockPatientDirectory {
    fn patient_name(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<String, DirectoryError>> + Send + '_>> {
        Box::pin(async move {
            let unavailable = *self
                .unavailable
                .lock()
                .map_err(|_| DirectoryError::Unavailable("mock lock poisoned".into()))?;
            if unavailable {
                return Err(DirectoryError::Unavailable("directory offline".into()));
            }
            self.names
                .lock()
                .map_err(|_| DirectoryError::Unavailable("mock lock poisoned".into()))?
                .get(&patient_id)
                .cloned()
                .ok_or(DirectoryError::NotFound(patient_id))
        })
    }
}

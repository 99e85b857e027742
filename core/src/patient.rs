//! Patient directory lookup used to enrich critical alerts.

use crate::types::PatientId;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by a patient directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No patient with this id.
    #[error("Patient not found: {0}")]
    NotFound(PatientId),

    /// The directory could not be reached or answered with an error.
    #[error("Patient directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with something that is not a patient record.
    #[error("Invalid patient record: {0}")]
    InvalidResponse(String),
}

/// Source of patient display names.
pub trait PatientDirectory: Send + Sync {
    /// Display name of `patient_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the patient is unknown or the lookup fails.
    fn patient_name(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<String, DirectoryError>> + Send + '_>>;
}

//! HTTP patient directory.

use lab_orders_core::patient::{DirectoryError, PatientDirectory};
use lab_orders_core::types::PatientId;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientRecord {
    display_name: String,
}

/// Reads display names from `GET {base_url}/patients/{id}`.
#[derive(Clone, Debug)]
pub struct HttpPatientDirectory {
    client: Client,
    base_url: String,
}

impl HttpPatientDirectory {
    /// Create a directory client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn lookup(&self, patient_id: PatientId) -> Result<String, DirectoryError> {
        let response = self
            .client
            .get(format!("{}/patients/{patient_id}", self.base_url))
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let record = response
                    .json::<PatientRecord>()
                    .await
                    .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
                let name = record.display_name.trim();
                if name.is_empty() {
                    return Err(DirectoryError::InvalidResponse(
                        "displayName is blank".to_string(),
                    ));
                }
                Ok(name.to_string())
            },
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound(patient_id)),
            status => Err(DirectoryError::Unavailable(format!(
                "directory answered {}",
                status.as_u16()
            ))),
        }
    }
}

impl PatientDirectory for HttpPatientDirectory {
    fn patient_name(
        &self,
        patient_id: PatientId,
    ) -> Pin<Box<dyn Future<Output = Result<String, DirectoryError>> + Send + '_>> {
        Box::pin(self.lookup(patient_id))
    }
}

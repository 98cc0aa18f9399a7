//! HTTP implementation of [`CheckInService`]

use super::wire::{
    BulkCheckInBody, BulkCheckInResponse, ManualVerifyBody, ScanBody, ValidationResponse,
};
use super::{BulkRequest, CheckInService, ScanRequest, align_bulk};
use crate::config::Config;
use crate::error::NetworkError;
use crate::types::{BulkCheckInResult, CheckInOutcome, ScanSource};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Validation API client over HTTP
#[derive(Clone, Debug)]
pub struct HttpCheckInService {
    client: Client,
    api_url: String,
}

impl HttpCheckInService {
    /// Create a client for `api_url` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Connect`] if the HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn from_config(config: &Config) -> Result<Self, NetworkError> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, NetworkError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.api_url);
        tracing::debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes).map_err(|e| NetworkError::Decode(e.to_string()))
    }
}

fn classify(error: reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout
    } else {
        NetworkError::Connect(error.to_string())
    }
}

impl CheckInService for HttpCheckInService {
    fn validate_scan(
        &self,
        request: ScanRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CheckInOutcome, NetworkError>> + Send + '_>> {
        Box::pin(async move {
            let code = request.attempt.code.as_str();
            let response: ValidationResponse = match request.attempt.source {
                ScanSource::Camera => {
                    let body = ScanBody {
                        qr_code: code,
                        staff_user_id: request.staff,
                        gate: &request.gate,
                    };
                    self.post("/tickets/scan", &body).await?
                },
                ScanSource::Manual | ScanSource::BulkItem => {
                    let body = ManualVerifyBody {
                        ticket_number: code,
                        staff_user_id: request.staff,
                        gate: &request.gate,
                        event_id: request.event,
                    };
                    self.post("/tickets/manual-verify", &body).await?
                },
            };
            Ok(response.into_outcome())
        })
    }

    fn validate_bulk(
        &self,
        request: BulkRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BulkCheckInResult, NetworkError>> + Send + '_>> {
        Box::pin(async move {
            let response: BulkCheckInResponse = {
                let body = BulkCheckInBody {
                    ticket_numbers: request.codes.iter().map(|c| c.as_str()).collect(),
                    staff_user_id: request.staff,
                    gate: &request.gate,
                    event_id: request.event,
                };
                self.post("/tickets/bulk-check-in", &body).await?
            };
            let outcomes = response
                .results
                .into_iter()
                .map(ValidationResponse::into_outcome)
                .collect();
            Ok(align_bulk(request.codes, outcomes))
        })
    }
}

//! Validation delegated to an external HTTP service (CSV, XML)

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Validator;
use crate::error::{PipelineError, PipelineResult};

/// Body POSTed to the validation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub data: String,
    pub schema: String,
}

/// Body returned by the validation service. A verdict without `validation`
/// is malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub validation: bool,
    #[serde(default)]
    pub info: String,
}

/// Error body of a rejected request; only `info` is read
#[derive(Debug, Default, Deserialize)]
struct RejectionInfo {
    #[serde(default)]
    info: String,
}

/// Validator that forwards `{data, schema}` to a remote endpoint.
///
/// Only a 200 response carries a verdict. A 400 is reported as an execution
/// error with the service's `info` text, as is any other status.
#[derive(Debug, Clone)]
pub struct DelegatedValidator {
    client: reqwest::Client,
    url: String,
}

impl DelegatedValidator {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Validator for DelegatedValidator {
    async fn validate(&self, message: &[u8], schema: &[u8]) -> PipelineResult<bool> {
        let request = ValidationRequest {
            data: String::from_utf8_lossy(message).into_owned(),
            schema: String::from_utf8_lossy(schema).into_owned(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::ValidationExecution(format!("validator {} unreachable: {e}", self.url)))?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body: ValidationResponse = response.json().await.map_err(|e| {
                    PipelineError::ValidationExecution(format!("malformed validator response: {e}"))
                })?;
                debug!(url = %self.url, validation = body.validation, "delegated validation");
                Ok(body.validation)
            }
            StatusCode::BAD_REQUEST => {
                let body: RejectionInfo = response.json().await.unwrap_or_default();
                Err(PipelineError::ValidationExecution(format!("bad request: {}", body.info)))
            }
            other => Err(PipelineError::ValidationExecution(format!(
                "validator returned status {other}"
            ))),
        }
    }
}

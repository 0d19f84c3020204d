//! Schema registry clients
//!
//! The router and the reconciler reach the registry through [`RegistryClient`].
//! [`HttpRegistryClient`] talks to a running `schema-registry` service;
//! [`LocalRegistry`] calls a store in the same process.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::evolution::{self, Evolution};
use crate::schema::{EvolutionRequest, InsertInfo, Report, Schema};
use crate::store::SchemaStore;
use crate::version::SchemaVersion;

/// Registry operations the pipeline depends on
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch one schema version.
    ///
    /// `Ok(None)` when the registry answers that the id or version does not
    /// exist; `Err` when the registry could not be asked or answered garbage.
    async fn schema_by_id_and_version(&self, id: &str, version: &str) -> PipelineResult<Option<Schema>>;

    /// Infer a schema from `request` and register it as the next version of `id`
    async fn evolve(&self, id: &str, request: &EvolutionRequest) -> PipelineResult<InsertInfo>;
}

/// Registry client over HTTP
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRegistryClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> PipelineResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PipelineError::Lookup(format!("invalid registry url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PipelineError::Lookup(format!("registry url {base_url} cannot be a base")));
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn schema_by_id_and_version(&self, id: &str, version: &str) -> PipelineResult<Option<Schema>> {
        let url = self.url(&["schema", id, "version", version]);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::OK {
            let schema: Schema = serde_json::from_slice(&body)
                .map_err(|e| PipelineError::Lookup(format!("malformed schema response: {e}")))?;
            return Ok(Some(schema));
        }

        let report: Report = serde_json::from_slice(&body)
            .map_err(|e| PipelineError::Lookup(format!("registry returned {status}: {e}")))?;
        debug!(schema_id = %id, %version, %status, reason = %report.message, "schema not retrievable");
        Ok(None)
    }

    async fn evolve(&self, id: &str, request: &EvolutionRequest) -> PipelineResult<InsertInfo> {
        let url = self.url(&["schema", id, "evolution"]);
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(PipelineError::Inference(format!(
                "registry returned {status} while inferring schema"
            )));
        }

        let info: InsertInfo = response.json().await?;
        if !info.is_registered() {
            warn!(schema_id = %id, reason = %info.message, "registry did not register an inferred schema");
            return Err(PipelineError::Inference(format!(
                "no version registered: id = {:?}, version = {}",
                info.identification, info.version
            )));
        }
        Ok(info)
    }
}

/// Registry client backed directly by a store
#[derive(Clone)]
pub struct LocalRegistry {
    store: Arc<dyn SchemaStore>,
}

impl LocalRegistry {
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RegistryClient for LocalRegistry {
    async fn schema_by_id_and_version(&self, id: &str, version: &str) -> PipelineResult<Option<Schema>> {
        let Some(number) = SchemaVersion::parse_number(version) else {
            return Ok(None);
        };
        self.store
            .get_by_id_and_version(id, number)
            .map_err(|e| PipelineError::Lookup(e.to_string()))
    }

    async fn evolve(&self, id: &str, request: &EvolutionRequest) -> PipelineResult<InsertInfo> {
        match evolution::evolve(self.store.as_ref(), id, request)? {
            Evolution::Registered(info) => Ok(info),
            Evolution::NotGenerated => Err(PipelineError::Inference(format!(
                "schema could not be generated for format {}",
                request.format
            ))),
        }
    }
}

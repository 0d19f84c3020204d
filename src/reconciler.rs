//! Batch Reconciler (puller-cleaner)
//!
//! Recovers messages that failed validation because their schema drifted.
//! A pass takes the first pending message as the seed, asks the registry to
//! infer and register a schema from it, then checks every pending message
//! against that schema. Messages that now validate are stamped with the new
//! version and sent to the valid topic; the rest wait for the next pass.
//!
//! Each pass removes at least its seed, so a batch of `n` messages needs at
//! most `n` passes, and every message is forwarded exactly once.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, error, info, warn};

use crate::client::RegistryClient;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::format::Format;
use crate::puller::BatchAcquirer;
use crate::router::{Route, Topics};
use crate::schema::EvolutionRequest;
use crate::transport::{Message, Publisher, Subscription};
use crate::validator::ValidatorSet;

/// Counts from one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Removed by the pre-filter
    pub filtered: usize,
    /// Sent to the valid topic under a new version
    pub recovered: usize,
    /// Seeds that could not be recovered
    pub dead_lettered: usize,
    pub passes: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.filtered + self.recovered + self.dead_lettered
    }
}

/// Schema version registered from a seed
struct Resolved {
    schema_id: String,
    version: u32,
    specification: Vec<u8>,
}

/// Reconciles drifted messages of one format
pub struct Reconciler {
    format: Format,
    registry: Arc<dyn RegistryClient>,
    validators: Arc<ValidatorSet>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
}

impl Reconciler {
    pub fn new(
        format: Format,
        registry: Arc<dyn RegistryClient>,
        validators: Arc<ValidatorSet>,
        publisher: Arc<dyn Publisher>,
        topics: Topics,
    ) -> Self {
        Self {
            format,
            registry,
            validators,
            publisher,
            topics,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Forward every message in `batch` exactly once
    pub async fn reconcile(&self, batch: Vec<Message>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut pending = self.prefilter(batch, &mut report).await;

        while !pending.is_empty() {
            report.passes += 1;
            let before = pending.len();
            pending = self.pass(pending, &mut report).await;
            info!(
                format = %self.format,
                pass = report.passes,
                cleaned = before - pending.len(),
                remaining = pending.len(),
                "reconciliation pass finished"
            );
        }

        info!(
            format = %self.format,
            filtered = report.filtered,
            recovered = report.recovered,
            dead_lettered = report.dead_lettered,
            passes = report.passes,
            "batch reconciled"
        );
        report
    }

    /// Drop messages this reconciler cannot handle, keeping order.
    ///
    /// A message without `schemaId` or of another format goes to the invalid
    /// topic of its own format when it has one and carries a `schemaId`, and
    /// to dead-letter otherwise.
    async fn prefilter(&self, batch: Vec<Message>, report: &mut ReconcileReport) -> Vec<Message> {
        let mut kept = Vec::with_capacity(batch.len());
        for message in batch {
            let format = message.format().and_then(|f| f.parse::<Format>().ok());
            if message.schema_id().is_some() && format == Some(self.format) {
                kept.push(message);
                continue;
            }

            let topic = match format {
                Some(format) if format.has_invalid_topic() && message.schema_id().is_some() => {
                    self.topics.topic(Route::Invalid(format))
                }
                _ => self.topics.topic(Route::DeadLetter),
            };
            debug!(message_id = %message.id, %topic, "filtered out of reconciliation");
            self.forward(topic, &message).await;
            report.filtered += 1;
        }
        kept
    }

    async fn pass(&self, mut pending: Vec<Message>, report: &mut ReconcileReport) -> Vec<Message> {
        let seed = pending.remove(0);

        let resolved = match self.resolve(&seed).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(message_id = %seed.id, error = %e, "no schema from seed, dead-lettering it");
                self.dead_letter(&seed, report).await;
                return pending;
            }
        };

        // The seed is checked first; if it contradicts the schema inferred
        // from it, nothing else is touched in this pass.
        if !self.is_valid(&seed, &resolved).await {
            warn!(message_id = %seed.id, schema_id = %resolved.schema_id, "seed fails its own schema");
            self.dead_letter(&seed, report).await;
            return pending;
        }
        self.recover(seed, &resolved, report).await;

        let mut carried = Vec::with_capacity(pending.len());
        for message in pending {
            if self.is_valid(&message, &resolved).await {
                self.recover(message, &resolved, report).await;
            } else {
                carried.push(message);
            }
        }
        carried
    }

    /// Evolve from the seed and fetch the registered specification
    async fn resolve(&self, seed: &Message) -> PipelineResult<Resolved> {
        let schema_id = seed
            .schema_id()
            .ok_or_else(|| PipelineError::Metadata("schemaId".to_string()))?;

        let request = EvolutionRequest {
            data: String::from_utf8_lossy(&seed.data).into_owned(),
            format: self.format.to_string(),
        };
        let info = self.registry.evolve(schema_id, &request).await?;
        let version = info.version.to_string();

        let schema = self
            .registry
            .schema_by_id_and_version(&info.identification, &version)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                id: info.identification.clone(),
                version: version.clone(),
            })?;

        let encoded = schema
            .versions
            .first()
            .ok_or_else(|| PipelineError::Decode("registry returned no specification".to_string()))?;
        let specification = BASE64.decode(&encoded.specification)?;

        debug!(schema_id = %info.identification, version = info.version, "resolved evolved schema");
        Ok(Resolved {
            schema_id: info.identification,
            version: info.version,
            specification,
        })
    }

    async fn is_valid(&self, message: &Message, resolved: &Resolved) -> bool {
        self.validators
            .check(self.format, &message.data, &resolved.specification)
            .await
            .is_valid()
    }

    async fn recover(&self, mut message: Message, resolved: &Resolved, report: &mut ReconcileReport) {
        message.stamp(&resolved.schema_id, resolved.version);
        self.forward(&self.topics.valid, &message).await;
        report.recovered += 1;
    }

    async fn dead_letter(&self, message: &Message, report: &mut ReconcileReport) {
        self.forward(&self.topics.dead_letter, message).await;
        report.dead_lettered += 1;
    }

    async fn forward(&self, topic: &str, message: &Message) {
        if let Err(e) = self.publisher.publish(topic, message).await {
            let e = PipelineError::Transmission {
                topic: topic.to_string(),
                reason: e.to_string(),
            };
            error!(message_id = %message.id, error = %e, "forwarding failed, message dropped");
        }
    }
}

/// One scheduled recovery run: pull a batch and reconcile it
pub struct RecoveryJob {
    acquirer: BatchAcquirer,
    reconciler: Reconciler,
}

impl RecoveryJob {
    pub fn new(acquirer: BatchAcquirer, reconciler: Reconciler) -> Self {
        Self { acquirer, reconciler }
    }

    /// Build the job for `format` from its `[puller.*]` section.
    ///
    /// `subscribe` opens the subscription named in that section. Formats
    /// without a puller are rejected.
    pub fn from_config<F>(
        config: &PipelineConfig,
        format: Format,
        subscribe: F,
        registry: Arc<dyn RegistryClient>,
        validators: Arc<ValidatorSet>,
        publisher: Arc<dyn Publisher>,
    ) -> PipelineResult<Self>
    where
        F: FnOnce(&str) -> Arc<dyn Subscription>,
    {
        let puller = config
            .puller
            .for_format(format)
            .ok_or_else(|| PipelineError::UnknownFormat(format!("{format} has no recovery puller")))?;
        debug!(%format, subscription = %puller.subscription, "building recovery job");

        let acquirer = BatchAcquirer::new(subscribe(&puller.subscription), puller.limits());
        let reconciler = Reconciler::new(format, registry, validators, publisher, config.topics.clone());
        Ok(Self::new(acquirer, reconciler))
    }

    pub async fn run(&self) -> PipelineResult<ReconcileReport> {
        let batch = self.acquirer.pull().await?;
        info!(format = %self.reconciler.format(), size = batch.len(), "recovery batch pulled");
        if batch.is_empty() {
            return Ok(ReconcileReport::default());
        }
        Ok(self.reconciler.reconcile(batch).await)
    }
}

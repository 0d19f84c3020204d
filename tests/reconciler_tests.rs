//! Batch Reconciler Tests
//!
//! Covers the pre-filter, convergence of the pass loop, dead-lettering of
//! seeds that cannot be recovered, and the scheduled recovery job.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use janitor_schemas::transport::{FORMAT, SCHEMA_ID};
use janitor_schemas::validator::ValidatorSettings;
use janitor_schemas::{
    BatchAcquirer, BatchLimits, EvolutionRequest, Format, InsertInfo, LocalRegistry, MemoryBroker, MemoryStore,
    Message, NewSchema, PipelineConfig, PipelineError, PipelineResult, Publisher, ReconcileReport, Reconciler,
    RecoveryJob, RegistryClient, Schema, SchemaStore, Subscription, Topics, ValidatorSet,
};

fn offline_validators() -> Arc<ValidatorSet> {
    Arc::new(ValidatorSet::new(
        reqwest::Client::new(),
        ValidatorSettings {
            csv_url: "http://127.0.0.1:9/csv".to_string(),
            xml_url: "http://127.0.0.1:9/xml".to_string(),
            scratch_dir: None,
        },
    ))
}

fn drifted(data: &str, schema_id: &str) -> Message {
    Message::new(data)
        .with_attribute(SCHEMA_ID, schema_id)
        .with_attribute(FORMAT, "json")
}

fn json_reconciler(registry: Arc<dyn RegistryClient>, broker: &MemoryBroker) -> Reconciler {
    Reconciler::new(
        Format::Json,
        registry,
        offline_validators(),
        Arc::new(broker.clone()),
        Topics::default(),
    )
}

fn local_registry() -> (Arc<MemoryStore>, String) {
    let store = Arc::new(MemoryStore::new());
    let id = store
        .create(NewSchema {
            specification: BASE64.encode(r#"{"type": "object"}"#),
            schema_type: "json".to_string(),
            ..Default::default()
        })
        .unwrap()
        .identification;
    (store, id)
}

fn forwarded(broker: &MemoryBroker) -> usize {
    let topics = Topics::default();
    [topics.valid, topics.invalid_json, topics.invalid_csv, topics.dead_letter]
        .iter()
        .map(|t| broker.len(t))
        .sum()
}

// =============================================================================
// Pre-filter
// =============================================================================

#[tokio::test]
async fn test_prefilter_forwards_foreign_messages() {
    let (store, id) = local_registry();
    let broker = MemoryBroker::new();
    let reconciler = json_reconciler(Arc::new(LocalRegistry::new(store)), &broker);

    let batch = vec![
        Message::new(r#"{"a": 1}"#).with_attribute(FORMAT, "json"),
        Message::new("a,b").with_attribute(SCHEMA_ID, id.as_str()).with_attribute(FORMAT, "csv"),
        Message::new("a,b").with_attribute(FORMAT, "csv"),
        Message::new("<a/>").with_attribute(SCHEMA_ID, id.as_str()).with_attribute(FORMAT, "xml"),
        Message::new("?").with_attribute(SCHEMA_ID, id.as_str()),
    ];

    let report = reconciler.reconcile(batch).await;
    assert_eq!(report.filtered, 5);
    assert_eq!(report.passes, 0);
    assert_eq!(broker.len("invalid-topic-csv"), 1);
    assert_eq!(broker.len("dead-letter-topic"), 4);
}

// =============================================================================
// Pass loop
// =============================================================================

#[tokio::test]
async fn test_batch_converges_one_shape_per_pass() {
    let (store, id) = local_registry();
    let broker = MemoryBroker::new();
    let reconciler = json_reconciler(Arc::new(LocalRegistry::new(store.clone())), &broker);

    let batch = vec![
        drifted(r#"{"sku": 1}"#, &id),
        drifted(r#"{"name": "widget"}"#, &id),
        drifted(r#"{"sku": 2}"#, &id),
        drifted(r#"{"name": "gadget"}"#, &id),
        drifted(r#"{"flag": true}"#, &id),
    ];

    let report = reconciler.reconcile(batch).await;
    assert_eq!(
        report,
        ReconcileReport {
            filtered: 0,
            recovered: 5,
            dead_lettered: 0,
            passes: 3,
        }
    );

    let valid = broker.messages("valid-topic");
    let versions: Vec<&str> = valid.iter().map(|m| m.version_id().unwrap()).collect();
    assert_eq!(versions, vec!["2", "2", "3", "3", "4"]);
    assert!(valid.iter().all(|m| m.schema_id() == Some(id.as_str())));

    // One autogenerated version per pass
    assert_eq!(store.list_versions(&id).unwrap().len(), 4);
    assert!(store.get_by_id_and_version(&id, 4).unwrap().unwrap().autogenerated);
}

#[tokio::test]
async fn test_uninferable_seed_is_dead_lettered() {
    let (store, id) = local_registry();
    let broker = MemoryBroker::new();
    let reconciler = json_reconciler(Arc::new(LocalRegistry::new(store)), &broker);

    let batch = vec![
        drifted("not json at all", &id),
        drifted(r#"{"sku": 1}"#, &id),
        drifted(r#"{"sku": 2}"#, &id),
    ];

    let report = reconciler.reconcile(batch).await;
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.recovered, 2);
    assert_eq!(report.passes, 2);
    assert_eq!(broker.messages("dead-letter-topic")[0].data, b"not json at all");
}

#[tokio::test]
async fn test_unknown_schema_id_dead_letters_every_seed() {
    let (store, _) = local_registry();
    let broker = MemoryBroker::new();
    let reconciler = json_reconciler(Arc::new(LocalRegistry::new(store)), &broker);

    let batch: Vec<Message> = (0..4).map(|i| drifted(&format!(r#"{{"n": {i}}}"#), "unregistered")).collect();
    let report = reconciler.reconcile(batch).await;

    assert_eq!(report.dead_lettered, 4);
    assert_eq!(report.passes, 4);
    assert_eq!(broker.len("dead-letter-topic"), 4);
}

#[tokio::test]
async fn test_terminates_and_forwards_each_message_once() {
    let (store, id) = local_registry();
    let broker = MemoryBroker::new();
    let reconciler = json_reconciler(Arc::new(LocalRegistry::new(store)), &broker);

    let batch = vec![
        drifted(r#"{"a": 1}"#, &id),
        drifted("garbage", &id),
        Message::new("{}").with_attribute(FORMAT, "json"),
        drifted(r#"{"b": [1, 2.5]}"#, &id),
        drifted(r#"{"a": 3}"#, "unknown-id"),
        drifted(r#"[1, 2]"#, &id),
        drifted(r#"{"a": 2}"#, &id),
    ];
    let size = batch.len();

    let report = reconciler.reconcile(batch).await;
    assert!(report.passes <= size);
    assert_eq!(report.total(), size);
    assert_eq!(forwarded(&broker), size);
}

#[tokio::test]
async fn test_csv_batch_recovers_through_delegate() {
    let (store, id) = local_registry();
    let broker = MemoryBroker::new();
    let reconciler = Reconciler::new(
        Format::Csv,
        Arc::new(LocalRegistry::new(store.clone())),
        common::stub_validators().await,
        Arc::new(broker.clone()),
        Topics::default(),
    );

    let csv = |data: &str| {
        Message::new(data)
            .with_attribute(SCHEMA_ID, id.as_str())
            .with_attribute(FORMAT, "csv")
    };
    let batch = vec![
        csv("\"last, first\",age\n\"Doe, Jane\",30\n"),
        csv("sku,qty,price\n1,2,3\n"),
        csv("id,name\n7,widget\n"),
    ];

    let report = reconciler.reconcile(batch).await;
    assert_eq!(report.recovered, 3);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(report.passes, 2);

    let valid = broker.messages("valid-topic");
    let versions: Vec<&str> = valid.iter().map(|m| m.version_id().unwrap()).collect();
    assert_eq!(versions, vec!["2", "2", "3"]);
    assert!(valid.iter().all(|m| m.schema_id() == Some(id.as_str())));

    let inferred = store.get_by_id_and_version(&id, 2).unwrap().unwrap();
    let text = String::from_utf8(BASE64.decode(&inferred.versions[0].specification).unwrap()).unwrap();
    assert!(text.contains("@totalColumns 2"));
    assert!(text.contains("last, first: "));
}

// =============================================================================
// Self-contradicting seed
// =============================================================================

/// Registry that always hands back a schema requiring field `z`, with a new
/// version number on every evolution
struct FixedSchemaRegistry {
    next_version: AtomicU32,
}

#[async_trait]
impl RegistryClient for FixedSchemaRegistry {
    async fn schema_by_id_and_version(&self, id: &str, _version: &str) -> PipelineResult<Option<Schema>> {
        Ok(Some(Schema::new(
            id,
            NewSchema {
                specification: BASE64.encode(r#"{"type": "object", "required": ["z"]}"#),
                ..Default::default()
            },
        )))
    }

    async fn evolve(&self, id: &str, _request: &EvolutionRequest) -> PipelineResult<InsertInfo> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        Ok(InsertInfo::new(id, version, "Schema successfully updated."))
    }
}

#[tokio::test]
async fn test_self_contradicting_seed_aborts_its_pass() {
    let broker = MemoryBroker::new();
    let registry = Arc::new(FixedSchemaRegistry {
        next_version: AtomicU32::new(2),
    });
    let reconciler = json_reconciler(registry, &broker);

    let batch = vec![
        drifted(r#"{"a": 1}"#, "s1"),
        drifted(r#"{"z": 1}"#, "s1"),
        drifted(r#"{"z": 2}"#, "s1"),
    ];
    let report = reconciler.reconcile(batch).await;

    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.recovered, 2);
    assert_eq!(report.passes, 2);
    assert_eq!(broker.messages("dead-letter-topic")[0].data, br#"{"a": 1}"#);

    // Both survivors were recovered in the second pass, not the first
    let valid = broker.messages("valid-topic");
    assert!(valid.iter().all(|m| m.version_id() == Some("3")));
}

// =============================================================================
// Recovery job
// =============================================================================

#[tokio::test]
async fn test_recovery_job_pulls_and_reconciles() {
    let (store, id) = local_registry();
    let broker = MemoryBroker::new();
    for i in 0..6 {
        broker
            .publish("invalid-topic-json", &drifted(&format!(r#"{{"sku": {i}}}"#), &id))
            .await
            .unwrap();
    }

    let acquirer = BatchAcquirer::new(
        Arc::new(broker.subscription("invalid-topic-json")),
        BatchLimits {
            max_duration: Duration::from_secs(5),
            max_batch_size: 4,
            max_throughput: 1 << 20,
        },
    );
    let job = RecoveryJob::new(acquirer, json_reconciler(Arc::new(LocalRegistry::new(store)), &broker));

    let report = job.run().await.unwrap();
    assert_eq!(report.recovered, 4);
    assert_eq!(report.passes, 1);
    assert_eq!(broker.len("valid-topic"), 4);
    assert_eq!(broker.len("invalid-topic-json"), 2);
}

#[tokio::test]
async fn test_recovery_job_with_nothing_to_pull() {
    let (store, _) = local_registry();
    let broker = MemoryBroker::new();
    let acquirer = BatchAcquirer::new(
        Arc::new(broker.subscription("invalid-topic-json")),
        BatchLimits {
            max_duration: Duration::from_millis(30),
            max_batch_size: 10,
            max_throughput: 1 << 20,
        },
    );
    let job = RecoveryJob::new(acquirer, json_reconciler(Arc::new(LocalRegistry::new(store)), &broker));

    assert_eq!(job.run().await.unwrap(), ReconcileReport::default());
}

#[tokio::test]
async fn test_recovery_job_from_config() {
    let (store, id) = local_registry();
    let broker = MemoryBroker::new();
    for i in 0..3 {
        broker
            .publish("invalid-topic-json", &drifted(&format!(r#"{{"sku": {i}}}"#), &id))
            .await
            .unwrap();
    }

    let mut config = PipelineConfig::default();
    config.puller.json.subscription = "invalid-topic-json".to_string();
    config.puller.json.max_batch_size = 2;
    config.topics.valid = "clean".to_string();

    let subscriber = broker.clone();
    let job = RecoveryJob::from_config(
        &config,
        Format::Json,
        move |name| Arc::new(subscriber.subscription(name)) as Arc<dyn Subscription>,
        Arc::new(LocalRegistry::new(store)),
        offline_validators(),
        Arc::new(broker.clone()),
    )
    .unwrap();

    let report = job.run().await.unwrap();
    assert_eq!(report.recovered, 2);
    assert_eq!(broker.len("clean"), 2);
    assert_eq!(broker.len("invalid-topic-json"), 1);
}

#[tokio::test]
async fn test_recovery_job_needs_a_puller() {
    let (store, _) = local_registry();
    let broker = MemoryBroker::new();
    let subscriber = broker.clone();
    let result = RecoveryJob::from_config(
        &PipelineConfig::default(),
        Format::Xml,
        move |name| Arc::new(subscriber.subscription(name)) as Arc<dyn Subscription>,
        Arc::new(LocalRegistry::new(store)),
        offline_validators(),
        Arc::new(broker),
    );
    assert!(matches!(result, Err(PipelineError::UnknownFormat(_))));
}

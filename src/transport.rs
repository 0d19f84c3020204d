//! Message transport boundary
//!
//! The pipeline only needs to publish a message to a named topic and to
//! receive from a subscription until told to stop. [`MemoryBroker`] implements
//! both in process and backs the tests and the local binaries.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::PipelineResult;

/// Attribute naming the schema a message was produced against
pub const SCHEMA_ID: &str = "schemaId";
/// Attribute naming the schema version
pub const VERSION_ID: &str = "versionId";
/// Attribute naming the payload format
pub const FORMAT: &str = "format";

/// A transport message: payload bytes plus string attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

impl Message {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            data: data.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute value, treating an empty string as absent
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn schema_id(&self) -> Option<&str> {
        self.attribute(SCHEMA_ID)
    }

    pub fn version_id(&self) -> Option<&str> {
        self.attribute(VERSION_ID)
    }

    pub fn format(&self) -> Option<&str> {
        self.attribute(FORMAT)
    }

    /// Record the schema version the message was found valid against
    pub fn stamp(&mut self, schema_id: &str, version: u32) {
        self.attributes.insert(SCHEMA_ID.to_string(), schema_id.to_string());
        self.attributes.insert(VERSION_ID.to_string(), version.to_string());
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sends messages to named topics
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: &Message) -> PipelineResult<()>;
}

/// What a receive handler wants done with a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the subscription
    Ack,
    /// Leave the message in the subscription for a later receive
    Nack,
}

/// Callback invoked once per delivered message
pub type ReceiveHandler = Arc<dyn Fn(Message) -> Disposition + Send + Sync>;

/// A pull subscription
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Deliver messages to `handler` until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation; an error means the subscription
    /// itself failed.
    async fn receive(&self, cancel: CancellationToken, handler: ReceiveHandler) -> PipelineResult<()>;
}

#[derive(Default)]
struct BrokerState {
    topics: Mutex<HashMap<String, VecDeque<Message>>>,
    published: Notify,
}

/// In-process topics with one queue each
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull subscription draining `topic`
    pub fn subscription(&self, topic: impl Into<String>) -> MemorySubscription {
        MemorySubscription {
            broker: self.clone(),
            topic: topic.into(),
        }
    }

    /// Snapshot of the messages currently queued on `topic`
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.state
            .topics
            .lock()
            .get(topic)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of messages currently queued on `topic`
    pub fn len(&self, topic: &str) -> usize {
        self.state.topics.lock().get(topic).map_or(0, VecDeque::len)
    }

    fn push(&self, topic: &str, message: Message) {
        self.state
            .topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push_back(message);
        self.state.published.notify_waiters();
    }

    fn pop(&self, topic: &str) -> Option<Message> {
        self.state.topics.lock().get_mut(topic).and_then(VecDeque::pop_front)
    }

    fn requeue(&self, topic: &str, message: Message) {
        self.state
            .topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push_front(message);
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &str, message: &Message) -> PipelineResult<()> {
        trace!(%topic, message_id = %message.id, "publishing");
        self.push(topic, message.clone());
        Ok(())
    }
}

/// Subscription over one [`MemoryBroker`] topic
#[derive(Clone)]
pub struct MemorySubscription {
    broker: MemoryBroker,
    topic: String,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn receive(&self, cancel: CancellationToken, handler: ReceiveHandler) -> PipelineResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            // Register interest before looking at the queue so a publish in
            // between is not missed.
            let published = self.broker.state.published.notified();

            match self.broker.pop(&self.topic) {
                Some(message) => {
                    let id = message.id.clone();
                    if handler(message.clone()) == Disposition::Nack {
                        debug!(topic = %self.topic, message_id = %id, "delivery nacked");
                        self.broker.requeue(&self.topic, message);
                        tokio::task::yield_now().await;
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = published => {}
                    }
                }
            }
        }
    }
}

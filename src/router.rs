//! Message Router (central consumer)
//!
//! Every live message walks the same small state machine and ends in exactly
//! one destination topic:
//!
//! ```text
//! metadata check ──missing──────────────────────────────▶ dead letter
//!       │
//! schema lookup ───error────────────────────────────────▶ dead letter
//!       │ └────────not found──▶ invalid topic (json, csv) / dead letter
//!       │
//! validate ──unknown format─────────────────────────────▶ dead letter
//!       ├────undecodable schema / validator error───────▶ error topic
//!       ├────invalid────────────────────────────────────▶ invalid topic
//!       └────valid──────────────────────────────────────▶ valid topic
//! ```
//!
//! JSON and CSV have their own invalid topic, which doubles as their error
//! topic. Every other format uses the dead-letter topic for both.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::RegistryClient;
use crate::error::PipelineError;
use crate::format::Format;
use crate::transport::{Message, Publisher};
use crate::validator::{Outcome, ValidatorSet};

/// Destination topic names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    pub valid: String,
    pub invalid_json: String,
    pub invalid_csv: String,
    pub dead_letter: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            valid: "valid-topic".to_string(),
            invalid_json: "invalid-topic-json".to_string(),
            invalid_csv: "invalid-topic-csv".to_string(),
            dead_letter: "dead-letter-topic".to_string(),
        }
    }
}

impl Topics {
    /// Topic a route resolves to
    pub fn topic(&self, route: Route) -> &str {
        match route {
            Route::Valid => &self.valid,
            Route::Invalid(Format::Json) => &self.invalid_json,
            Route::Invalid(Format::Csv) => &self.invalid_csv,
            Route::Invalid(_) | Route::DeadLetter => &self.dead_letter,
        }
    }
}

/// Terminal state of a routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Valid,
    /// The format's invalid-format topic
    Invalid(Format),
    DeadLetter,
}

/// Route for a message that reached validation.
///
/// Invalid and failed checks share a destination: the format's own invalid
/// topic when it has one, otherwise dead-letter.
pub fn route_for(format: Format, outcome: &Outcome) -> Route {
    match outcome {
        Outcome::Valid => Route::Valid,
        Outcome::Invalid | Outcome::Error(_) if format.has_invalid_topic() => Route::Invalid(format),
        Outcome::Invalid | Outcome::Error(_) => Route::DeadLetter,
    }
}

/// Why a message ended where it did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    MissingMetadata,
    LookupFailed(String),
    SchemaNotFound,
    UnknownFormat(String),
    UndecodableSchema(String),
    Validated(Outcome),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::MissingMetadata => f.write_str("missing metadata"),
            Cause::LookupFailed(reason) => write!(f, "lookup failed: {reason}"),
            Cause::SchemaNotFound => f.write_str("schema not found"),
            Cause::UnknownFormat(format) => write!(f, "unknown format {format}"),
            Cause::UndecodableSchema(reason) => write!(f, "undecodable schema: {reason}"),
            Cause::Validated(outcome) => write!(f, "{outcome}"),
        }
    }
}

/// Where a message was sent and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    pub topic: String,
    pub cause: Cause,
}

/// Validates live messages and forwards each to its destination
pub struct CentralConsumer {
    registry: Arc<dyn RegistryClient>,
    validators: Arc<ValidatorSet>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
}

impl CentralConsumer {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        validators: Arc<ValidatorSet>,
        publisher: Arc<dyn Publisher>,
        topics: Topics,
    ) -> Self {
        Self {
            registry,
            validators,
            publisher,
            topics,
        }
    }

    /// Route one message and forward it.
    ///
    /// A failed transmission is logged and not retried; the returned decision
    /// still names the intended destination.
    pub async fn handle(&self, message: Message) -> RouteDecision {
        let (route, cause) = self.decide(&message).await;
        let decision = RouteDecision {
            route,
            topic: self.topics.topic(route).to_string(),
            cause,
        };

        match self.publisher.publish(&decision.topic, &message).await {
            Ok(()) => info!(
                message_id = %message.id,
                topic = %decision.topic,
                cause = %decision.cause,
                "message routed"
            ),
            Err(e) => {
                let e = PipelineError::Transmission {
                    topic: decision.topic.clone(),
                    reason: e.to_string(),
                };
                error!(message_id = %message.id, error = %e, "message could not be forwarded");
            }
        }
        decision
    }

    async fn decide(&self, message: &Message) -> (Route, Cause) {
        let (Some(schema_id), Some(version_id), Some(format_name)) =
            (message.schema_id(), message.version_id(), message.format())
        else {
            warn!(message_id = %message.id, "message is missing routing attributes");
            return (Route::DeadLetter, Cause::MissingMetadata);
        };

        let schema = match self.registry.schema_by_id_and_version(schema_id, version_id).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                debug!(message_id = %message.id, %schema_id, version = %version_id, "schema not registered");
                let route = match format_name.parse::<Format>() {
                    Ok(format) if format.has_invalid_topic() => Route::Invalid(format),
                    _ => Route::DeadLetter,
                };
                return (route, Cause::SchemaNotFound);
            }
            Err(e) => {
                error!(message_id = %message.id, %schema_id, error = %e, "schema lookup failed");
                return (Route::DeadLetter, Cause::LookupFailed(e.to_string()));
            }
        };

        let format = match format_name.parse::<Format>() {
            Ok(format) => format,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "no validator for format");
                return (Route::DeadLetter, Cause::UnknownFormat(format_name.to_string()));
            }
        };

        let specification = match schema.versions.first() {
            Some(version) => BASE64.decode(&version.specification).map_err(PipelineError::from),
            None => Err(PipelineError::Decode("registry returned no specification".to_string())),
        };
        let specification = match specification {
            Ok(specification) => specification,
            Err(e) => {
                warn!(message_id = %message.id, %schema_id, error = %e, "schema specification undecodable");
                return (
                    route_for(format, &Outcome::Error(e.to_string())),
                    Cause::UndecodableSchema(e.to_string()),
                );
            }
        };

        let outcome = self.validators.check(format, &message.data, &specification).await;
        if let Outcome::Error(reason) = &outcome {
            warn!(message_id = %message.id, %format, %reason, "validation could not be completed");
        }
        (route_for(format, &outcome), Cause::Validated(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_table() {
        let error = Outcome::Error("boom".to_string());
        for format in Format::ALL {
            assert_eq!(route_for(format, &Outcome::Valid), Route::Valid);
        }
        assert_eq!(route_for(Format::Json, &Outcome::Invalid), Route::Invalid(Format::Json));
        assert_eq!(route_for(Format::Json, &error), Route::Invalid(Format::Json));
        assert_eq!(route_for(Format::Csv, &Outcome::Invalid), Route::Invalid(Format::Csv));
        assert_eq!(route_for(Format::Csv, &error), Route::Invalid(Format::Csv));
        for format in [Format::Xml, Format::Avro, Format::Protobuf] {
            assert_eq!(route_for(format, &Outcome::Invalid), Route::DeadLetter);
            assert_eq!(route_for(format, &error), Route::DeadLetter);
        }
    }

    #[test]
    fn test_topic_names() {
        let topics = Topics::default();
        assert_eq!(topics.topic(Route::Valid), "valid-topic");
        assert_eq!(topics.topic(Route::Invalid(Format::Json)), "invalid-topic-json");
        assert_eq!(topics.topic(Route::Invalid(Format::Csv)), "invalid-topic-csv");
        assert_eq!(topics.topic(Route::Invalid(Format::Avro)), "dead-letter-topic");
        assert_eq!(topics.topic(Route::DeadLetter), "dead-letter-topic");
    }
}

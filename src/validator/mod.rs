//! Format Validator Set
//!
//! One [`Validator`] per payload format. JSON, Avro and Protobuf are checked
//! in-process; CSV and XML are delegated to an HTTP validation service.
//! Dispatch is a closed `match` on [`Format`], so an unknown format can never
//! reach a validator: it is rejected when the attribute is parsed.

mod avro;
mod delegated;
mod json;
mod protobuf;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::format::Format;

pub use avro::AvroValidator;
pub use delegated::{DelegatedValidator, ValidationRequest, ValidationResponse};
pub use json::JsonValidator;
pub use protobuf::ProtobufValidator;

/// Structural check of one payload against one schema specification.
///
/// `Ok(true)` and `Ok(false)` are the authoritative verdicts; `Err` means the
/// check itself could not be carried out.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, message: &[u8], schema: &[u8]) -> PipelineResult<bool>;
}

/// Tri-state result of validating one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Valid,
    Invalid,
    Error(String),
}

impl Outcome {
    pub fn from_result(result: PipelineResult<bool>) -> Self {
        match result {
            Ok(true) => Outcome::Valid,
            Ok(false) => Outcome::Invalid,
            Err(e) => Outcome::Error(e.to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Valid => f.write_str("valid"),
            Outcome::Invalid => f.write_str("invalid"),
            Outcome::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Endpoints and scratch space the validators need
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub csv_url: String,
    pub xml_url: String,
    /// Parent directory for protobuf scratch files; system temp dir if unset
    pub scratch_dir: Option<PathBuf>,
}

/// The full set of validators, one per [`Format`]
pub struct ValidatorSet {
    json: JsonValidator,
    csv: DelegatedValidator,
    xml: DelegatedValidator,
    avro: AvroValidator,
    protobuf: ProtobufValidator,
}

impl ValidatorSet {
    /// Build the set around a shared HTTP client
    pub fn new(client: reqwest::Client, settings: ValidatorSettings) -> Self {
        Self {
            json: JsonValidator,
            csv: DelegatedValidator::new(client.clone(), settings.csv_url),
            xml: DelegatedValidator::new(client, settings.xml_url),
            avro: AvroValidator,
            protobuf: ProtobufValidator::new(settings.scratch_dir),
        }
    }

    /// Validator for a format
    pub fn get(&self, format: Format) -> &dyn Validator {
        match format {
            Format::Json => &self.json,
            Format::Csv => &self.csv,
            Format::Xml => &self.xml,
            Format::Avro => &self.avro,
            Format::Protobuf => &self.protobuf,
        }
    }

    /// Validate and fold the result into an [`Outcome`]
    pub async fn check(&self, format: Format, message: &[u8], schema: &[u8]) -> Outcome {
        Outcome::from_result(self.get(format).validate(message, schema).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn offline_set() -> ValidatorSet {
        ValidatorSet::new(
            reqwest::Client::new(),
            ValidatorSettings {
                csv_url: "http://127.0.0.1:9/csv".to_string(),
                xml_url: "http://127.0.0.1:9/xml".to_string(),
                scratch_dir: None,
            },
        )
    }

    #[test]
    fn test_outcome_from_result() {
        assert_eq!(Outcome::from_result(Ok(true)), Outcome::Valid);
        assert_eq!(Outcome::from_result(Ok(false)), Outcome::Invalid);
        assert!(matches!(
            Outcome::from_result(Err(PipelineError::Decode("bad".into()))),
            Outcome::Error(reason) if reason.contains("bad")
        ));
    }

    #[tokio::test]
    async fn test_dispatch_json() {
        let set = offline_set();
        let schema = br#"{"type": "object", "required": ["id"]}"#;
        assert_eq!(set.check(Format::Json, br#"{"id": 1}"#, schema).await, Outcome::Valid);
        assert_eq!(set.check(Format::Json, br#"{"x": 1}"#, schema).await, Outcome::Invalid);
    }

    #[tokio::test]
    async fn test_unreachable_delegate_is_error() {
        let set = offline_set();
        let outcome = set.check(Format::Csv, b"a,b\n", b"version 1.1").await;
        assert!(matches!(outcome, Outcome::Error(_)));
    }
}

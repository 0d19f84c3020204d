//! Protobuf validation against `.proto` source
//!
//! The schema text is written to a scratch directory, compiled into a
//! descriptor pool with `protox`, and the payload is decoded as the first
//! message type declared in the file. Decoded messages are then walked to make
//! sure every `required` field is present, including in nested messages.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use prost_reflect::{Cardinality, DynamicMessage, MessageDescriptor, ReflectMessage, Value};
use tempfile::TempDir;
use tracing::debug;

use super::Validator;
use crate::error::{PipelineError, PipelineResult};

const SCRATCH_FILE: &str = "schema.proto";

/// Validates Protobuf binary payloads
#[derive(Debug, Clone, Default)]
pub struct ProtobufValidator {
    scratch_dir: Option<PathBuf>,
}

impl ProtobufValidator {
    pub fn new(scratch_dir: Option<PathBuf>) -> Self {
        Self { scratch_dir }
    }

    fn scratch(&self) -> PipelineResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("janitor-proto-");
        let dir = match &self.scratch_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.map_err(|e| PipelineError::ValidationExecution(format!("cannot create scratch dir: {e}")))
    }

    /// Compile the schema and return its first message type.
    ///
    /// The scratch directory lives only for the duration of this call and is
    /// removed when it goes out of scope, whatever the result.
    fn descriptor(&self, schema: &[u8]) -> PipelineResult<MessageDescriptor> {
        let scratch = self.scratch()?;
        fs::write(scratch.path().join(SCRATCH_FILE), schema)
            .map_err(|e| PipelineError::ValidationExecution(format!("cannot write scratch file: {e}")))?;

        let mut compiler = protox::Compiler::new([scratch.path()])
            .map_err(|e| PipelineError::ValidationExecution(e.to_string()))?;
        compiler
            .open_file(SCRATCH_FILE)
            .map_err(|e| PipelineError::ValidationExecution(format!("invalid proto schema: {e}")))?;
        let pool = compiler.descriptor_pool();

        pool.get_file_by_name(SCRATCH_FILE)
            .and_then(|file| file.messages().next())
            .ok_or_else(|| PipelineError::ValidationExecution("proto schema declares no message type".to_string()))
    }

    pub fn validate_sync(&self, message: &[u8], schema: &[u8]) -> PipelineResult<bool> {
        let descriptor = self.descriptor(schema)?;

        let decoded = match DynamicMessage::decode(descriptor.clone(), message) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(message_type = descriptor.full_name(), error = %e, "protobuf payload does not decode");
                return Ok(false);
            }
        };

        if let Some(missing) = first_missing_required(&decoded) {
            debug!(message_type = descriptor.full_name(), field = %missing, "required field missing");
            return Ok(false);
        }
        Ok(true)
    }
}

#[async_trait]
impl Validator for ProtobufValidator {
    async fn validate(&self, message: &[u8], schema: &[u8]) -> PipelineResult<bool> {
        // Scratch files and descriptor compilation block
        let validator = self.clone();
        let (message, schema) = (message.to_vec(), schema.to_vec());
        tokio::task::spawn_blocking(move || validator.validate_sync(&message, &schema))
            .await
            .map_err(|e| PipelineError::ValidationExecution(format!("protobuf validation task failed: {e}")))?
    }
}

/// Full name of the first required field that is absent, searched depth first
fn first_missing_required(message: &DynamicMessage) -> Option<String> {
    for field in message.descriptor().fields() {
        if field.cardinality() == Cardinality::Required && !message.has_field(&field) {
            return Some(field.full_name().to_string());
        }
        if !message.has_field(&field) {
            continue;
        }
        let value = message.get_field(&field);
        if let Some(missing) = missing_in_value(&value) {
            return Some(missing);
        }
    }
    None
}

fn missing_in_value(value: &Value) -> Option<String> {
    match value {
        Value::Message(nested) => first_missing_required(nested),
        Value::List(items) => items.iter().find_map(missing_in_value),
        Value::Map(entries) => entries.values().find_map(missing_in_value),
        _ => None,
    }
}

//! Avro binary datum validation

use apache_avro::{from_avro_datum, Schema};
use async_trait::async_trait;
use tracing::debug;

use super::Validator;
use crate::error::{PipelineError, PipelineResult};

/// Validates a single Avro binary datum against an Avro schema (JSON form).
///
/// A schema that does not parse is an execution error. A payload that cannot be
/// decoded with the schema, or that leaves bytes behind, does not conform.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroValidator;

impl AvroValidator {
    pub fn validate_sync(message: &[u8], schema: &[u8]) -> PipelineResult<bool> {
        let text = std::str::from_utf8(schema)
            .map_err(|e| PipelineError::ValidationExecution(format!("Avro schema is not UTF-8: {e}")))?;
        let schema = Schema::parse_str(text)
            .map_err(|e| PipelineError::ValidationExecution(format!("invalid Avro schema: {e}")))?;

        let mut reader = message;
        match from_avro_datum(&schema, &mut reader, None) {
            Ok(_) if reader.is_empty() => Ok(true),
            Ok(_) => {
                debug!(trailing = reader.len(), "Avro datum has trailing bytes");
                Ok(false)
            }
            Err(e) => {
                debug!(error = %e, "Avro datum does not decode");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Validator for AvroValidator {
    async fn validate(&self, message: &[u8], schema: &[u8]) -> PipelineResult<bool> {
        Self::validate_sync(message, schema)
    }
}

//! JSON Schema validation

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;

use super::Validator;
use crate::error::{PipelineError, PipelineResult};

/// Validates JSON payloads against a JSON Schema document
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValidator;

impl JsonValidator {
    pub fn validate_sync(message: &[u8], schema: &[u8]) -> PipelineResult<bool> {
        let schema: Value = serde_json::from_slice(schema)
            .map_err(|e| PipelineError::ValidationExecution(format!("schema is not JSON: {e}")))?;
        let document: Value = serde_json::from_slice(message)
            .map_err(|e| PipelineError::ValidationExecution(format!("message is not JSON: {e}")))?;

        let compiled = JSONSchema::compile(&schema)
            .map_err(|e| PipelineError::ValidationExecution(format!("invalid JSON Schema: {e}")))?;
        Ok(compiled.is_valid(&document))
    }
}

#[async_trait]
impl Validator for JsonValidator {
    async fn validate(&self, message: &[u8], schema: &[u8]) -> PipelineResult<bool> {
        Self::validate_sync(message, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[u8] = br#"{
        "type": "object",
        "properties": { "id": { "type": "integer" }, "name": { "type": "string" } },
        "required": ["id"]
    }"#;

    #[test]
    fn test_valid_document() {
        assert!(JsonValidator::validate_sync(br#"{"id": 3, "name": "x"}"#, SCHEMA).unwrap());
    }

    #[test]
    fn test_invalid_document() {
        assert!(!JsonValidator::validate_sync(br#"{"id": "3"}"#, SCHEMA).unwrap());
    }

    #[test]
    fn test_malformed_message_is_error() {
        let result = JsonValidator::validate_sync(b"{id: 3", SCHEMA);
        assert!(matches!(result, Err(PipelineError::ValidationExecution(_))));
    }

    #[test]
    fn test_malformed_schema_is_error() {
        assert!(JsonValidator::validate_sync(br#"{"id": 3}"#, b"not a schema").is_err());
        assert!(JsonValidator::validate_sync(br#"{"id": 3}"#, br#"{"type": 12}"#).is_err());
    }
}

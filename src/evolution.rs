//! Schema Evolution Service
//!
//! Infers a schema from one observed message and registers it as the next
//! version of an existing schema. Only JSON and CSV payloads can be inferred;
//! for the other formats inference reports that no schema could be generated.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::format::Format;
use crate::schema::{EvolutionRequest, InsertInfo};
use crate::store::SchemaStore;

const JSON_SCHEMA_DIALECT: &str = "http://json-schema.org/draft-07/schema#";

/// Infer a schema specification from a raw payload.
///
/// Returns `Ok(None)` when the format has no inference support and an error
/// when the payload itself cannot be read as the declared format.
pub fn infer_schema(format: Format, data: &[u8]) -> PipelineResult<Option<Vec<u8>>> {
    match format {
        Format::Json => infer_json_schema(data).map(Some),
        Format::Csv => infer_csv_schema(data).map(Some),
        Format::Xml | Format::Avro | Format::Protobuf => Ok(None),
    }
}

/// Derive a JSON Schema that the given document satisfies
pub fn infer_json_schema(data: &[u8]) -> PipelineResult<Vec<u8>> {
    let document: Value = serde_json::from_slice(data)
        .map_err(|e| PipelineError::Inference(format!("payload is not JSON: {e}")))?;

    let mut schema = match schema_for_value(&document) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    schema.insert("$schema".to_string(), Value::String(JSON_SCHEMA_DIALECT.to_string()));

    serde_json::to_vec_pretty(&Value::Object(schema))
        .map_err(|e| PipelineError::Inference(e.to_string()))
}

fn schema_for_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "type": "null" }),
        Value::Bool(_) => json!({ "type": "boolean" }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "type": "integer" }),
        Value::Number(_) => json!({ "type": "number" }),
        Value::String(_) => json!({ "type": "string" }),
        Value::Array(items) => {
            let mut item_schemas: Vec<Value> = Vec::new();
            for item in items {
                let schema = schema_for_value(item);
                if !item_schemas.contains(&schema) {
                    item_schemas.push(schema);
                }
            }
            match item_schemas.len() {
                0 => json!({ "type": "array" }),
                1 => json!({ "type": "array", "items": item_schemas.remove(0) }),
                _ => json!({ "type": "array", "items": { "anyOf": merge_numeric(item_schemas) } }),
            }
        }
        Value::Object(fields) => {
            // BTreeMap keeps the generated schema stable across runs
            let properties: BTreeMap<&String, Value> = fields
                .iter()
                .map(|(name, value)| (name, schema_for_value(value)))
                .collect();
            let required: Vec<&String> = properties.keys().copied().collect();
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            })
        }
    }
}

/// Collapse `integer` into `number` when both appear among array items
fn merge_numeric(schemas: Vec<Value>) -> Vec<Value> {
    let integer = json!({ "type": "integer" });
    let number = json!({ "type": "number" });
    if schemas.contains(&integer) && schemas.contains(&number) {
        schemas.into_iter().filter(|s| *s != integer).collect()
    } else {
        schemas
    }
}

/// Derive a CSV Schema 1.1 document from the header row of a CSV payload.
/// Every record is read so that a ragged or badly quoted payload fails here
/// rather than during validation.
pub fn infer_csv_schema(data: &[u8]) -> PipelineResult<Vec<u8>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut records = reader.records();
    let header = records
        .next()
        .ok_or_else(|| PipelineError::Inference("CSV payload has no header row".to_string()))?
        .map_err(|e| PipelineError::Inference(format!("unreadable CSV payload: {e}")))?;
    for record in records {
        record.map_err(|e| PipelineError::Inference(format!("unreadable CSV payload: {e}")))?;
    }

    let columns: Vec<&str> = header.iter().collect();

    let mut schema = String::from("version 1.1 \n");
    schema.push_str(&format!("@totalColumns {}\n", columns.len()));
    for column in columns {
        schema.push_str(column);
        schema.push_str(": \n");
    }
    Ok(schema.into_bytes())
}

/// Outcome of an evolution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evolution {
    /// A new version was appended
    Registered(InsertInfo),
    /// No schema could be inferred; the message is a dead letter
    NotGenerated,
}

/// Infer a schema for `request` and append it to schema `id` as an
/// autogenerated version. The stored specification is base64 encoded.
pub fn evolve(store: &dyn SchemaStore, id: &str, request: &EvolutionRequest) -> PipelineResult<Evolution> {
    let format: Format = request.format.parse()?;
    let Some(generated) = infer_schema(format, request.data.as_bytes())? else {
        debug!(schema_id = %id, %format, "no inference support for format");
        return Ok(Evolution::NotGenerated);
    };

    let specification = BASE64.encode(generated);
    let info = store
        .update(id, specification, true)
        .map_err(|e| PipelineError::Lookup(e.to_string()))?;
    info!(schema_id = %id, version = info.version, %format, "registered evolved schema version");
    Ok(Evolution::Registered(info))
}

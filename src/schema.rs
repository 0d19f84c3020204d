//! Schema types and the request/response bodies of the registry API

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::version::SchemaVersion;

/// A named schema and its ordered versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Unique identifier assigned at creation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Free-form type label supplied by the client (e.g. "json", "csv")
    #[serde(rename = "schema-type", default)]
    pub schema_type: String,
    /// True once any version was produced by evolution
    #[serde(default)]
    pub autogenerated: bool,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "creation-date")]
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    /// Versions in insertion order, which is also version order
    #[serde(rename = "schemas", default)]
    pub versions: Vec<SchemaVersion>,
}

impl Schema {
    /// Create a schema holding its first version
    pub fn new(id: impl Into<String>, request: NewSchema) -> Self {
        Self {
            id: id.into(),
            schema_type: request.schema_type,
            autogenerated: false,
            description: request.description,
            creation_date: Utc::now(),
            name: request.name,
            versions: vec![SchemaVersion::new(1, request.specification)],
        }
    }

    /// Highest version number
    pub fn latest_version(&self) -> Option<u32> {
        self.versions.last().map(|v| v.version)
    }

    /// Look up one version
    pub fn version(&self, version: u32) -> Option<&SchemaVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Copy of this schema that carries only `version`
    pub fn at_version(&self, version: u32) -> Option<Schema> {
        let found = self.version(version)?.clone();
        Some(Schema {
            versions: vec![found],
            ..self.clone()
        })
    }

    /// Append a new version, returning its number
    pub fn append_version(&mut self, specification: impl Into<String>) -> u32 {
        let next = SchemaVersion::next_number(&self.versions);
        self.versions.push(SchemaVersion::new(next, specification));
        next
    }
}

/// Body of `POST /schema/`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSchema {
    #[serde(default)]
    pub description: String,
    pub specification: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "schema-type", default)]
    pub schema_type: String,
}

/// Body of `PUT /schema/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificationUpdate {
    pub specification: String,
}

/// Explicit metadata change; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaMetadataUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "schema-type")]
    pub schema_type: Option<String>,
}

/// Body of `POST /schema/{id}/evolution`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionRequest {
    #[serde(alias = "Data")]
    pub data: String,
    pub format: String,
}

/// Response of create, update and evolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertInfo {
    #[serde(default)]
    pub identification: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub message: String,
}

impl InsertInfo {
    pub fn new(identification: impl Into<String>, version: u32, message: impl Into<String>) -> Self {
        Self {
            identification: identification.into(),
            version,
            message: message.into(),
        }
    }

    /// Whether this response names a registered version
    pub fn is_registered(&self) -> bool {
        !self.identification.is_empty() && self.version != 0
    }
}

/// Plain informational body, `{"message": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub message: String,
}

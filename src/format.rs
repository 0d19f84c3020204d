//! Payload formats understood by the pipeline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Format of a message payload, taken from the `format` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Csv,
    Xml,
    Avro,
    Protobuf,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Json,
        Format::Csv,
        Format::Xml,
        Format::Avro,
        Format::Protobuf,
    ];

    /// Attribute value for this format
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Xml => "xml",
            Format::Avro => "avro",
            Format::Protobuf => "protobuf",
        }
    }

    /// Whether messages of this format have their own invalid-format topic.
    ///
    /// Formats without one send invalid and failed messages to dead-letter.
    pub fn has_invalid_topic(&self) -> bool {
        matches!(self, Format::Json | Format::Csv)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            "xml" => Ok(Format::Xml),
            "avro" => Ok(Format::Avro),
            "protobuf" => Ok(Format::Protobuf),
            other => Err(PipelineError::UnknownFormat(other.to_string())),
        }
    }
}

//! Configuration for the registry service and the validation pipeline
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (janitor.toml or janitor.yaml)
//! - Environment variables (JANITOR__*)
//!
//! ## Example config file (janitor.toml):
//! ```toml
//! [registry]
//! url = "http://localhost:8080"
//! bind = "0.0.0.0:8080"
//! path = "./registry"
//!
//! [topics]
//! valid = "valid-topic"
//! invalid_json = "invalid-topic-json"
//! invalid_csv = "invalid-topic-csv"
//! dead_letter = "dead-letter-topic"
//!
//! [validators]
//! csv_url = "http://localhost:8081/csv"
//! xml_url = "http://localhost:8082/xml"
//!
//! [puller.csv]
//! subscription = "invalid-topic-csv-sub"
//! max_duration_secs = 60
//! max_batch_size = 500
//! max_throughput = 1048576
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::format::Format;
use crate::puller::BatchLimits;
use crate::router::Topics;
use crate::validator::ValidatorSettings;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Destination topics
    #[serde(default)]
    pub topics: Topics,

    #[serde(default)]
    pub validators: ValidatorsConfig,

    /// Recovery pullers, one per format with automatic inference
    #[serde(default)]
    pub puller: PullersConfig,
}

/// Registry service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL clients use to reach the registry
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Address the registry service listens on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Store directory; schemas are kept in memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Endpoints of the delegated validators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorsConfig {
    #[serde(default = "default_csv_url")]
    pub csv_url: String,

    #[serde(default = "default_xml_url")]
    pub xml_url: String,

    /// Where protobuf scratch files are created
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullersConfig {
    #[serde(default = "default_json_puller")]
    pub json: PullerConfig,

    #[serde(default = "default_csv_puller")]
    pub csv: PullerConfig,
}

/// One recovery puller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullerConfig {
    /// Subscription on the format's invalid topic
    pub subscription: String,

    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Cumulative payload bytes per batch
    #[serde(default = "default_max_throughput")]
    pub max_throughput: usize,
}

// Default value functions
fn default_registry_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_csv_url() -> String {
    "http://localhost:8081/csv".to_string()
}

fn default_xml_url() -> String {
    "http://localhost:8082/xml".to_string()
}

fn default_max_duration_secs() -> u64 {
    30
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_throughput() -> usize {
    10 * 1024 * 1024
}

fn default_puller(subscription: &str) -> PullerConfig {
    PullerConfig {
        subscription: subscription.to_string(),
        max_duration_secs: default_max_duration_secs(),
        max_batch_size: default_max_batch_size(),
        max_throughput: default_max_throughput(),
    }
}

fn default_json_puller() -> PullerConfig {
    default_puller("invalid-topic-json-sub")
}

fn default_csv_puller() -> PullerConfig {
    default_puller("invalid-topic-csv-sub")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            bind: default_bind(),
            path: None,
        }
    }
}

impl Default for ValidatorsConfig {
    fn default() -> Self {
        Self {
            csv_url: default_csv_url(),
            xml_url: default_xml_url(),
            scratch_dir: None,
        }
    }
}

impl Default for PullersConfig {
    fn default() -> Self {
        Self {
            json: default_json_puller(),
            csv: default_csv_puller(),
        }
    }
}

impl ValidatorsConfig {
    pub fn settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            csv_url: self.csv_url.clone(),
            xml_url: self.xml_url.clone(),
            scratch_dir: self.scratch_dir.clone(),
        }
    }
}

impl PullersConfig {
    /// Puller for a format; only JSON and CSV are recoverable
    pub fn for_format(&self, format: Format) -> Option<&PullerConfig> {
        match format {
            Format::Json => Some(&self.json),
            Format::Csv => Some(&self.csv),
            Format::Xml | Format::Avro | Format::Protobuf => None,
        }
    }
}

impl PullerConfig {
    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_duration: Duration::from_secs(self.max_duration_secs),
            max_batch_size: self.max_batch_size,
            max_throughput: self.max_throughput,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Extension-less names pick up janitor.toml as well as janitor.yaml
        let config_locations = ["janitor", ".janitor", "config/janitor"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "janitor", "janitor") {
            let xdg_config = config_dir.config_dir().join("janitor.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (JANITOR__REGISTRY__URL, ...)
        builder = builder.add_source(
            Environment::with_prefix("JANITOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Store directory, resolved against the working directory
    pub fn store_path(&self) -> Option<PathBuf> {
        self.registry.path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                std::env::current_dir().unwrap_or_default().join(p)
            }
        })
    }
}

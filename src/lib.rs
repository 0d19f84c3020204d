//! Janitor Schema Registry
//!
//! A versioned schema registry and the message validation pipeline built
//! around it.
//!
//! ## Features
//!
//! - **Append-only versions**: every update adds version `max + 1`; old
//!   versions are never rewritten
//! - **Checksum Validation**: SHA256 hashes of every specification
//! - **Schema Evolution**: JSON Schema and CSV Schema inferred from observed
//!   messages
//! - **Message Routing**: live messages validated per format and forwarded to
//!   valid, invalid or dead-letter topics
//! - **Dead-letter Recovery**: batches of drifted messages reconciled against
//!   freshly inferred schema versions
//!
//! ## Architecture
//!
//! ```text
//! live messages ──▶ CentralConsumer ──lookup──▶ schema-registry (SchemaStore)
//!                        │                               ▲
//!                        ├──▶ valid topic                │ evolve + lookup
//!                        └──▶ invalid / dead-letter      │
//!                                   │                    │
//!                                   ▼                    │
//!                             BatchAcquirer ──▶ Reconciler ──▶ valid topic
//! ```

pub mod checksum;
pub mod client;
pub mod config;
pub mod error;
pub mod evolution;
pub mod format;
pub mod puller;
pub mod reconciler;
pub mod router;
pub mod schema;
pub mod server;
pub mod store;
pub mod transport;
pub mod validator;
pub mod version;

pub use checksum::Checksum;
pub use client::{HttpRegistryClient, LocalRegistry, RegistryClient};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult, Result, SchemaError};
pub use format::Format;
pub use puller::{BatchAcquirer, BatchLimits};
pub use reconciler::{ReconcileReport, Reconciler, RecoveryJob};
pub use router::{route_for, CentralConsumer, Route, RouteDecision, Topics};
pub use schema::{EvolutionRequest, InsertInfo, NewSchema, Schema};
pub use store::{FileStore, MemoryStore, SchemaStore};
pub use transport::{MemoryBroker, Message, Publisher, Subscription};
pub use validator::{Outcome, Validator, ValidatorSet};
pub use version::SchemaVersion;

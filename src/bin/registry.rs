//! Schema Registry service
//!
//! Serves the registry REST API over a file-backed store, or an in-memory one
//! when no store path is configured.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use janitor_schemas::server;
use janitor_schemas::{FileStore, MemoryStore, PipelineConfig, SchemaStore};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-registry")]
#[command(about = "Serve the versioned schema registry over HTTP")]
struct Cli {
    /// Config file (defaults to janitor.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overrides [registry].bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Store directory, overrides [registry].path
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Keep schemas in memory only
    #[arg(long, conflicts_with = "store")]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    let store: Arc<dyn SchemaStore> = match cli.store.or_else(|| config.store_path()) {
        Some(path) if !cli.memory => {
            let store = FileStore::open(&path)
                .with_context(|| format!("opening schema store at {}", path.display()))?;
            Arc::new(store)
        }
        _ => {
            info!("no store path configured, keeping schemas in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let bind = cli.bind.unwrap_or(config.registry.bind);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;

    server::serve(listener, store).await?;
    Ok(())
}

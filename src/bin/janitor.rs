//! Janitor CLI
//!
//! Offline helpers around the validation pipeline: validate a payload against
//! a schema file, infer a schema from a sample message, or write a default
//! configuration file.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use janitor_schemas::evolution::infer_schema;
use janitor_schemas::{Format, Outcome, PipelineConfig, ValidatorSet};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "janitor")]
#[command(about = "Validate messages and infer schemas")]
struct Cli {
    /// Config file (defaults to janitor.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a message file against a schema file
    Validate {
        /// Payload format: json, csv, xml, avro or protobuf
        #[arg(short, long)]
        format: String,
        /// Schema specification (plain, not base64)
        #[arg(short, long)]
        schema: PathBuf,
        /// Message payload
        message: PathBuf,
    },

    /// Print the schema inferred from a sample message
    Infer {
        /// Payload format: json or csv
        #[arg(short, long)]
        format: String,
        /// Sample message
        message: PathBuf,
    },

    /// Write the effective configuration as TOML
    InitConfig {
        #[arg(default_value = "janitor.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = PipelineConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Validate { format, schema, message } => {
            let format: Format = format.parse()?;
            let schema = std::fs::read(&schema).with_context(|| format!("reading {}", schema.display()))?;
            let message = std::fs::read(&message).with_context(|| format!("reading {}", message.display()))?;

            let validators = ValidatorSet::new(reqwest::Client::new(), config.validators.settings());
            match validators.check(format, &message, &schema).await {
                Outcome::Valid => {
                    println!("✅ valid {format} message");
                    Ok(true)
                }
                Outcome::Invalid => {
                    println!("❌ message does not match the {format} schema");
                    Ok(false)
                }
                Outcome::Error(reason) => anyhow::bail!("validation could not run: {reason}"),
            }
        }

        Commands::Infer { format, message } => {
            let format: Format = format.parse()?;
            let message = std::fs::read(&message).with_context(|| format!("reading {}", message.display()))?;
            match infer_schema(format, &message)? {
                Some(schema) => {
                    println!("{}", String::from_utf8_lossy(&schema));
                    Ok(true)
                }
                None => {
                    eprintln!("⚠️  schema inference is not supported for {format}");
                    Ok(false)
                }
            }
        }

        Commands::InitConfig { output } => {
            config.save(&output).with_context(|| format!("writing {output}"))?;
            println!("📝 Wrote {output}");
            Ok(true)
        }
    }
}

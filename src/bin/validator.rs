//! Schema Validator CLI
//!
//! Validates schema records, reporting every problem in one run, and diffs
//! materialized schema versions.
//!
//! Usage:
//!   modelforge validate schema.json --reference published.json
//!   modelforge diff published.json schema.json
//!   modelforge dump schema.json

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use modelforge::config::OutputFormat;
use modelforge::{diff, Checksum, EngineConfig, Schema, SchemaError};

#[derive(Parser)]
#[command(name = "modelforge")]
#[command(about = "Validate and diff physical schema records")]
struct Cli {
    /// Path to a config file (defaults to modelforge.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a schema record
    Validate {
        /// Schema record (JSON)
        schema: PathBuf,

        /// Reference schema record for extension validation
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },

    /// Diff two schema versions after validating both
    Diff {
        /// The previously published record
        old: PathBuf,
        /// The new record
        new: PathBuf,
    },

    /// Validate a record and print its normalized form
    Dump {
        /// Schema record (JSON)
        schema: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("❌ Error: {error:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = EngineConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { schema, reference } => {
            let reference = reference.or_else(|| config.validator.reference.clone());
            let schema = load_schema(&schema, reference.as_deref())?;
            match schema.validate() {
                Ok(valid) => {
                    let physical = valid.materialize().context("materialization failed")?;
                    println!("✅ {} is valid", valid.metadata.model_id());
                    println!(
                        "   {} view(s), {} container(s), {} property row(s)",
                        physical.views.len(),
                        physical.containers.len(),
                        valid.properties.len()
                    );
                    if config.output.include_checksum {
                        println!("   checksum {}", Checksum::from_record(&physical.dump()));
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(SchemaError::Validation(failure)) => {
                    for error in &failure.errors {
                        eprintln!("  [{}] {}", error.code(), error);
                    }
                    eprintln!("❌ validation failed with {} error(s)", failure.errors.len());
                    Ok(ExitCode::FAILURE)
                }
                Err(error) => Err(error.into()),
            }
        }

        Commands::Diff { old, new } => {
            let old = load_schema(&old, None)?
                .validate()
                .context("the old record does not validate")?;
            let new = load_schema(&new, None)?
                .validate()
                .context("the new record does not validate")?;
            let changes = diff(
                &new.materialize().context("materialization failed")?,
                &old.materialize().context("materialization failed")?,
            );
            println!("{}", render(&changes, config.output.format)?);
            if changes.is_empty() {
                eprintln!("✅ No structural changes");
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Dump { schema } => {
            let valid = load_schema(&schema, None)?.validate()?;
            println!("{}", render(&valid.dump(), config.output.format)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_schema(path: &Path, reference: Option<&Path>) -> anyhow::Result<Schema> {
    let mut schema = read_record(path)?;
    if let Some(reference_path) = reference {
        schema.reference = Some(Box::new(read_record(reference_path)?));
    }
    Ok(schema)
}

fn read_record(path: &Path) -> anyhow::Result<Schema> {
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let record = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Schema::from_record(record)
        .with_context(|| format!("{} is not a schema record", path.display()))
}

fn render<T: serde::Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    })
}

//! Operator CLI for the Registrar lifecycle core.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use registrar_core::config::AppConfig;
use registrar_core::{EntityKind, IdKind};
use registrar_lifecycle::{ArchivalScheduler, IdentifierIssuer, LifecycleService};
use std::sync::Arc;
use uuid::Uuid;

/// Registrar - record lifecycle and archival tooling
#[derive(Parser)]
#[command(name = "registrarctl")]
#[command(about = "Operator CLI for the Registrar lifecycle core")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "REGISTRAR_CONFIG",
        default_value = "config/registrar.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Soft-delete a record, cascading to its dependents
    SoftDelete {
        /// Entity kind (scenario, persona, scene, attachment, progress)
        kind: String,
        /// Internal record id
        id: Uuid,
        /// Acting operator id, recorded on the deletion
        #[arg(long)]
        actor: Option<Uuid>,
        /// Free-text reason recorded on the deletion
        #[arg(long)]
        reason: Option<String>,
    },
    /// Restore a soft-deleted record (dependents stay deleted)
    Restore {
        /// Entity kind (scenario, persona, scene, attachment, progress)
        kind: String,
        /// Internal record id
        id: Uuid,
    },
    /// Run a purge sweep now
    Cleanup {
        /// Retention threshold in days (common choices: 7, 30, 90).
        /// Defaults to the configured retention.
        #[arg(long)]
        retention_days: Option<u32>,
    },
    /// Show lifecycle statistics per entity kind
    Stats,
    /// Issue a new unique identifier
    IssueId {
        /// Id kind (student, instructor, scenario, cohort)
        kind: String,
    },
    /// Run the archival scheduler in the foreground until interrupted
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let metadata = registrar_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    let service = Arc::new(LifecycleService::new(
        metadata.clone(),
        config.retention.clone(),
        &config.logging,
    ));

    match cli.command {
        Commands::SoftDelete {
            kind,
            id,
            actor,
            reason,
        } => {
            let kind = parse_entity_kind(&kind)?;
            let transitioned = service
                .soft_delete(kind, id, actor, reason.as_deref())
                .await
                .with_context(|| format!("failed to soft-delete {kind} {id}"))?;
            println!("Soft-deleted {transitioned} record(s) starting at {kind} {id}");
        }
        Commands::Restore { kind, id } => {
            let kind = parse_entity_kind(&kind)?;
            service
                .restore(kind, id)
                .await
                .with_context(|| format!("failed to restore {kind} {id}"))?;
            println!("Restored {kind} {id}");
        }
        Commands::Cleanup { retention_days } => {
            let retention_days = retention_days.unwrap_or(service.default_retention_days());
            let job = service
                .run_cleanup(retention_days)
                .await
                .context("cleanup sweep failed")?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Stats => {
            let snapshot = service.stats().await.context("failed to read stats")?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::IssueId { kind } => {
            let kind: IdKind = kind
                .parse()
                .with_context(|| format!("unknown id kind '{kind}'"))?;
            let issuer = IdentifierIssuer::new(metadata, config.retention.id_max_attempts);
            let unique_id = issuer
                .issue(kind)
                .await
                .context("identifier issuance failed")?;
            println!("{unique_id}");
        }
        Commands::Schedule => {
            if !config.archival.enabled {
                anyhow::bail!(
                    "archival scheduling is disabled; set archival.enabled = true in the config"
                );
            }
            let mut scheduler = ArchivalScheduler::new(
                service,
                config.archival.clone(),
                config.retention.retention_days,
            )
            .context("invalid archival configuration")?;
            scheduler.start();
            tracing::info!("Scheduler running, press Ctrl-C to stop");

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            scheduler.stop();
            tracing::info!("Shutting down; an in-flight sweep finishes on its own");
        }
    }

    Ok(())
}

fn parse_entity_kind(raw: &str) -> Result<EntityKind> {
    raw.parse()
        .with_context(|| format!("unknown entity kind '{raw}'"))
}

/// Load configuration from the TOML file (optional) merged with
/// REGISTRAR_-prefixed environment variables.
fn load_config(config_path: &str) -> Result<AppConfig> {
    let path = std::path::Path::new(config_path);
    let mut figment = Figment::new();
    let has_config_file = path.exists();

    if has_config_file {
        tracing::info!(config_path = %config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!("No config file found at {}", config_path);
    }

    // REGISTRAR_CONFIG is just the file path, not configuration content.
    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("REGISTRAR_") && key != "REGISTRAR_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: registrarctl --config /path/to/registrar.toml <command>\n  \
             2. Environment variables: REGISTRAR_METADATA__TYPE=sqlite \
             REGISTRAR_METADATA__PATH=registrar.db registrarctl <command>\n\n\
             See config/registrar.example.toml for example configuration."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("REGISTRAR_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    Ok(config)
}

//! memflush binary.
//!
//! Usage:
//!   memflush --user-id rob
//!   memflush --user-id rob --dry-run
//!   memflush --config /etc/memflush.toml
//!
//! Exits 0 on success, on an empty buffer and after a dry run; 1 otherwise.

use clap::Parser;
use memflush_migrator::{MigrationError, MigrationReport, Migrator, MigratorConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "memflush",
    version,
    about = "Move buffered conversation turns from Redis into durable storage"
)]
struct Cli {
    /// Subject whose buffer is migrated (default: USER_ID or config)
    #[arg(long)]
    user_id: Option<String>,

    /// Report what would happen without storing, writing or clearing anything
    #[arg(long)]
    dry_run: bool,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,memflush_migrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<MigrationError>() {
                Some(MigrationError::ClearFailed { .. }) => tracing::warn!("{e}"),
                _ => tracing::error!("{e:#}"),
            }
            println!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<MigrationReport> {
    let mut config = if let Some(path) = cli.config {
        tracing::info!(path = %path.display(), "Loading configuration");
        MigratorConfig::from_file(&path)?
    } else {
        MigratorConfig::default()
    };
    config.apply_process_env()?;

    let subject_id = cli
        .user_id
        .unwrap_or_else(|| config.default_user_id.clone());

    let migrator = Migrator::from_config(&config)?;
    let report = migrator.run(&subject_id, cli.dry_run).await?;
    Ok(report)
}

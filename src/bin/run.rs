//! One orchestrator pass over the task registry, then exit.

use clap::Parser;
use std::path::PathBuf;
use taskhub::{HubConfig, Orchestrator};
use tracing::{info, warn};

/// Run every enabled task once, subject to admission rules.
#[derive(Parser)]
#[command(name = "taskhub-run", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory holding state and history.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the task registry file.
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = HubConfig::load(cli.config.as_deref());
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    if let Some(dir) = cli.data_dir {
        config.paths.data_dir = Some(dir);
    }
    if let Some(registry) = cli.registry {
        config.paths.registry_file = Some(registry);
    }

    let _log_guard = taskhub::logging::init_tracing("taskhub-run", Some(&config.log_dir()));
    if let Err(e) = &loaded {
        warn!("using default configuration: {e}");
    }

    info!(
        registry = %config.registry_file().display(),
        data_dir = %config.data_dir().display(),
        "starting orchestrator pass"
    );
    let orchestrator = Orchestrator::from_config(&config)?;
    let summary = orchestrator.run_all().await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "ran {} (success {}, failed {}), skipped {}{}",
            summary.ran,
            summary.success,
            summary.failed,
            summary.skipped,
            if summary.halted {
                ", halted by circuit breaker"
            } else {
                ""
            }
        );
    }
    Ok(())
}

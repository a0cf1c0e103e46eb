//! Long-lived overseer process.

use clap::Parser;
use std::path::PathBuf;
use taskhub::{HubConfig, Optimizer, Overseer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Watch the hub state, recover stuck tasks, and keep logs bounded.
#[derive(Parser)]
#[command(name = "taskhub-overseer", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory holding state and history.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single check cycle and exit.
    #[arg(long, conflicts_with = "optimize")]
    once: bool,

    /// Run the retention pass once, print its report, and exit.
    #[arg(long)]
    optimize: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = HubConfig::load(cli.config.as_deref());
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    if let Some(dir) = cli.data_dir {
        config.paths.data_dir = Some(dir);
    }

    let _log_guard =
        taskhub::logging::init_tracing("taskhub-overseer", Some(&config.log_dir()));
    if let Err(e) = &loaded {
        warn!("using default configuration: {e}");
    }

    if cli.optimize {
        let report = Optimizer::from_config(&config).run_optimization();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut overseer = Overseer::from_config(&config);

    if cli.once {
        let now = chrono::Utc::now();
        overseer.start_at(now)?;
        let report = overseer.run_cycle_at(now);
        for issue in &report.issues {
            println!("issue: {issue}");
        }
        for action in &report.actions {
            println!("action: {}", action.describe());
        }
        overseer.stop_at(chrono::Utc::now())?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    if let Err(e) = overseer.run(cancel).await {
        error!(error = %e, "overseer exited with error");
        return Err(anyhow::anyhow!("overseer failed: {e}"));
    }
    info!("overseer shut down cleanly");
    Ok(())
}

/// Cancel `token` on Ctrl-C or, on Unix, SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("cannot listen for SIGTERM: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        token.cancel();
    });
}

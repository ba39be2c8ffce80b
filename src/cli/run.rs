//! Handler for the `run` command.

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use crate::app::{App, Config};
use crate::cli::RunArgs;
use crate::error::Result;

/// Apply CLI overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(path) = &args.status_file {
        config.engine.status_file = path.to_string_lossy().into_owned();
    }
    if let Some(path) = &args.database {
        config.ledger.database = Some(path.to_string_lossy().into_owned());
    }
}

/// Execute the run command.
///
/// Ctrl-C asks the engine to wind down live positions before exiting.
pub async fn execute(args: &RunArgs) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    apply_overrides(&mut config, args);
    config.init_logging();

    if config.dry_run {
        info!("Dry-run mode enabled - orders go to the paper gateway");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = App::run(config, shutdown_rx);
    tokio::pin!(run);

    let snapshot = tokio::select! {
        result = &mut run => result?,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            run.await?
        }
    };

    info!(
        opened = snapshot.counters.positions_opened,
        closed = snapshot.counters.positions_closed,
        cumulative_pnl = %snapshot.ledger.cumulative_pnl,
        "plutus stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn overrides_replace_configured_values() {
        let cli = crate::cli::Cli::parse_from([
            "plutus",
            "run",
            "--dry-run",
            "--log-level",
            "debug",
            "--json-logs",
            "--status-file",
            "/tmp/s.json",
            "--database",
            "/tmp/a.db",
        ]);
        let crate::cli::Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert!(config.dry_run);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.engine.status_file, "/tmp/s.json");
        assert_eq!(config.ledger.database.as_deref(), Some("/tmp/a.db"));
    }

    #[test]
    fn no_flags_leave_config_alone() {
        let cli = crate::cli::Cli::parse_from(["plutus", "run"]);
        let crate::cli::Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert!(!config.dry_run);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.ledger.database.is_none());
    }
}

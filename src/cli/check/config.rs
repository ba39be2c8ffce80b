use std::path::Path;

use crate::app::Config;
use crate::cli::output;
use crate::error::Result;

/// Validate a configuration file without starting the engine.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    println!("Checking configuration: {}", path.display());

    let config = Config::load(path)?;
    output::ok("Configuration file is valid");

    output::section("Summary");
    output::key_value("venues", config.venues.len());
    for venue in &config.venues {
        let markets = config.markets_on(&venue.id).count();
        let mode = if venue.tradable { "tradable" } else { "reference" };
        output::key_value(
            &format!("  {}", venue.id),
            format!("{:?}, {mode}, {markets} markets", venue.kind),
        );
    }
    output::key_value("strategies", config.strategies.enabled.join(", "));
    output::key_value("dry-run", config.dry_run);
    output::key_value("initial capital", config.ledger.initial_capital);
    output::key_value("daily loss limit", config.risk.daily_loss_limit);
    match &config.ledger.database {
        Some(database) => output::key_value("ledger", database),
        None => output::warn("No ledger database: the audit log will not survive a restart"),
    }

    let live = !config.dry_run && config.venues.iter().any(|v| v.tradable);
    if live {
        if config.credentials.is_some() {
            output::ok("API credentials found (PLUTUS_API_KEY, PLUTUS_API_SECRET, PLUTUS_API_PASSPHRASE)");
        } else {
            output::warn("Live trading needs PLUTUS_API_KEY, PLUTUS_API_SECRET and PLUTUS_API_PASSPHRASE");
        }
    }

    println!();
    println!("Configuration is ready to use.");
    Ok(())
}

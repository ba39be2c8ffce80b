//! Config files for CLI and wiring tests.

use std::fs;
use std::path::{Path, PathBuf};

/// A complete, valid dry-run configuration with one prediction venue and
/// one reference venue.
pub fn sample_toml(status_file: &Path) -> String {
    format!(
        r#"dry_run = true

[logging]
level = "warn"
format = "pretty"

[engine]
housekeeping_interval_ms = 50
status_file = "{status}"
shutdown_grace_ms = 500

[fees]
default_rate = 0

[[venues]]
id = "pm"
kind = "polymarket"
ws_url = "wss://pm.invalid/ws"
api_url = "https://pm.invalid"
tradable = true

[[venues]]
id = "bn"
kind = "binance"
ws_url = "wss://bn.invalid/ws"
tradable = false

[[markets]]
venue = "pm"
instrument = "0xabc"
yes_asset = "111"
no_asset = "222"

[[markets]]
venue = "bn"
instrument = "BTCUSDT"

[strategies]
enabled = ["structural"]

[risk]
daily_loss_limit = 50
max_concurrent_positions = 3

[ledger]
initial_capital = 500

[reconnection]
initial_delay_ms = 10
max_delay_ms = 20
"#,
        status = status_file.display()
    )
}

/// Write `contents` to `config.toml` inside `dir`.
pub fn write(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, contents).expect("write config");
    path
}

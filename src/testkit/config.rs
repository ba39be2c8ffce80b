//! Canonical test configurations.

use rust_decimal_macros::dec;

use crate::app::{
    Config, ExecutionConfig, ExitConfig, MarketConfig, QuoteRef, ReconnectionConfig,
    RetryConfig, VenueConfig, VenueKind,
};
use crate::domain::{AssetId, FeeModel, InstrumentId, VenueId};

/// Fast reconnection config with zero delays.
pub fn reconnection() -> ReconnectionConfig {
    ReconnectionConfig {
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 1.0,
        max_consecutive_failures: 3,
        circuit_breaker_cooldown_ms: 0,
    }
}

/// Execution config with short timeouts and no retry delay.
pub fn execution() -> ExecutionConfig {
    ExecutionConfig {
        fill_timeout_ms: 200,
        poll_interval_ms: 10,
        flatten_slippage: dec!(0.02),
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 5,
        },
        exit: ExitConfig {
            take_profit: dec!(0.03),
            stop_loss: dec!(0.05),
            max_hold_secs: 3_600,
            monitor_interval_ms: 20,
        },
    }
}

pub fn venue(id: &str, kind: VenueKind, tradable: bool) -> VenueConfig {
    VenueConfig {
        id: VenueId::from(id),
        kind,
        ws_url: format!("wss://{id}.invalid/ws"),
        api_url: tradable.then(|| format!("https://{id}.invalid")),
        tradable,
        request_timeout_ms: 1_000,
    }
}

/// Binary market `instrument` on `venue` with `{instrument}-yes/-no` assets.
pub fn binary_market(venue: &str, instrument: &str) -> MarketConfig {
    MarketConfig {
        venue: VenueId::from(venue),
        instrument: InstrumentId::from(instrument),
        yes_asset: Some(AssetId::new(format!("{instrument}-yes"))),
        no_asset: Some(AssetId::new(format!("{instrument}-no"))),
    }
}

pub fn spot_market(venue: &str, symbol: &str) -> MarketConfig {
    MarketConfig {
        venue: VenueId::from(venue),
        instrument: InstrumentId::from(symbol),
        yes_asset: None,
        no_asset: None,
    }
}

pub fn quote_ref(venue: &str, instrument: &str, asset: Option<&str>) -> QuoteRef {
    QuoteRef {
        venue: VenueId::from(venue),
        instrument: InstrumentId::from(instrument),
        asset: asset.map(AssetId::from),
    }
}

/// Two prediction venues (`pm`, `pm2`) with market `m1` on each and a
/// cross-venue pair between their YES assets. Fee-free, dry run.
pub fn two_venues() -> Config {
    let mut config = Config {
        venues: vec![
            venue("pm", VenueKind::Polymarket, true),
            venue("pm2", VenueKind::Polymarket, true),
        ],
        markets: vec![binary_market("pm", "m1"), binary_market("pm2", "m1")],
        fees: FeeModel::flat(dec!(0)),
        execution: execution(),
        reconnection: reconnection(),
        dry_run: true,
        ..Config::default()
    };
    config.strategies.enabled = vec!["structural".into(), "cross-venue".into()];
    config.strategies.cross_venue.pairs = vec![crate::app::PairConfig {
        a: quote_ref("pm", "m1", Some("m1-yes")),
        b: quote_ref("pm2", "m1", Some("m1-yes")),
    }];
    config
}

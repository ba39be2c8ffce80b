//! Feed reconnection settings.

use std::time::Duration;

use serde::Deserialize;

/// Backoff and circuit breaker settings shared by every venue feed.
///
/// Delays grow by `backoff_multiplier` per failed attempt, capped at
/// `max_delay_ms`. After `max_consecutive_failures` the feed stops trying
/// for `circuit_breaker_cooldown_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectionConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_circuit_breaker_cooldown_ms")]
    pub circuit_breaker_cooldown_ms: u64,
}

impl ReconnectionConfig {
    /// Delay that follows `current_ms` after another failure.
    #[must_use]
    pub fn grow_delay_ms(&self, current_ms: u64) -> u64 {
        let grown = (current_ms as f64 * self.backoff_multiplier) as u64;
        grown.min(self.max_delay_ms)
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_cooldown_ms)
    }

    /// Check the settings, returning the offending field and why.
    pub(crate) fn validate(&self) -> Result<(), (&'static str, &'static str)> {
        if self.initial_delay_ms == 0 {
            return Err(("reconnection.initial_delay_ms", "must be greater than 0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(("reconnection.max_delay_ms", "must be >= initial_delay_ms"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(("reconnection.backoff_multiplier", "must be >= 1.0"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(("reconnection.max_consecutive_failures", "must be greater than 0"));
        }
        if self.circuit_breaker_cooldown_ms == 0 {
            return Err(("reconnection.circuit_breaker_cooldown_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_consecutive_failures() -> u32 {
    8
}

fn default_circuit_breaker_cooldown_ms() -> u64 {
    300_000
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_consecutive_failures: default_max_consecutive_failures(),
            circuit_breaker_cooldown_ms: default_circuit_breaker_cooldown_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_up_to_the_cap() {
        let config = ReconnectionConfig {
            initial_delay_ms: 100,
            max_delay_ms: 350,
            ..ReconnectionConfig::default()
        };
        assert_eq!(config.grow_delay_ms(100), 200);
        assert_eq!(config.grow_delay_ms(200), 350);
        assert_eq!(config.grow_delay_ms(350), 350);
    }

    #[test]
    fn shrinking_backoff_is_rejected() {
        let config = ReconnectionConfig {
            backoff_multiplier: 0.5,
            ..ReconnectionConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().0, "reconnection.backoff_multiplier");
        assert!(ReconnectionConfig::default().validate().is_ok());
    }
}

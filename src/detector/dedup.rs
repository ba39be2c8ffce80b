//! At most one live opportunity per (strategy, instrument).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{InstrumentKey, Opportunity, StrategyKind};

/// Holds each emitted key until its opportunity expires, whether it was
/// executed, rejected or ignored.
#[derive(Debug, Default)]
pub struct Deduplicator {
    active: HashMap<(StrategyKind, InstrumentKey), DateTime<Utc>>,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the opportunity's key. False if an unexpired one holds it.
    pub fn admit(&mut self, opportunity: &Opportunity, now: DateTime<Utc>) -> bool {
        let key = (opportunity.strategy(), opportunity.key().clone());
        if let Some(expires_at) = self.active.get(&key) {
            if now < *expires_at {
                return false;
            }
        }
        self.active.insert(key, opportunity.expires_at());
        true
    }

    /// Drop expired keys. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.active.len();
        self.active.retain(|_, expires_at| now < *expires_at);
        before - self.active.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::domain::structural_opportunity;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn second_opportunity_on_same_key_is_dropped_until_expiry() {
        let mut dedup = Deduplicator::new();
        let first = structural_opportunity(dec!(0.45), dec!(0.45), dec!(10));
        let second = structural_opportunity(dec!(0.44), dec!(0.45), dec!(10));
        let now = first.discovered_at();

        assert!(dedup.admit(&first, now));
        assert!(!dedup.admit(&second, now));
        assert!(dedup.admit(&second, first.expires_at()));
    }

    #[test]
    fn prune_removes_only_expired_keys() {
        let mut dedup = Deduplicator::new();
        let opp = structural_opportunity(dec!(0.45), dec!(0.45), dec!(10));
        dedup.admit(&opp, opp.discovered_at());

        assert_eq!(dedup.prune(opp.discovered_at()), 0);
        assert_eq!(dedup.prune(opp.expires_at() + Duration::milliseconds(1)), 1);
        assert!(dedup.is_empty());
    }
}

//! Mark-to-market and exit conditions for filled positions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::app::ExitConfig;
use crate::domain::{
    AssetId, ExitReason, InstrumentKey, Position, Price, Quote, Side, StrategyKind, Tick, Volume,
};

/// Net quantity held in one asset after entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub key: InstrumentKey,
    pub asset: AssetId,
    /// Positive long, negative short.
    pub quantity: Volume,
    /// Average entry price of the legs that built the holding.
    pub entry_price: Price,
}

impl Holding {
    /// Side of the order that closes this holding.
    #[must_use]
    pub fn closing_side(&self) -> Side {
        if self.quantity > Decimal::ZERO {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

/// Net holdings per (instrument, asset). Offsetting legs cancel out.
#[must_use]
pub fn holdings(position: &Position) -> Vec<Holding> {
    let mut net: Vec<(InstrumentKey, AssetId, Volume, Price, Volume)> = Vec::new();
    for leg in position.legs() {
        if leg.filled().is_zero() {
            continue;
        }
        let signed = -leg.side().cash_sign() * leg.filled();
        let key = leg.key();
        match net
            .iter_mut()
            .find(|(k, a, ..)| *k == key && a == leg.asset())
        {
            Some((_, _, qty, cost, gross)) => {
                *qty += signed;
                *cost += leg.avg_price() * leg.filled();
                *gross += leg.filled();
            }
            None => net.push((
                key,
                leg.asset().clone(),
                signed,
                leg.avg_price() * leg.filled(),
                leg.filled(),
            )),
        }
    }

    net.into_iter()
        .filter(|(_, _, qty, ..)| !qty.is_zero())
        .map(|(key, asset, quantity, cost, gross)| Holding {
            key,
            asset,
            quantity,
            entry_price: cost / gross,
        })
        .collect()
}

/// Latest quotes for the assets a position holds.
#[derive(Debug, Default)]
pub struct Marks {
    quotes: HashMap<(InstrumentKey, AssetId), Quote>,
}

impl Marks {
    pub fn apply(&mut self, tick: &Tick, holdings: &[Holding]) {
        let key = tick.key();
        for holding in holdings.iter().filter(|h| h.key == key) {
            if let Some(quote) = tick.book.quote_for(&holding.asset) {
                self.quotes
                    .insert((key.clone(), holding.asset.clone()), quote.clone());
            }
        }
    }

    /// Price a holding could be closed at: the bid for longs, the ask for
    /// shorts. Falls back to the entry price when unquoted.
    #[must_use]
    pub fn exit_price(&self, holding: &Holding) -> Price {
        self.quotes
            .get(&(holding.key.clone(), holding.asset.clone()))
            .and_then(|q| q.touch(holding.closing_side()))
            .map_or(holding.entry_price, |level| level.price)
    }
}

/// Realized entry cash flow plus the closing value of every holding.
#[must_use]
pub fn mark_to_market(position: &Position, holdings: &[Holding], marks: &Marks) -> Price {
    let flows: Price = position.legs().iter().map(|l| l.cash_flow()).sum();
    let value: Price = holdings
        .iter()
        .map(|h| h.quantity * marks.exit_price(h))
        .sum();
    flows + value
}

/// First exit condition met, checked in order: holding time, take-profit,
/// stop-loss. P&L thresholds are fractions of the reserved capital.
///
/// Structural positions hold a complete outcome set whose payout is fixed at
/// settlement, so they only leave on resolution or the kill switch.
#[must_use]
pub fn exit_condition(
    config: &ExitConfig,
    position: &Position,
    pnl: Price,
    now: DateTime<Utc>,
) -> Option<ExitReason> {
    if position.strategy() == StrategyKind::Structural {
        return None;
    }

    let held = now - position.opened_at();
    if held.num_seconds() >= i64::try_from(config.max_hold_secs).unwrap_or(i64::MAX) {
        return Some(ExitReason::TimeLimit);
    }

    let basis = position.reserved();
    if basis <= Decimal::ZERO {
        return None;
    }
    if pnl >= config.take_profit * basis {
        return Some(ExitReason::TakeProfit);
    }
    if pnl <= -(config.stop_loss * basis) {
        return Some(ExitReason::StopLoss);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        InstrumentId, OpportunityId, PositionId, PositionLeg, ReservationId, StrategyKind, TickBook,
        VenueId,
    };
    use crate::testkit::domain::{binary_tick, key, quote, tick};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn filled_leg(venue: &str, asset: &str, side: Side, price: Decimal) -> PositionLeg {
        let mut leg = PositionLeg::new(
            VenueId::from(venue),
            InstrumentId::from("m1"),
            AssetId::from(asset),
            side,
            price,
            dec!(10),
        );
        leg.record_fill(dec!(10), price);
        leg
    }

    fn position(legs: Vec<PositionLeg>, reserved: Decimal) -> Position {
        position_for(StrategyKind::CrossVenue, legs, reserved)
    }

    fn position_for(strategy: StrategyKind, legs: Vec<PositionLeg>, reserved: Decimal) -> Position {
        Position::new(
            PositionId::new(1),
            OpportunityId::generate(),
            strategy,
            legs,
            ReservationId::new(1),
            reserved,
            Utc::now(),
        )
    }

    fn exit_config() -> ExitConfig {
        ExitConfig {
            take_profit: dec!(0.03),
            stop_loss: dec!(0.05),
            max_hold_secs: 60,
            monitor_interval_ms: 10,
        }
    }

    #[test]
    fn offsetting_legs_on_one_asset_net_to_nothing() {
        let pos = position(
            vec![
                filled_leg("pm", "m1-yes", Side::Buy, dec!(0.40)),
                filled_leg("pm", "m1-yes", Side::Sell, dec!(0.50)),
            ],
            dec!(9),
        );
        assert!(holdings(&pos).is_empty());
        assert_eq!(mark_to_market(&pos, &[], &Marks::default()), dec!(1.00));
    }

    #[test]
    fn cross_venue_legs_hold_long_and_short() {
        let pos = position(
            vec![
                filled_leg("pm", "m1-yes", Side::Buy, dec!(0.40)),
                filled_leg("pm2", "m1-yes", Side::Sell, dec!(0.49)),
            ],
            dec!(8.9),
        );
        let held = holdings(&pos);
        assert_eq!(held.len(), 2);
        assert_eq!(held[0].quantity, dec!(10));
        assert_eq!(held[0].closing_side(), Side::Sell);
        assert_eq!(held[1].quantity, dec!(-10));
        assert_eq!(held[1].closing_side(), Side::Buy);
    }

    #[test]
    fn marks_use_bid_for_longs() {
        let pos = position(
            vec![
                filled_leg("pm", "m1-yes", Side::Buy, dec!(0.45)),
                filled_leg("pm", "m1-no", Side::Buy, dec!(0.45)),
            ],
            dec!(9),
        );
        let held = holdings(&pos);
        let mut marks = Marks::default();
        // asks 0.50 / 0.50, bids 0.49 / 0.49
        marks.apply(&binary_tick("pm", "m1", dec!(0.50), dec!(0.50)), &held);

        assert_eq!(mark_to_market(&pos, &held, &marks), dec!(0.80));
    }

    #[test]
    fn unquoted_holdings_are_marked_at_entry() {
        let pos = position(vec![filled_leg("pm", "m1-yes", Side::Buy, dec!(0.45))], dec!(4.5));
        let held = holdings(&pos);
        let mut marks = Marks::default();
        marks.apply(
            &tick("pm", "m9", 1, TickBook::Spot(quote("m9", dec!(1), dec!(2)))),
            &held,
        );
        assert_eq!(mark_to_market(&pos, &held, &marks), Decimal::ZERO);
        assert_eq!(held[0].key, key("pm", "m1"));
    }

    #[test]
    fn exit_conditions_in_order() {
        let cfg = exit_config();
        let pos = position(vec![filled_leg("pm", "m1-yes", Side::Buy, dec!(0.5))], dec!(100));
        let now = pos.opened_at();

        assert_eq!(exit_condition(&cfg, &pos, dec!(0), now), None);
        assert_eq!(exit_condition(&cfg, &pos, dec!(3), now), Some(ExitReason::TakeProfit));
        assert_eq!(exit_condition(&cfg, &pos, dec!(-5), now), Some(ExitReason::StopLoss));
        assert_eq!(
            exit_condition(&cfg, &pos, dec!(3), now + Duration::seconds(60)),
            Some(ExitReason::TimeLimit)
        );
    }

    #[test]
    fn structural_positions_wait_for_settlement() {
        let cfg = exit_config();
        let pos = position_for(
            StrategyKind::Structural,
            vec![
                filled_leg("pm", "m1-yes", Side::Buy, dec!(0.45)),
                filled_leg("pm", "m1-no", Side::Buy, dec!(0.45)),
            ],
            dec!(9),
        );
        let later = pos.opened_at() + Duration::days(30);

        assert_eq!(exit_condition(&cfg, &pos, dec!(-5), pos.opened_at()), None);
        assert_eq!(exit_condition(&cfg, &pos, dec!(5), later), None);
    }
}

//! Paper order gateway for dry runs.
//!
//! Orders fill only against the latest quotes the engine has accepted for
//! the venue. A limit order fills at the touch when the touch is at or
//! better than the limit, up to the quoted size; the size it takes is
//! removed from the stored quote until the next tick replaces it. Anything
//! left rests and is retried on every status poll.
//!
//! An order is forgotten once an ack reporting its final state has been
//! returned.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{AssetId, InstrumentId, OrderId, Quote, Side, Tick, VenueId};
use crate::error::{ExecutionError, Result};
use crate::exchange::{CancelAck, OrderAck, OrderGateway, OrderRequest, OrderStatus};

#[derive(Debug)]
struct PaperOrder {
    request: OrderRequest,
    ack: OrderAck,
}

/// Simulated gateway that never leaves the process.
#[derive(Debug)]
pub struct PaperGateway {
    venue: VenueId,
    quotes: DashMap<(InstrumentId, AssetId), Quote>,
    orders: DashMap<OrderId, PaperOrder>,
    next_id: AtomicU64,
}

impl PaperGateway {
    #[must_use]
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            quotes: DashMap::new(),
            orders: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record the quotes of an accepted tick. Ticks for other venues are
    /// ignored.
    pub fn observe(&self, tick: &Tick) {
        if tick.venue != self.venue {
            return;
        }
        for quote in tick.book.quotes() {
            self.quotes
                .insert((tick.instrument.clone(), quote.asset.clone()), quote.clone());
        }
    }

    /// Number of orders not yet in a final state.
    #[must_use]
    pub fn resting(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| !o.ack.status.is_final())
            .count()
    }

    fn try_fill(&self, order: &mut PaperOrder) {
        if order.ack.status.is_final() {
            return;
        }
        let request = &order.request;
        let key = (request.instrument.clone(), request.asset.clone());
        let Some(mut quote) = self.quotes.get_mut(&key) else {
            return;
        };

        let touch = match request.side {
            Side::Buy => quote.ask.as_mut(),
            Side::Sell => quote.bid.as_mut(),
        };
        let Some(touch) = touch else {
            return;
        };
        let crosses = match request.side {
            Side::Buy => touch.price <= request.price,
            Side::Sell => touch.price >= request.price,
        };
        if !crosses || touch.size <= Decimal::ZERO {
            return;
        }

        let remaining = request.size - order.ack.filled;
        let quantity = remaining.min(touch.size);
        touch.size -= quantity;

        let filled = order.ack.filled + quantity;
        order.ack.avg_price =
            (order.ack.avg_price * order.ack.filled + touch.price * quantity) / filled;
        order.ack.filled = filled;
        order.ack.status = if filled >= request.size {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        debug!(
            venue = %self.venue,
            order_id = %order.ack.order_id,
            %quantity,
            price = %touch.price,
            status = ?order.ack.status,
            "Paper fill"
        );
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let order_id = OrderId::new(format!("paper-{id}"));

        let mut paper = PaperOrder {
            request: order.clone(),
            ack: OrderAck::open(order_id.clone()),
        };
        if order.size <= Decimal::ZERO || order.price <= Decimal::ZERO {
            paper.ack.status = OrderStatus::Rejected;
        } else {
            self.try_fill(&mut paper);
        }

        let ack = paper.ack.clone();
        if !ack.status.is_final() {
            self.orders.insert(order_id, paper);
        }
        Ok(ack)
    }

    async fn order_status(&self, order_id: &OrderId) -> Result<OrderAck> {
        let ack = {
            let mut order = self
                .orders
                .get_mut(order_id)
                .ok_or_else(|| ExecutionError::UnknownOrder {
                    order_id: order_id.to_string(),
                })?;
            self.try_fill(&mut order);
            order.ack.clone()
        };
        if ack.status.is_final() {
            self.orders.remove(order_id);
        }
        Ok(ack)
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<CancelAck> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder {
                order_id: order_id.to_string(),
            })?;
        let cancelled = !order.ack.status.is_final();
        if cancelled {
            order.ack.status = OrderStatus::Cancelled;
        }
        Ok(CancelAck {
            order_id: order_id.clone(),
            cancelled,
        })
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TickBook;
    use crate::testkit::domain::{binary_tick, quote, spot_tick_with, tick};
    use rust_decimal_macros::dec;

    fn order(asset: &str, side: Side, price: Decimal, size: Decimal) -> OrderRequest {
        OrderRequest {
            client_id: "1-0-entry".into(),
            venue: "pm".into(),
            instrument: "m1".into(),
            asset: asset.into(),
            side,
            price,
            size,
        }
    }

    #[tokio::test]
    async fn nothing_fills_without_a_quote() {
        let gateway = PaperGateway::new("pm".into());
        let ack = gateway
            .submit(&order("m1-yes", Side::Buy, dec!(0.5), dec!(10)))
            .await
            .unwrap();
        assert_eq!(ack.status, OrderStatus::Open);
        assert_eq!(gateway.resting(), 1);
    }

    #[tokio::test]
    async fn fills_at_the_touch_when_limit_crosses() {
        let gateway = PaperGateway::new("pm".into());
        gateway.observe(&binary_tick("pm", "m1", dec!(0.45), dec!(0.50)));

        let ack = gateway
            .submit(&order("m1-yes", Side::Buy, dec!(0.47), dec!(10)))
            .await
            .unwrap();
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.avg_price, dec!(0.45));
        assert_eq!(ack.filled, dec!(10));
    }

    #[tokio::test]
    async fn limit_away_from_touch_rests_until_the_market_moves() {
        let gateway = PaperGateway::new("pm".into());
        gateway.observe(&binary_tick("pm", "m1", dec!(0.45), dec!(0.50)));

        let ack = gateway
            .submit(&order("m1-yes", Side::Buy, dec!(0.40), dec!(10)))
            .await
            .unwrap();
        assert_eq!(ack.status, OrderStatus::Open);

        let book = TickBook::Binary {
            yes: quote("m1-yes", dec!(0.37), dec!(0.39)),
            no: quote("m1-no", dec!(0.55), dec!(0.60)),
        };
        gateway.observe(&tick("pm", "m1", 2, book));
        let ack = gateway.order_status(&ack.order_id).await.unwrap();
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.avg_price, dec!(0.39));
    }

    #[tokio::test]
    async fn quoted_size_is_consumed() {
        let gateway = PaperGateway::new("bn".into());
        let mut tick = spot_tick_with("bn", "BTC", 1, dec!(100), dec!(101));
        if let TickBook::Spot(quote) = &mut tick.book {
            quote.bid = quote.bid.map(|l| crate::domain::Level::new(l.price, dec!(3)));
        }
        gateway.observe(&tick);

        let mut sell = order("BTC", Side::Sell, dec!(99), dec!(5));
        sell.venue = "bn".into();
        sell.instrument = "BTC".into();
        let first = gateway.submit(&sell).await.unwrap();
        assert_eq!(first.status, OrderStatus::PartiallyFilled);
        assert_eq!(first.filled, dec!(3));

        let second = gateway.submit(&sell).await.unwrap();
        assert_eq!(second.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn cancel_only_affects_live_orders() {
        let gateway = PaperGateway::new("pm".into());
        let ack = gateway
            .submit(&order("m1-yes", Side::Buy, dec!(0.5), dec!(1)))
            .await
            .unwrap();
        assert!(gateway.cancel(&ack.order_id).await.unwrap().cancelled);
        assert!(!gateway.cancel(&ack.order_id).await.unwrap().cancelled);
        assert_eq!(
            gateway.order_status(&ack.order_id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn reported_final_orders_are_forgotten() {
        let gateway = PaperGateway::new("pm".into());
        gateway.observe(&binary_tick("pm", "m1", dec!(0.45), dec!(0.50)));

        let filled = gateway
            .submit(&order("m1-yes", Side::Buy, dec!(0.47), dec!(1)))
            .await
            .unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);

        let resting = gateway
            .submit(&order("m1-yes", Side::Buy, dec!(0.10), dec!(1)))
            .await
            .unwrap();
        assert_eq!(gateway.orders.len(), 1);

        gateway.cancel(&resting.order_id).await.unwrap();
        let last = gateway.order_status(&resting.order_id).await.unwrap();
        assert_eq!(last.status, OrderStatus::Cancelled);
        assert!(gateway.orders.is_empty());
        assert!(gateway.order_status(&resting.order_id).await.is_err());
    }

    #[tokio::test]
    async fn unknown_orders_and_other_venues() {
        let gateway = PaperGateway::new("pm".into());
        gateway.observe(&binary_tick("other", "m1", dec!(0.45), dec!(0.50)));
        let ack = gateway
            .submit(&order("m1-yes", Side::Buy, dec!(0.99), dec!(1)))
            .await
            .unwrap();
        assert_eq!(ack.status, OrderStatus::Open);
        assert!(gateway.order_status(&OrderId::from("nope")).await.is_err());
    }
}

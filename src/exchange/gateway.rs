//! Order gateway port.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AssetId, InstrumentId, OrderId, Price, Side, VenueId, Volume};
use crate::error::Result;

/// A limit order to place on a venue.
///
/// `client_id` is stable across retries of the same logical order so the
/// venue (or gateway) can deduplicate resubmissions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub client_id: String,
    pub venue: VenueId,
    pub instrument: InstrumentId,
    pub asset: AssetId,
    pub side: Side,
    pub price: Price,
    pub size: Volume,
}

impl OrderRequest {
    /// Notional value of the order.
    #[must_use]
    pub fn notional(&self) -> Price {
        self.price * self.size
    }
}

/// Venue-reported order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting, nothing filled yet.
    Open,
    /// Some quantity filled, remainder resting.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled before filling completely.
    Cancelled,
    /// Refused by the venue.
    Rejected,
}

impl OrderStatus {
    /// True when the order can no longer change.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

/// Acknowledgment of an order submission or status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled: Volume,
    /// Average price of the filled quantity.
    pub avg_price: Price,
}

impl OrderAck {
    /// An acknowledgment for a resting order with no fills.
    pub fn open(order_id: impl Into<OrderId>) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Open,
            filled: Decimal::ZERO,
            avg_price: Decimal::ZERO,
        }
    }
}

/// Acknowledgment of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub order_id: OrderId,
    /// False when the order had already reached a final state.
    pub cancelled: bool,
}

/// Places and tracks orders on one venue.
///
/// Fills are only ever learned from venue acknowledgments; nothing in the
/// engine assumes an order filled because it was sent.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a limit order.
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck>;

    /// Query the current state of an order.
    async fn order_status(&self, order_id: &OrderId) -> Result<OrderAck>;

    /// Request cancellation of an order.
    async fn cancel(&self, order_id: &OrderId) -> Result<CancelAck>;

    /// Venue this gateway trades on.
    fn venue(&self) -> &VenueId;
}

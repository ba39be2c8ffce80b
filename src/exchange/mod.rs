//! Exchange abstraction layer.
//!
//! Defines the two ports every venue adapter implements: a streaming
//! market-data feed and an order gateway. The engine only talks to venues
//! through these traits.

mod feed;
mod gateway;

pub use feed::{FeedEvent, MarketDataFeed};
pub use gateway::{CancelAck, OrderAck, OrderGateway, OrderRequest, OrderStatus};

//! Polymarket market channel integration.

mod feed;
pub mod message;

pub use feed::PolymarketFeed;

//! Scripted [`OrderGateway`] for execution tests.
//!
//! Orders are matched to a [`Fill`] script by (asset, side), then by asset,
//! then by the gateway default. Fills are reported on the first status query
//! after submission, so the coordinator's polling path is always exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::{AssetId, OrderId, Price, Side, VenueId, Volume};
use crate::error::{Error, ExecutionError, Result};
use crate::exchange::{CancelAck, OrderAck, OrderGateway, OrderRequest, OrderStatus};

/// How the gateway treats an order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    /// Fill completely at the limit price.
    Full,
    /// Fill completely at the given price.
    At(Price),
    /// Fill this quantity and leave the rest resting.
    Partial(Volume),
    /// Rest forever.
    Rest,
    /// Acknowledge with `Rejected`.
    Reject,
    /// Fail the first `n` submissions with a transient error, then fill.
    Transient(u32),
    /// Fail every submission with a non-transient error.
    Refuse,
}

struct Order {
    request: OrderRequest,
    fill: Fill,
    ack: OrderAck,
}

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    attempts: HashMap<String, u32>,
    submitted: Vec<OrderRequest>,
    cancelled: Vec<OrderId>,
}

pub struct ScriptedGateway {
    venue: VenueId,
    default: Fill,
    scripts: HashMap<(AssetId, Option<Side>), Fill>,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl ScriptedGateway {
    /// A gateway that fills everything at the limit price.
    pub fn new(venue: &str) -> Self {
        Self {
            venue: VenueId::from(venue),
            default: Fill::Full,
            scripts: HashMap::new(),
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_default(mut self, fill: Fill) -> Self {
        self.default = fill;
        self
    }

    /// Script every order on `asset`.
    pub fn script(mut self, asset: &str, fill: Fill) -> Self {
        self.scripts.insert((AssetId::from(asset), None), fill);
        self
    }

    /// Script orders on `asset` and `side` only.
    pub fn script_side(mut self, asset: &str, side: Side, fill: Fill) -> Self {
        self.scripts.insert((AssetId::from(asset), Some(side)), fill);
        self
    }

    /// Every submission attempt, in order.
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.state.lock().submitted.clone()
    }

    /// Orders a cancel was requested for.
    pub fn cancelled(&self) -> Vec<OrderId> {
        self.state.lock().cancelled.clone()
    }

    fn fill_for(&self, order: &OrderRequest) -> Fill {
        self.scripts
            .get(&(order.asset.clone(), Some(order.side)))
            .or_else(|| self.scripts.get(&(order.asset.clone(), None)))
            .copied()
            .unwrap_or(self.default)
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck> {
        let fill = self.fill_for(order);
        let mut state = self.state.lock();
        state.submitted.push(order.clone());

        match fill {
            Fill::Refuse => {
                return Err(ExecutionError::OrderRejected("scripted refusal".into()).into())
            }
            Fill::Transient(n) => {
                let attempts = state.attempts.entry(order.client_id.clone()).or_insert(0);
                *attempts += 1;
                if *attempts <= n {
                    return Err(Error::Connection("scripted outage".into()));
                }
            }
            _ => {}
        }

        let id = OrderId::new(format!("{}-{}", self.venue, self.next_id.fetch_add(1, Ordering::SeqCst)));
        let mut ack = OrderAck::open(id.clone());
        if fill == Fill::Reject {
            ack.status = OrderStatus::Rejected;
        }
        state.orders.insert(
            id,
            Order {
                request: order.clone(),
                fill,
                ack: ack.clone(),
            },
        );
        Ok(ack)
    }

    async fn order_status(&self, order_id: &OrderId) -> Result<OrderAck> {
        let mut state = self.state.lock();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder {
                order_id: order_id.to_string(),
            })?;

        if !order.ack.status.is_final() {
            let size = order.request.size;
            let (filled, price) = match order.fill {
                Fill::Full | Fill::Transient(_) => (size, order.request.price),
                Fill::At(price) => (size, price),
                Fill::Partial(qty) => (qty.min(size), order.request.price),
                Fill::Rest | Fill::Reject | Fill::Refuse => (Decimal::ZERO, Decimal::ZERO),
            };
            if filled > Decimal::ZERO {
                order.ack.filled = filled;
                order.ack.avg_price = price;
                order.ack.status = if filled >= size {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
            }
        }
        Ok(order.ack.clone())
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<CancelAck> {
        let mut state = self.state.lock();
        state.cancelled.push(order_id.clone());
        let order = state
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

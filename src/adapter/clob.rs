//! CLOB REST order gateway.
//!
//! Orders are limit orders placed with `POST /order`, polled with
//! `GET /order/{id}` and cancelled with `DELETE /order/{id}`. Every request
//! carries the API-key headers; payload signing is left to the venue proxy.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::{ApiCredentials, VenueConfig};
use crate::domain::{OrderId, Side, VenueId};
use crate::error::{ConfigError, ExecutionError, Result};
use crate::exchange::{CancelAck, OrderAck, OrderGateway, OrderRequest, OrderStatus};

const API_KEY_HEADER: &str = "X-API-KEY";
const API_SECRET_HEADER: &str = "X-API-SECRET";
const API_PASSPHRASE_HEADER: &str = "X-API-PASSPHRASE";

#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    client_order_id: &'a str,
    market: &'a str,
    asset_id: &'a str,
    side: &'static str,
    price: String,
    size: String,
    order_type: &'static str,
}

impl<'a> PlaceOrderBody<'a> {
    fn from_request(order: &'a OrderRequest) -> Self {
        Self {
            client_order_id: &order.client_id,
            market: order.instrument.as_str(),
            asset_id: order.asset.as_str(),
            side: match order.side {
                Side::Buy => "BUY",
                Side::Sell => "SELL",
            },
            price: order.price.normalize().to_string(),
            size: order.size.normalize().to_string(),
            order_type: "GTC",
        }
    }
}

/// Order state as reported by the venue.
#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(alias = "orderID", alias = "id")]
    order_id: String,
    status: String,
    #[serde(default)]
    size_matched: Option<Decimal>,
    #[serde(default)]
    avg_price: Option<Decimal>,
    /// Order price, reported by some endpoints instead of `avg_price`.
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default, alias = "errorMsg")]
    error_msg: Option<String>,
}

impl OrderResponse {
    /// Convert to an ack. A fill is priced at `avg_price`, then the reported
    /// order price, then `limit`; a fill with no usable price is an error.
    fn into_ack(self, limit: Option<Decimal>) -> Result<OrderAck> {
        let status = parse_status(&self.status).ok_or_else(|| {
            ExecutionError::SubmissionFailed(format!("unknown order status '{}'", self.status))
        })?;
        if status == OrderStatus::Rejected {
            if let Some(msg) = self.error_msg.as_deref().filter(|m| !m.is_empty()) {
                debug!(order_id = %self.order_id, reason = msg, "Venue rejected order");
            }
        }

        let filled = self.size_matched.unwrap_or(Decimal::ZERO);
        let avg_price = if filled > Decimal::ZERO {
            [self.avg_price, self.price, limit]
                .into_iter()
                .flatten()
                .find(|p| *p > Decimal::ZERO)
                .ok_or_else(|| {
                    ExecutionError::SubmissionFailed(format!(
                        "order {} matched {filled} without a fill price",
                        self.order_id
                    ))
                })?
        } else {
            Decimal::ZERO
        };

        Ok(OrderAck {
            order_id: OrderId::new(self.order_id),
            status,
            filled,
            avg_price,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    #[serde(default)]
    canceled: Vec<String>,
}

/// Map venue status strings onto [`OrderStatus`].
fn parse_status(raw: &str) -> Option<OrderStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "open" | "live" | "unmatched" | "delayed" => Some(OrderStatus::Open),
        "partially_filled" | "partially_matched" => Some(OrderStatus::PartiallyFilled),
        "filled" | "matched" | "mined" | "confirmed" => Some(OrderStatus::Filled),
        "cancelled" | "canceled" | "expired" => Some(OrderStatus::Cancelled),
        "rejected" | "failed" => Some(OrderStatus::Rejected),
        _ => None,
    }
}

/// REST gateway for a CLOB venue.
pub struct ClobGateway {
    venue: VenueId,
    client: Client,
    base_url: String,
    /// Limit price of each working order, the last fallback for fill prices.
    limits: DashMap<OrderId, Decimal>,
}

impl std::fmt::Debug for ClobGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobGateway")
            .field("venue", &self.venue)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ClobGateway {
    /// Build a gateway for `venue`.
    ///
    /// # Errors
    ///
    /// Fails if the venue has no `api_url`, credentials are missing, or a
    /// credential is not a valid header value.
    pub fn new(venue: &VenueConfig, credentials: Option<&ApiCredentials>) -> Result<Self> {
        let base_url = venue
            .api_url
            .as_deref()
            .ok_or(ConfigError::MissingField {
                field: "venues.api_url",
            })?
            .trim_end_matches('/')
            .to_string();
        let credentials = credentials.ok_or(ConfigError::MissingField {
            field: "PLUTUS_API_KEY",
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in [
            (API_KEY_HEADER, &credentials.api_key),
            (API_SECRET_HEADER, &credentials.api_secret),
            (API_PASSPHRASE_HEADER, &credentials.passphrase),
        ] {
            let mut value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidValue {
                field: "PLUTUS_API_*",
                reason: e.to_string(),
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(venue.request_timeout_ms))
            .build()?;

        info!(venue = %venue.id, url = %base_url, "CLOB gateway ready");
        Ok(Self {
            venue: venue.id.clone(),
            client,
            base_url,
            limits: DashMap::new(),
        })
    }

    fn order_url(&self, order_id: &OrderId) -> String {
        format!("{}/order/{}", self.base_url, order_id)
    }

    /// Turn an HTTP failure into an execution error. Server-side and
    /// throttling failures are retryable; other client errors are not.
    async fn check(response: Response, order_id: Option<&OrderId>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body = %body, "CLOB request failed");

        let err = if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            ExecutionError::SubmissionFailed(format!("{status}: {body}"))
        } else if status == StatusCode::NOT_FOUND {
            ExecutionError::UnknownOrder {
                order_id: order_id.map(ToString::to_string).unwrap_or_default(),
            }
        } else {
            ExecutionError::OrderRejected(format!("{status}: {body}"))
        };
        Err(err.into())
    }
}

#[async_trait]
impl OrderGateway for ClobGateway {
    async fn submit(&self, order: &OrderRequest) -> Result<OrderAck> {
        let body = PlaceOrderBody::from_request(order);
        debug!(
            venue = %self.venue,
            client_id = %order.client_id,
            side = %order.side,
            price = %order.price,
            size = %order.size,
            "Placing order"
        );
        let response = self
            .client
            .post(format!("{}/order", self.base_url))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, None).await?;
        let ack = response.json::<OrderResponse>().await?.into_ack(Some(order.price))?;
        if !ack.status.is_final() {
            self.limits.insert(ack.order_id.clone(), order.price);
        }
        Ok(ack)
    }

    async fn order_status(&self, order_id: &OrderId) -> Result<OrderAck> {
        let response = self.client.get(self.order_url(order_id)).send().await?;
        let response = Self::check(response, Some(order_id)).await?;
        let limit = self.limits.get(order_id).map(|entry| *entry.value());
        let ack = response.json::<OrderResponse>().await?.into_ack(limit)?;
        if ack.status.is_final() {
            self.limits.remove(order_id);
        }
        Ok(ack)
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<CancelAck> {
        let response = self.client.delete(self.order_url(order_id)).send().await?;
        let response = Self::check(response, Some(order_id)).await?;
        let body: CancelResponse = response.json().await?;
        Ok(CancelAck {
            order_id: order_id.clone(),
            cancelled: body.canceled.iter().any(|id| id == order_id.as_str()),
        })
    }

    fn venue(&self) -> &VenueId {
        &self.venue
    }
}

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{PositionId, ReservationId, VenueId};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// Market data feed errors.
///
/// A feed error degrades the venue; it is never fatal to the process.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed for venue {venue} degraded: {reason}")]
    Degraded { venue: VenueId, reason: String },

    #[error("feed for venue {venue} is not connected")]
    NotConnected { venue: VenueId },

    #[error("malformed message from {venue}: {reason}")]
    Malformed { venue: VenueId, reason: String },
}

/// Execution-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("no order gateway registered for venue {0}")]
    NoGateway(VenueId),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("failed to submit order: {0}")]
    SubmissionFailed(String),

    #[error("order {order_id} not found")]
    UnknownOrder { order_id: String },

    #[error("opportunity {0} expired before execution")]
    StaleOpportunity(String),

    #[error("legs of {position_id} not filled within {timeout_ms}ms")]
    LegFillTimeout {
        position_id: PositionId,
        timeout_ms: u64,
    },

    #[error("submission cancelled: {0}")]
    Cancelled(String),

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("illegal transition for {position_id}: {from} -> {to}")]
    IllegalTransition {
        position_id: PositionId,
        from: &'static str,
        to: &'static str,
    },
}

/// Ledger errors.
///
/// `InvariantViolation` is fatal: it means capital accounting is broken and
/// trading must halt. The other variants are ordinary refusals.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient capital: requested {requested}, available {available}")]
    InsufficientCapital {
        requested: Decimal,
        available: Decimal,
    },

    #[error("reservation amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("unknown reservation {0}")]
    UnknownReservation(ReservationId),

    #[error("reservation {reservation_id} belongs to {owner}, not {position_id}")]
    ReservationOwnerMismatch {
        reservation_id: ReservationId,
        owner: PositionId,
        position_id: PositionId,
    },

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("ledger halted after invariant violation: {0}")]
    Halted(String),

    #[error("audit sink failure: {0}")]
    Sink(String),
}

impl LedgerError {
    /// Returns true if this error must halt all trading.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_) | Self::Halted(_))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Risk(#[from] crate::risk::Rejection),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Returns true if this error must halt the engine.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_fatal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        Error::Database(err.to_string())
    }
}

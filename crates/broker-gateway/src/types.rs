use chrono::{DateTime, Utc};
use market_core::{FillMode, Side};
use serde::{Deserialize, Serialize};

/// Kind of entry order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    PendingLimit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::PendingLimit => "pending_limit",
        }
    }
}

/// A fully-specified broker order request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub volume: f64,
    pub price: f64,
    pub sl: f64,
    pub tp: f64,
    pub fill_mode: FillMode,
    pub comment: String,
}

/// Terminal / retriable classification of an order submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    /// Broker does not support the requested fill mode; fallback chain applies
    FillModeError,
    /// Null/timeout response; bounded retry applies
    TransientError,
    /// Terminal non-DONE retcode; no retry
    Rejected,
}

/// Result of one `order_send` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub status: OrderStatus,
    pub ticket: Option<u64>,
    pub retcode: Option<i32>,
    pub comment: Option<String>,
    /// Actual execution price, when the broker reports one
    pub price: Option<f64>,
}

impl OrderResult {
    pub fn filled(ticket: u64, price: f64) -> Self {
        Self {
            status: OrderStatus::Filled,
            ticket: Some(ticket),
            retcode: Some(super::retcode::RETCODE_DONE),
            comment: None,
            price: Some(price),
        }
    }
}

/// An open position as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub sl: f64,
    pub tp: f64,
    pub open_time: DateTime<Utc>,
    pub current_price: f64,
    /// Unrealized profit in account currency
    pub profit: f64,
}

/// A closed deal from broker history. Consumed by the history learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealRecord {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub profit: f64,
    pub closed_at: DateTime<Utc>,
}

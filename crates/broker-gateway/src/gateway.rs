use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_core::{Bar, PipelineResult, SymbolInfo, TickQuote, Timeframe};

use crate::types::{BrokerPosition, DealRecord, OrderRequest, OrderResult};

/// Adapter over the native broker terminal API.
///
/// The gateway is the only side-effecting collaborator in the pipeline.
/// All calls are awaited sequentially from a single task; implementations
/// are not required to support concurrent order submission.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Open a session to the broker terminal.
    async fn connect(&self) -> PipelineResult<()>;

    /// Close the session. Called once on shutdown.
    async fn shutdown(&self) -> PipelineResult<()>;

    /// All tradable symbols. Order is not significant.
    async fn symbols_all(&self) -> PipelineResult<Vec<SymbolInfo>>;

    /// Broker-declared properties for one symbol.
    async fn symbol_info(&self, symbol: &str) -> PipelineResult<SymbolInfo>;

    /// `count` bars ordered oldest to newest. Fails with `DataUnavailable`
    /// when the broker cannot deliver the full window.
    async fn ohlc(&self, symbol: &str, timeframe: Timeframe, count: usize)
        -> PipelineResult<Vec<Bar>>;

    /// Current bid/ask. Fails with `DataUnavailable` when the last update
    /// is older than the staleness bound.
    async fn tick(&self, symbol: &str) -> PipelineResult<TickQuote>;

    /// Open positions, broker-authoritative.
    async fn positions_open(&self) -> PipelineResult<Vec<BrokerPosition>>;

    /// Closed deals since `from`, oldest first.
    async fn deals_since(&self, from: DateTime<Utc>) -> PipelineResult<Vec<DealRecord>>;

    /// Submit an order synchronously. Retcodes are pre-classified into
    /// `OrderResult::status`; a null/timeout response surfaces as
    /// `TransientError`, never as `Rejected`.
    async fn order_send(&self, request: &OrderRequest) -> PipelineResult<OrderResult>;

    /// Modify SL/TP of an open position.
    async fn order_modify(&self, ticket: u64, sl: f64, tp: f64) -> PipelineResult<()>;

    /// Close an open position at market.
    async fn position_close(&self, ticket: u64) -> PipelineResult<()>;
}

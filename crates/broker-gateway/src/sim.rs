//! In-memory simulated gateway.
//!
//! Backs paper mode and the pipeline tests: quotes, bar history and order
//! responses are scripted or synthesized, and every side effect (orders
//! sent, SL/TP modifications, closes) is recorded for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use market_core::{Bar, PipelineError, PipelineResult, SymbolInfo, TickQuote, Timeframe};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::gateway::BrokerGateway;
use crate::retcode::RETCODE_DONE;
use crate::types::{BrokerPosition, DealRecord, OrderRequest, OrderResult, OrderStatus};

#[derive(Default)]
struct Inner {
    symbols: HashMap<String, SymbolInfo>,
    bars: HashMap<String, Vec<Bar>>,
    ticks: HashMap<String, TickQuote>,
    positions: HashMap<u64, BrokerPosition>,
    deals: Vec<DealRecord>,
    /// Queued responses for upcoming `order_send` calls (FIFO). When empty,
    /// orders fill at the requested price.
    scripted_results: VecDeque<OrderResult>,
    sent_orders: Vec<OrderRequest>,
    modifications: Vec<(u64, f64, f64)>,
    closed_tickets: Vec<u64>,
    fail_connect: bool,
    fail_modify: bool,
    fail_close: bool,
    next_ticket: u64,
}

pub struct SimGateway {
    inner: Mutex<Inner>,
}

impl Default for SimGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_ticket: 1000,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The pipeline is single-tasked; poisoning can only come from a
        // panicking test, where propagating the panic is fine.
        self.inner.lock().unwrap()
    }

    pub fn add_symbol(&self, info: SymbolInfo) {
        self.lock().symbols.insert(info.name.clone(), info);
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        self.lock().bars.insert(symbol.to_string(), bars);
    }

    pub fn set_tick(&self, symbol: &str, tick: TickQuote) {
        self.lock().ticks.insert(symbol.to_string(), tick);
    }

    pub fn set_deals(&self, deals: Vec<DealRecord>) {
        self.lock().deals = deals;
    }

    /// Queue the response for the next `order_send` call.
    pub fn push_order_result(&self, result: OrderResult) {
        self.lock().scripted_results.push_back(result);
    }

    pub fn open_position(&self, position: BrokerPosition) {
        self.lock().positions.insert(position.ticket, position);
    }

    pub fn set_position_profit(&self, ticket: u64, profit: f64, current_price: f64) {
        if let Some(pos) = self.lock().positions.get_mut(&ticket) {
            pos.profit = profit;
            pos.current_price = current_price;
        }
    }

    pub fn remove_position(&self, ticket: u64) {
        self.lock().positions.remove(&ticket);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_modify(&self, fail: bool) {
        self.lock().fail_modify = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.lock().fail_close = fail;
    }

    pub fn sent_orders(&self) -> Vec<OrderRequest> {
        self.lock().sent_orders.clone()
    }

    pub fn modifications(&self) -> Vec<(u64, f64, f64)> {
        self.lock().modifications.clone()
    }

    pub fn closed_tickets(&self) -> Vec<u64> {
        self.lock().closed_tickets.clone()
    }

    pub fn position(&self, ticket: u64) -> Option<BrokerPosition> {
        self.lock().positions.get(&ticket).cloned()
    }

    /// Seed a symbol with a random-walk M5 history and a live tick so the
    /// agent can run in paper mode without a terminal attached.
    pub fn seed_random_walk(&self, info: SymbolInfo, count: usize, start_price: f64, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = start_price;
        let now = Utc::now();
        let mut bars = Vec::with_capacity(count);
        for i in 0..count {
            let open = price;
            let drift: f64 = rng.gen_range(-0.004..0.004);
            let close = (open * (1.0 + drift)).max(info.point);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002));
            bars.push(Bar {
                time: now - Duration::minutes(5 * (count - i) as i64),
                open,
                high,
                low,
                close,
                tick_volume: rng.gen_range(50..500),
            });
            price = close;
        }
        let spread = info.point * 10.0;
        let tick = TickQuote {
            bid: price,
            ask: price + spread,
            time: now,
        };
        let name = info.name.clone();
        self.add_symbol(info);
        self.set_bars(&name, bars);
        self.set_tick(&name, tick);
    }
}

#[async_trait]
impl BrokerGateway for SimGateway {
    async fn connect(&self) -> PipelineResult<()> {
        if self.lock().fail_connect {
            return Err(PipelineError::BrokerConnect(
                "terminal unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn shutdown(&self) -> PipelineResult<()> {
        Ok(())
    }

    async fn symbols_all(&self) -> PipelineResult<Vec<SymbolInfo>> {
        Ok(self.lock().symbols.values().cloned().collect())
    }

    async fn symbol_info(&self, symbol: &str) -> PipelineResult<SymbolInfo> {
        self.lock()
            .symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| PipelineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            })
    }

    async fn ohlc(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> PipelineResult<Vec<Bar>> {
        let inner = self.lock();
        let bars = inner
            .bars
            .get(symbol)
            .ok_or_else(|| PipelineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no bar history".to_string(),
            })?;
        if bars.len() < count {
            return Err(PipelineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("only {} of {} bars available", bars.len(), count),
            });
        }
        Ok(bars[bars.len() - count..].to_vec())
    }

    async fn tick(&self, symbol: &str) -> PipelineResult<TickQuote> {
        self.lock()
            .ticks
            .get(symbol)
            .cloned()
            .ok_or_else(|| PipelineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no quote".to_string(),
            })
    }

    async fn positions_open(&self) -> PipelineResult<Vec<BrokerPosition>> {
        Ok(self.lock().positions.values().cloned().collect())
    }

    async fn deals_since(&self, from: DateTime<Utc>) -> PipelineResult<Vec<DealRecord>> {
        let mut deals: Vec<DealRecord> = self
            .lock()
            .deals
            .iter()
            .filter(|d| d.closed_at >= from)
            .cloned()
            .collect();
        deals.sort_by_key(|d| d.closed_at);
        Ok(deals)
    }

    async fn order_send(&self, request: &OrderRequest) -> PipelineResult<OrderResult> {
        let mut inner = self.lock();
        inner.sent_orders.push(request.clone());

        let result = match inner.scripted_results.pop_front() {
            Some(mut scripted) => {
                if scripted.status == OrderStatus::Filled && scripted.ticket.is_none() {
                    inner.next_ticket += 1;
                    scripted.ticket = Some(inner.next_ticket);
                }
                scripted
            }
            None => {
                inner.next_ticket += 1;
                OrderResult {
                    status: OrderStatus::Filled,
                    ticket: Some(inner.next_ticket),
                    retcode: Some(RETCODE_DONE),
                    comment: None,
                    price: Some(request.price),
                }
            }
        };

        if result.status == OrderStatus::Filled {
            if let Some(ticket) = result.ticket {
                let price = result.price.unwrap_or(request.price);
                inner.positions.insert(
                    ticket,
                    BrokerPosition {
                        ticket,
                        symbol: request.symbol.clone(),
                        side: request.side,
                        volume: request.volume,
                        entry_price: price,
                        sl: request.sl,
                        tp: request.tp,
                        open_time: Utc::now(),
                        current_price: price,
                        profit: 0.0,
                    },
                );
            }
        }

        Ok(result)
    }

    async fn order_modify(&self, ticket: u64, sl: f64, tp: f64) -> PipelineResult<()> {
        let mut inner = self.lock();
        if inner.fail_modify {
            return Err(PipelineError::Supervision {
                ticket,
                reason: "modify refused".to_string(),
            });
        }
        match inner.positions.get_mut(&ticket) {
            Some(pos) => {
                pos.sl = sl;
                pos.tp = tp;
                inner.modifications.push((ticket, sl, tp));
                Ok(())
            }
            None => Err(PipelineError::Supervision {
                ticket,
                reason: "unknown ticket".to_string(),
            }),
        }
    }

    async fn position_close(&self, ticket: u64) -> PipelineResult<()> {
        let mut inner = self.lock();
        if inner.fail_close {
            return Err(PipelineError::Supervision {
                ticket,
                reason: "close refused".to_string(),
            });
        }
        match inner.positions.remove(&ticket) {
            Some(pos) => {
                inner.closed_tickets.push(ticket);
                inner.deals.push(DealRecord {
                    ticket,
                    symbol: pos.symbol,
                    side: pos.side,
                    profit: pos.profit,
                    closed_at: Utc::now(),
                });
                Ok(())
            }
            None => Err(PipelineError::Supervision {
                ticket,
                reason: "unknown ticket".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{FillMode, Side};

    fn eurusd() -> SymbolInfo {
        SymbolInfo {
            name: "EURUSD".to_string(),
            digits: 5,
            point: 0.00001,
            min_volume: 0.01,
            max_volume: 100.0,
            volume_step: 0.01,
            fill_mode_bitmask: FillMode::Fok.bit(),
            stops_level_points: 10,
        }
    }

    fn market_buy(symbol: &str, price: f64) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side: Side::Buy,
            kind: crate::types::OrderKind::Market,
            volume: 0.01,
            price,
            sl: price * 0.99,
            tp: price * 1.06,
            fill_mode: FillMode::Fok,
            comment: String::new(),
        }
    }

    #[tokio::test]
    async fn default_order_fills_and_opens_position() {
        let gw = SimGateway::new();
        gw.add_symbol(eurusd());

        let result = gw.order_send(&market_buy("EURUSD", 1.1)).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        let ticket = result.ticket.unwrap();

        let positions = gw.positions_open().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, ticket);
    }

    #[tokio::test]
    async fn scripted_results_are_consumed_in_order() {
        let gw = SimGateway::new();
        gw.push_order_result(OrderResult {
            status: OrderStatus::FillModeError,
            ticket: None,
            retcode: Some(crate::retcode::RETCODE_INVALID_FILL),
            comment: Some("Unsupported filling mode".to_string()),
            price: None,
        });

        let first = gw.order_send(&market_buy("EURUSD", 1.1)).await.unwrap();
        assert_eq!(first.status, OrderStatus::FillModeError);

        let second = gw.order_send(&market_buy("EURUSD", 1.1)).await.unwrap();
        assert_eq!(second.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn close_moves_position_into_deal_history() {
        let gw = SimGateway::new();
        gw.add_symbol(eurusd());
        let result = gw.order_send(&market_buy("EURUSD", 1.1)).await.unwrap();
        let ticket = result.ticket.unwrap();
        gw.set_position_profit(ticket, 12.5, 1.12);

        gw.position_close(ticket).await.unwrap();
        assert!(gw.positions_open().await.unwrap().is_empty());

        let deals = gw
            .deals_since(Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].profit, 12.5);
    }

    #[tokio::test]
    async fn scripted_connect_failure_is_broker_connect() {
        let gw = SimGateway::new();
        gw.set_fail_connect(true);
        let err = gw.connect().await.unwrap_err();
        assert!(matches!(err, PipelineError::BrokerConnect(_)));

        gw.set_fail_connect(false);
        assert!(gw.connect().await.is_ok());
    }

    #[tokio::test]
    async fn short_history_is_data_unavailable() {
        let gw = SimGateway::new();
        gw.seed_random_walk(eurusd(), 50, 1.1, 7);
        let err = gw.ohlc("EURUSD", Timeframe::M5, 300).await.unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable { .. }));
    }
}

//! One symbol's trip through the decision pipeline:
//! bars + tick -> analyzers + oracle -> combiner -> history adjustment ->
//! entry plan -> submission.

use anyhow::Result;
use broker_gateway::BrokerGateway;
use chrono::{Duration as ChronoDuration, Utc};
use history_learner::{adjust_confidence_min_trades, HistoryLearner};
use indicator_engine::{analyze_all, entry_levels};
use market_core::SymbolCategory;
use oracle_client::OracleClient;
use signal_combiner::combine;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::planner::{build_plan, PlanContext};
use crate::submitter::{OrderSubmitter, SubmitOutcome};

/// How far back closed deals are pulled when the history cache is stale.
const DEAL_LOOKBACK_DAYS: i64 = 30;

const ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum SymbolOutcome {
    /// A position is already open on this symbol
    PositionOpen,
    /// No combined signal cleared the gate
    NoSignal,
    /// The signal died at history adjustment or planning
    Rejected(&'static str),
    Submitted(SubmitOutcome),
}

pub struct TradePipeline {
    config: AgentConfig,
    oracle: OracleClient,
    learner: HistoryLearner,
    submitter: OrderSubmitter,
}

impl TradePipeline {
    pub fn new(config: AgentConfig) -> Self {
        let oracle = OracleClient::new(config.oracle_url.clone(), ORACLE_TIMEOUT);
        let learner = HistoryLearner::new(
            config.history_window_trades,
            Duration::from_secs(config.history_cache_ttl_secs),
        );
        let submitter = OrderSubmitter::new(config.max_order_retries);
        Self {
            config,
            oracle,
            learner,
            submitter,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn process_symbol(
        &mut self,
        gateway: &dyn BrokerGateway,
        symbol: &str,
    ) -> Result<SymbolOutcome> {
        let open_positions = gateway.positions_open().await?;
        if open_positions.iter().any(|p| p.symbol == symbol) {
            debug!("{}: position already open, skipping", symbol);
            return Ok(SymbolOutcome::PositionOpen);
        }

        let info = gateway.symbol_info(symbol).await?;
        let bars = gateway
            .ohlc(symbol, self.config.timeframe, self.config.bars_window)
            .await?;
        let tick = gateway.tick(symbol).await?;

        let mut predictions = analyze_all(&bars);
        if let Some(oracle_view) = self.oracle.fetch_prediction(symbol, self.config.timeframe).await
        {
            predictions.push(oracle_view);
        }
        if predictions.is_empty() {
            debug!("{}: no predictor has an opinion", symbol);
            return Ok(SymbolOutcome::NoSignal);
        }

        let category = SymbolCategory::classify(symbol);
        let mut signal = match combine(symbol, category, predictions, self.config.min_confidence) {
            Some(s) => s,
            None => {
                debug!("{}: combined vote below gate", symbol);
                return Ok(SymbolOutcome::NoSignal);
            }
        };

        // Scale by recent per-direction win rate; direction never changes
        if let Some(side) = signal.action.side() {
            let stats = match self.learner.cached(symbol) {
                Some(stats) => stats,
                None => {
                    let from = Utc::now() - ChronoDuration::days(DEAL_LOOKBACK_DAYS);
                    let deals: Vec<_> = gateway
                        .deals_since(from)
                        .await?
                        .into_iter()
                        .filter(|d| d.symbol == symbol)
                        .collect();
                    self.learner.update(symbol, &deals)
                }
            };
            let adjusted = adjust_confidence_min_trades(
                &stats,
                side,
                signal.confidence,
                self.config.history_min_trades,
            );
            if adjusted != signal.confidence {
                debug!(
                    "{}: history adjusted confidence {:.2} -> {:.2}",
                    symbol, signal.confidence, adjusted
                );
            }
            signal.confidence = adjusted;
        }
        if signal.confidence < self.config.min_confidence {
            info!(
                "{}: rejected after history adjustment ({:.2} < {:.2})",
                symbol, signal.confidence, self.config.min_confidence
            );
            return Ok(SymbolOutcome::Rejected("history_adjustment"));
        }

        let (levels, trendlines) = entry_levels(&bars);
        let ctx = PlanContext {
            info: &info,
            tick: &tick,
            levels: &levels,
            trendlines: &trendlines,
            open_positions: &open_positions,
        };

        let plan = match build_plan(&signal, &ctx, &self.config) {
            Ok(plan) => plan,
            Err(rejection) => {
                info!("{}: plan rejected: {}", symbol, rejection);
                return Ok(SymbolOutcome::Rejected(rejection.reason()));
            }
        };

        let outcome = self.submitter.submit(gateway, &plan).await?;
        Ok(SymbolOutcome::Submitted(outcome))
    }

    /// Best-effort push of each watched symbol's OHLC window to the
    /// oracle's training endpoint.
    pub async fn upload_training_data(&self, gateway: &dyn BrokerGateway) {
        for symbol in &self.config.symbols {
            match gateway
                .ohlc(symbol, self.config.timeframe, self.config.bars_window)
                .await
            {
                Ok(bars) => {
                    let category = SymbolCategory::classify(symbol).name();
                    if let Err(e) = self
                        .oracle
                        .upload_history(symbol, category, self.config.timeframe, &bars)
                        .await
                    {
                        tracing::warn!("History upload failed for {}: {}", symbol, e);
                    }
                }
                Err(e) => tracing::debug!("No history to upload for {}: {}", symbol, e),
            }
        }
    }

    pub async fn trigger_retraining(&self) {
        match self.oracle.trigger_retraining().await {
            Ok(()) => info!("Retraining triggered"),
            Err(e) => tracing::warn!("Retraining trigger failed: {}", e),
        }
    }

    pub fn oracle(&self) -> &OracleClient {
        &self.oracle
    }
}

/// Watchlist sorted by category priority: boom-crash first, then the
/// volatility family, metals, fx, crypto, everything else.
pub fn prioritized_symbols(symbols: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = symbols.to_vec();
    ordered.sort_by_key(|s| SymbolCategory::classify(s).priority());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchlist_orders_by_category_priority() {
        let symbols = vec![
            "EURUSD".to_string(),
            "XAUUSD".to_string(),
            "Boom 500 Index".to_string(),
            "BTCUSD".to_string(),
            "Volatility 75 Index".to_string(),
        ];
        let ordered = prioritized_symbols(&symbols);
        assert_eq!(
            ordered,
            vec![
                "Boom 500 Index".to_string(),
                "Volatility 75 Index".to_string(),
                "XAUUSD".to_string(),
                "EURUSD".to_string(),
                "BTCUSD".to_string(),
            ]
        );
    }
}

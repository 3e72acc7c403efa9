//! HTTP client for the remote prediction oracle.
//!
//! The oracle is one predictor among several. Every call here is
//! best-effort: transport failures and non-2xx responses degrade to
//! "no prediction" and must never stall the trading loop.

pub mod error;

pub use error::{OracleError, OracleResult};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use market_core::{Bar, Prediction, PredictionSource, SignalAction, Timeframe};

#[derive(Debug, Clone, Deserialize)]
pub struct OraclePrediction {
    pub direction: String,
    pub confidence: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModelInfo {
    #[serde(default)]
    pub best_model: Option<String>,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    pub prediction: OraclePrediction,
    #[serde(default)]
    pub model_info: ModelInfo,
}

#[derive(Debug, Clone, Serialize)]
struct HistoryUploadRequest<'a> {
    symbol: &'a str,
    timeframe: &'a str,
    category: &'a str,
    data: &'a [Bar],
}

/// Rolled-up trading counters for the dashboard payload.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TradingStats {
    pub cycles: u64,
    pub orders_filled: u64,
    pub total_pnl: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    /// Open position count as the broker reports it
    pub positions: usize,
    /// Signals that cleared the gate since startup
    pub signals: u64,
    pub trading_stats: TradingStats,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct OracleClient {
    client: reqwest::Client,
    base_url: String,
}

impl OracleClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Request a direction prediction for (symbol, timeframe).
    pub async fn predict(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> OracleResult<PredictResponse> {
        let response = self
            .client
            .get(format!("{}/predict/{}", self.base_url, symbol))
            .query(&[
                ("model_type", "auto"),
                ("timeframe", timeframe.as_str()),
                ("models", "all"),
                ("horizon", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OracleError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }

        let result = response.json::<PredictResponse>().await?;
        Ok(result)
    }

    /// Fetch the oracle's view as a pipeline `Prediction`. Any failure is
    /// logged and collapses to `None` so the pipeline keeps moving.
    pub async fn fetch_prediction(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Option<Prediction> {
        let response = match self.predict(symbol, timeframe).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Oracle prediction unavailable for {}: {}", symbol, e);
                return None;
            }
        };

        let action = match response.prediction.direction.to_ascii_uppercase().as_str() {
            "UP" => SignalAction::Buy,
            "DOWN" => SignalAction::Sell,
            "HOLD" => SignalAction::Hold,
            other => {
                warn!("Oracle returned unknown direction '{}' for {}", other, symbol);
                return None;
            }
        };

        let mut p = Prediction::new(PredictionSource::Ml, action, response.prediction.confidence);
        p.sl = response.prediction.stop_loss;
        p.tp = response.prediction.take_profit;
        p.model_accuracy = response.model_info.accuracy;
        if let Some(model) = &response.model_info.best_model {
            p = p.with_note(format!("model {model}"));
        }
        debug!(
            "Oracle {} {} conf={:.2} acc={:?}",
            symbol, action, p.confidence, p.model_accuracy
        );
        Some(p)
    }

    /// Kick a model retraining run. Fire-and-forget; a 2xx is success.
    pub async fn trigger_retraining(&self) -> OracleResult<()> {
        let response = self
            .client
            .post(format!("{}/ml/retraining/trigger", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OracleError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Upload an OHLC window so the oracle can keep its training data fresh.
    pub async fn upload_history(
        &self,
        symbol: &str,
        category: &str,
        timeframe: Timeframe,
        bars: &[Bar],
    ) -> OracleResult<()> {
        let request = HistoryUploadRequest {
            symbol,
            timeframe: timeframe.as_str(),
            category,
            data: bars,
        };

        let response = self
            .client
            .post(format!("{}/mt5/history-upload", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OracleError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }
        debug!("Uploaded {} bars of {} history", bars.len(), symbol);
        Ok(())
    }

    /// Push an agent snapshot to the dashboard endpoint.
    pub async fn sync_dashboard(&self, snapshot: &DashboardSnapshot) -> OracleResult<()> {
        let response = self
            .client
            .post(format!("{}/api/sync", self.base_url))
            .json(snapshot)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OracleError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

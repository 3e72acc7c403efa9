use anyhow::{Context, Result};
use market_core::{PipelineError, PipelineResult, Timeframe};
use serde::Serialize;
use std::env;

/// Runtime configuration, read once at startup from the environment
/// (with `.env` support). Every knob has a working default so the agent
/// runs out of the box in paper mode.
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    // Signal gate
    pub min_confidence: f64,               // 0.35

    // Scheduler
    pub check_interval_secs: u64,          // 60
    pub bars_window: usize,                // 300 M5 bars per analysis
    pub timeframe: Timeframe,              // M5
    pub symbols: Vec<String>,              // watchlist

    // Entry planning
    pub max_positions: usize,              // 3
    pub sl_pct_fx: Option<f64>,            // override, default from category
    pub tp_pct_fx: Option<f64>,
    pub sl_pct_default: Option<f64>,
    pub tp_pct_default: Option<f64>,

    // Order submission
    pub max_order_retries: u32,            // 2

    // Position supervision
    pub trailing_activation_pct: f64,      // 0.005 (0.5% unrealized)
    pub trailing_distance_pct: f64,        // 0.003
    pub peak_protect_ratio: f64,           // 0.5
    pub absolute_loss_floor: f64,          // -6.0 account currency
    pub peak_store_path: String,           // position_max_profits.json

    // History learning
    pub history_window_trades: usize,      // 80
    pub history_cache_ttl_secs: u64,       // 300
    pub history_min_trades: usize,         // 10, below it no adjustment

    // Remote services
    pub oracle_url: String,
    pub dashboard_url: Option<String>,     // falls back to oracle_url
    pub notify_webhook_url: String,        // empty = notifications off

    // Background cadences
    pub upload_interval_secs: u64,         // 3600
    pub retrain_interval_secs: u64,        // 21600
    pub heartbeat_interval_cycles: u64,    // 6

    // Mode
    pub paper_trading: bool,               // true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
            check_interval_secs: 60,
            bars_window: 300,
            timeframe: Timeframe::M5,
            symbols: vec![
                "Boom 500 Index".to_string(),
                "Crash 500 Index".to_string(),
                "Volatility 75 Index".to_string(),
                "Step Index".to_string(),
                "XAUUSD".to_string(),
                "EURUSD".to_string(),
                "GBPUSD".to_string(),
                "BTCUSD".to_string(),
            ],
            max_positions: 3,
            sl_pct_fx: None,
            tp_pct_fx: None,
            sl_pct_default: None,
            tp_pct_default: None,
            max_order_retries: 2,
            trailing_activation_pct: 0.005,
            trailing_distance_pct: 0.003,
            peak_protect_ratio: 0.5,
            absolute_loss_floor: -6.0,
            peak_store_path: "position_max_profits.json".to_string(),
            history_window_trades: 80,
            history_cache_ttl_secs: 300,
            history_min_trades: 10,
            oracle_url: "http://localhost:8000".to_string(),
            dashboard_url: None,
            notify_webhook_url: String::new(),
            upload_interval_secs: 3600,
            retrain_interval_secs: 21600,
            heartbeat_interval_cycles: 6,
            paper_trading: true,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let timeframe_raw = env::var("TIMEFRAME").unwrap_or_else(|_| "M5".to_string());
        let timeframe = Timeframe::parse(&timeframe_raw)
            .with_context(|| format!("TIMEFRAME '{timeframe_raw}' is not a known timeframe"))?;

        let config = Self {
            min_confidence: env::var("MIN_CONFIDENCE")
                .unwrap_or_else(|_| "0.35".to_string())
                .parse()
                .context("MIN_CONFIDENCE must be a number")?,

            check_interval_secs: env::var("CHECK_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("CHECK_INTERVAL must be an integer (seconds)")?,
            bars_window: env::var("BARS_WINDOW")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("BARS_WINDOW must be an integer")?,
            timeframe,
            symbols: env::var("SYMBOLS")
                .unwrap_or_else(|_| {
                    "Boom 500 Index,Crash 500 Index,Volatility 75 Index,Step Index,\
                     XAUUSD,EURUSD,GBPUSD,BTCUSD"
                        .to_string()
                })
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            max_positions: env::var("MAX_POSITIONS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("MAX_POSITIONS must be an integer")?,
            sl_pct_fx: parse_optional("SL_PCT_FX")?,
            tp_pct_fx: parse_optional("TP_PCT_FX")?,
            sl_pct_default: parse_optional("SL_PCT_DEFAULT")?,
            tp_pct_default: parse_optional("TP_PCT_DEFAULT")?,

            max_order_retries: env::var("MAX_ORDER_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("MAX_ORDER_RETRIES must be an integer")?,

            trailing_activation_pct: env::var("TRAILING_ACTIVATION_PCT")
                .unwrap_or_else(|_| "0.005".to_string())
                .parse()
                .context("TRAILING_ACTIVATION_PCT must be a number")?,
            trailing_distance_pct: env::var("TRAILING_DISTANCE_PCT")
                .unwrap_or_else(|_| "0.003".to_string())
                .parse()
                .context("TRAILING_DISTANCE_PCT must be a number")?,
            peak_protect_ratio: env::var("PEAK_PROTECT_RATIO")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .context("PEAK_PROTECT_RATIO must be a number")?,
            absolute_loss_floor: env::var("ABSOLUTE_LOSS_FLOOR")
                .unwrap_or_else(|_| "-6.0".to_string())
                .parse()
                .context("ABSOLUTE_LOSS_FLOOR must be a number")?,
            peak_store_path: env::var("PEAK_STORE_PATH")
                .unwrap_or_else(|_| "position_max_profits.json".to_string()),

            history_window_trades: env::var("HISTORY_WINDOW_TRADES")
                .unwrap_or_else(|_| "80".to_string())
                .parse()
                .context("HISTORY_WINDOW_TRADES must be an integer")?,
            history_cache_ttl_secs: env::var("HISTORY_CACHE_TTL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("HISTORY_CACHE_TTL must be an integer (seconds)")?,
            history_min_trades: env::var("MIN_TRADES_FOR_ADJUSTMENT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("MIN_TRADES_FOR_ADJUSTMENT must be an integer")?,

            oracle_url: env::var("ORACLE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            dashboard_url: env::var("DASHBOARD_URL").ok(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),

            upload_interval_secs: env::var("UPLOAD_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("UPLOAD_INTERVAL_SECS must be an integer")?,
            retrain_interval_secs: env::var("RETRAIN_INTERVAL_SECS")
                .unwrap_or_else(|_| "21600".to_string())
                .parse()
                .context("RETRAIN_INTERVAL_SECS must be an integer")?,
            heartbeat_interval_cycles: env::var("HEARTBEAT_INTERVAL_CYCLES")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .context("HEARTBEAT_INTERVAL_CYCLES must be an integer")?,

            paper_trading: env::var("PAPER_TRADING")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("PAPER_TRADING must be true or false")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |msg: String| Err(PipelineError::Config(msg));

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return invalid(format!(
                "MIN_CONFIDENCE must be within [0, 1], got {}",
                self.min_confidence
            ));
        }
        if self.check_interval_secs == 0 {
            return invalid("CHECK_INTERVAL must be positive".to_string());
        }
        if self.bars_window < 60 {
            return invalid(format!("BARS_WINDOW must be at least 60, got {}", self.bars_window));
        }
        if self.symbols.is_empty() {
            return invalid("SYMBOLS must name at least one symbol".to_string());
        }
        if self.max_positions == 0 {
            return invalid("MAX_POSITIONS must be at least 1".to_string());
        }
        if self.trailing_activation_pct <= 0.0 || self.trailing_distance_pct <= 0.0 {
            return invalid("trailing parameters must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.peak_protect_ratio) || self.peak_protect_ratio == 0.0 {
            return invalid(format!(
                "PEAK_PROTECT_RATIO must be within (0, 1], got {}",
                self.peak_protect_ratio
            ));
        }
        if self.absolute_loss_floor >= 0.0 {
            return invalid(format!(
                "ABSOLUTE_LOSS_FLOOR must be negative, got {}",
                self.absolute_loss_floor
            ));
        }
        for (name, pct) in [
            ("SL_PCT_FX", self.sl_pct_fx),
            ("TP_PCT_FX", self.tp_pct_fx),
            ("SL_PCT_DEFAULT", self.sl_pct_default),
            ("TP_PCT_DEFAULT", self.tp_pct_default),
        ] {
            if let Some(p) = pct {
                if p <= 0.0 || p >= 1.0 {
                    return invalid(format!("{name} must be within (0, 1), got {p}"));
                }
            }
        }
        Ok(())
    }
}

fn parse_optional(name: &str) -> Result<Option<f64>> {
    match env::var(name) {
        Ok(raw) => Ok(Some(
            raw.parse()
                .with_context(|| format!("{name} must be a number"))?,
        )),
        Err(_) => Ok(None),
    }
}

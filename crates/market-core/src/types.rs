use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLC bar for a fixed time bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
}

/// Current bid/ask quote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickQuote {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

/// Broker-declared symbol properties, refreshed each tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub digits: u32,
    pub point: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub volume_step: f64,
    /// Bitmask of fill modes the broker declares for this symbol
    pub fill_mode_bitmask: u32,
    /// Minimum distance (in points) between current price and SL/TP
    pub stops_level_points: i32,
}

impl SymbolInfo {
    /// Round a price to this symbol's digit precision.
    pub fn round_price(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.digits as i32);
        (price * factor).round() / factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional decision carried by predictions and combined signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            SignalAction::Buy => Some(Side::Buy),
            SignalAction::Sell => Some(Side::Sell),
            SignalAction::Hold => None,
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker fill policy for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    /// Fill completely or not at all
    Fok,
    /// Fill what can be filled, cancel the rest
    Ioc,
    /// Leave the remainder resting on the book
    Return,
}

impl FillMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillMode::Fok => "FOK",
            FillMode::Ioc => "IOC",
            FillMode::Return => "RETURN",
        }
    }

    /// Bit used in the broker's per-symbol fill mode bitmask.
    pub fn bit(&self) -> u32 {
        match self {
            FillMode::Fok => 0b001,
            FillMode::Ioc => 0b010,
            FillMode::Return => 0b100,
        }
    }
}

impl std::fmt::Display for FillMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which predictor produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictionSource {
    Ml,
    Technical,
    Volatility,
    Features,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Ml => "ml",
            PredictionSource::Technical => "technical",
            PredictionSource::Volatility => "volatility",
            PredictionSource::Features => "features",
        }
    }
}

/// Conditional-volatility band from the GARCH estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityBand {
    High,
    Low,
    Normal,
}

/// A single predictor's opinion. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub source: PredictionSource,
    pub action: SignalAction,
    /// Confidence in [0, 1]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp: Option<f64>,
    /// Reported accuracy of the producing model, if it exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_accuracy: Option<f64>,
    /// Set only by the volatility predictor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<VolatilityBand>,
    /// Short human-readable rationale for logs
    pub note: String,
}

impl Prediction {
    pub fn new(source: PredictionSource, action: SignalAction, confidence: f64) -> Self {
        Self {
            source,
            action,
            confidence: confidence.clamp(0.0, 1.0),
            sl: None,
            tp: None,
            model_accuracy: None,
            volatility: None,
            note: String::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// Per-source voting weights used by the combiner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    pub ml: f64,
    pub technical: f64,
    pub volatility: f64,
    pub features: f64,
}

impl SourceWeights {
    pub fn for_source(&self, source: PredictionSource) -> f64 {
        match source {
            PredictionSource::Ml => self.ml,
            PredictionSource::Technical => self.technical,
            PredictionSource::Volatility => self.volatility,
            PredictionSource::Features => self.features,
        }
    }
}

/// The combiner's weighted decision for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedSignal {
    pub symbol: String,
    pub action: SignalAction,
    /// Normalized weighted vote in [0, 1]
    pub confidence: f64,
    pub components: Vec<Prediction>,
    pub weights: SourceWeights,
    pub created_at: DateTime<Utc>,
}

/// Chart timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Some(Timeframe::M1),
            "M5" => Some(Timeframe::M5),
            "M15" => Some(Timeframe::M15),
            "M30" => Some(Timeframe::M30),
            "H1" => Some(Timeframe::H1),
            "H4" => Some(Timeframe::H4),
            "D1" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_price_respects_digits() {
        let info = SymbolInfo {
            name: "EURUSD".to_string(),
            digits: 5,
            point: 0.00001,
            min_volume: 0.01,
            max_volume: 100.0,
            volume_step: 0.01,
            fill_mode_bitmask: 0b001,
            stops_level_points: 10,
        };
        assert!((info.round_price(1.098765432) - 1.09877).abs() < 1e-9);
    }

    #[test]
    fn fill_mode_bits_are_distinct() {
        let all = FillMode::Fok.bit() | FillMode::Ioc.bit() | FillMode::Return.bit();
        assert_eq!(all, 0b111);
    }

    #[test]
    fn prediction_confidence_is_clamped() {
        let p = Prediction::new(PredictionSource::Technical, SignalAction::Buy, 1.4);
        assert_eq!(p.confidence, 1.0);
        let p = Prediction::new(PredictionSource::Technical, SignalAction::Sell, -0.1);
        assert_eq!(p.confidence, 0.0);
    }
}

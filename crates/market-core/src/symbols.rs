use serde::{Deserialize, Serialize};

use crate::types::{FillMode, Side};

const MAJOR_CURRENCIES: [&str; 8] = ["USD", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "NZD"];

const CRYPTO_ROOTS: [&str; 11] = [
    "BTC", "ETH", "LTC", "XRP", "BCH", "EOS", "ADA", "DOT", "SOL", "DOGE", "BNB",
];

const VOLATILITY_KEYWORDS: [&str; 5] = ["VOLATILITY", "STEP", "JUMP", "RANGE BREAK", "VOL OVER"];

const METAL_ROOTS: [&str; 4] = ["XAU", "XAG", "XPT", "XPD"];

/// Instrument category. Drives combiner weights, lot/SL/TP defaults and
/// fill-mode preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolCategory {
    BoomCrash,
    SyntheticVolatility,
    Metals,
    Fx,
    Crypto,
    Other,
}

impl SymbolCategory {
    pub fn name(&self) -> &'static str {
        match self {
            SymbolCategory::BoomCrash => "boom-crash",
            SymbolCategory::SyntheticVolatility => "volatility",
            SymbolCategory::Metals => "metals",
            SymbolCategory::Fx => "fx",
            SymbolCategory::Crypto => "crypto",
            SymbolCategory::Other => "other",
        }
    }

    /// Classify a symbol by its broker name. Rules evaluated in order,
    /// first match wins. Pure and stable across ticks.
    pub fn classify(symbol: &str) -> Self {
        let upper = symbol.to_ascii_uppercase();

        if upper.contains("BOOM") || upper.contains("CRASH") {
            return SymbolCategory::BoomCrash;
        }
        if VOLATILITY_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
            return SymbolCategory::SyntheticVolatility;
        }
        if is_fx_pair(&upper) {
            return SymbolCategory::Fx;
        }
        if METAL_ROOTS.iter().any(|m| upper.contains(m)) {
            return SymbolCategory::Metals;
        }
        if CRYPTO_ROOTS.iter().any(|c| upper.contains(c)) {
            return SymbolCategory::Crypto;
        }
        SymbolCategory::Other
    }

    /// Scheduling priority: lower scans first.
    pub fn priority(&self) -> u8 {
        match self {
            SymbolCategory::BoomCrash => 0,
            SymbolCategory::SyntheticVolatility => 1,
            SymbolCategory::Metals => 2,
            SymbolCategory::Fx => 3,
            SymbolCategory::Crypto => 4,
            SymbolCategory::Other => 5,
        }
    }

    pub fn defaults(&self) -> CategoryDefaults {
        match self {
            SymbolCategory::BoomCrash => CategoryDefaults {
                lot: 0.2,
                sl_pct: 0.02,
                tp_pct: 0.04,
                preferred_fill: FillPreference::Fixed(FillMode::Fok),
                max_pending_distance_pct: 0.01,
            },
            SymbolCategory::SyntheticVolatility => CategoryDefaults {
                lot: 0.1,
                sl_pct: 0.02,
                tp_pct: 0.04,
                preferred_fill: FillPreference::Fixed(FillMode::Fok),
                max_pending_distance_pct: 0.01,
            },
            SymbolCategory::Metals => CategoryDefaults {
                lot: 0.05,
                sl_pct: 0.02,
                tp_pct: 0.04,
                preferred_fill: FillPreference::BrokerDeclared,
                max_pending_distance_pct: 0.01,
            },
            SymbolCategory::Fx => CategoryDefaults {
                lot: 0.01,
                sl_pct: 0.01,
                tp_pct: 0.06,
                preferred_fill: FillPreference::BrokerDeclared,
                max_pending_distance_pct: 0.005,
            },
            SymbolCategory::Crypto => CategoryDefaults {
                lot: 0.01,
                sl_pct: 0.02,
                tp_pct: 0.04,
                preferred_fill: FillPreference::Fixed(FillMode::Fok),
                max_pending_distance_pct: 0.01,
            },
            SymbolCategory::Other => CategoryDefaults {
                lot: 0.01,
                sl_pct: 0.02,
                tp_pct: 0.04,
                preferred_fill: FillPreference::BrokerDeclared,
                max_pending_distance_pct: 0.01,
            },
        }
    }

    /// Whether pending-limit entries are considered for this category.
    pub fn allows_pending_entry(&self) -> bool {
        matches!(self, SymbolCategory::Fx | SymbolCategory::Metals)
    }
}

/// Non-overridable direction restriction. Boom indices only ever spike
/// upward and Crash indices downward, so the opposite side is locked out.
pub fn direction_lock(symbol: &str) -> Option<Side> {
    let upper = symbol.to_ascii_uppercase();
    if upper.contains("BOOM") {
        Some(Side::Buy)
    } else if upper.contains("CRASH") {
        Some(Side::Sell)
    } else {
        None
    }
}

fn is_fx_pair(upper: &str) -> bool {
    let letters: String = upper.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if letters.len() < 6 {
        return false;
    }
    let tail = &letters[letters.len() - 6..];
    let base = &tail[..3];
    let quote = &tail[3..];
    // XAUUSD/BTCUSD fall through here: their base leg is not a major
    base != quote && MAJOR_CURRENCIES.contains(&base) && MAJOR_CURRENCIES.contains(&quote)
}

/// How the planner picks the initial fill mode for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPreference {
    /// Always start with this mode
    Fixed(FillMode),
    /// Use the broker's declared bitmask, FOK when none declared
    BrokerDeclared,
}

/// Per-category trading defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefaults {
    pub lot: f64,
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub preferred_fill: FillPreference,
    /// Max distance (fraction of price) for a pending-limit entry level
    pub max_pending_distance_pct: f64,
}

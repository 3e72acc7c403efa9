//! Per-symbol win-rate learning over recent closed trades.
//!
//! Confidence is only ever scaled, never redirected: a BUY stays a BUY
//! no matter how poorly BUYs have been doing. The agent fetches closed
//! deals through the broker gateway and feeds them in; this crate holds
//! no I/O of its own.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use broker_gateway::DealRecord;
use market_core::Side;

pub const DEFAULT_WINDOW_TRADES: usize = 80;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const MIN_TRADES_FOR_ADJUSTMENT: usize = 10;

/// Win-rate statistics over a symbol's recent closed trades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SymbolStats {
    pub buy_wr: f64,
    pub sell_wr: f64,
    pub buy_trades: usize,
    pub sell_trades: usize,
    pub total_trades: usize,
}

impl SymbolStats {
    pub fn win_rate(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.buy_wr,
            Side::Sell => self.sell_wr,
        }
    }
}

/// Compute stats over the last `window` deals. Deals are expected in
/// chronological order; only the tail of the slice counts.
pub fn compute_stats(deals: &[DealRecord], window: usize) -> SymbolStats {
    let start = deals.len().saturating_sub(window);
    let recent = &deals[start..];

    let mut buy_wins = 0usize;
    let mut buy_trades = 0usize;
    let mut sell_wins = 0usize;
    let mut sell_trades = 0usize;

    for deal in recent {
        match deal.side {
            Side::Buy => {
                buy_trades += 1;
                if deal.profit > 0.0 {
                    buy_wins += 1;
                }
            }
            Side::Sell => {
                sell_trades += 1;
                if deal.profit > 0.0 {
                    sell_wins += 1;
                }
            }
        }
    }

    let rate = |wins: usize, trades: usize| {
        if trades == 0 {
            0.0
        } else {
            wins as f64 / trades as f64
        }
    };

    SymbolStats {
        buy_wr: rate(buy_wins, buy_trades),
        sell_wr: rate(sell_wins, sell_trades),
        buy_trades,
        sell_trades,
        total_trades: buy_trades + sell_trades,
    }
}

/// Scale confidence by how the symbol's recent trades in that direction
/// have fared. Too few trades means no opinion.
pub fn adjust_confidence(stats: &SymbolStats, side: Side, confidence: f64) -> f64 {
    adjust_confidence_min_trades(stats, side, confidence, MIN_TRADES_FOR_ADJUSTMENT)
}

/// `adjust_confidence` with an explicit trade-count floor.
pub fn adjust_confidence_min_trades(
    stats: &SymbolStats,
    side: Side,
    confidence: f64,
    min_trades: usize,
) -> f64 {
    if stats.total_trades < min_trades {
        return confidence;
    }
    let wr = stats.win_rate(side);
    let scaled = if wr < 0.35 {
        confidence * 0.75
    } else if wr < 0.45 {
        confidence * 0.9
    } else if wr >= 0.6 {
        confidence * 1.05
    } else {
        confidence
    };
    scaled.min(1.0)
}

struct CacheEntry {
    stats: SymbolStats,
    computed_at: Instant,
}

/// TTL cache of per-symbol stats so the deal history is not refetched
/// every cycle.
pub struct HistoryLearner {
    window: usize,
    ttl: Duration,
    cache: HashMap<String, CacheEntry>,
}

impl Default for HistoryLearner {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_TRADES, DEFAULT_CACHE_TTL)
    }
}

impl HistoryLearner {
    pub fn new(window: usize, ttl: Duration) -> Self {
        Self {
            window,
            ttl,
            cache: HashMap::new(),
        }
    }

    /// Fresh cached stats, or `None` when the entry is missing or stale
    /// and the caller should refetch deals.
    pub fn cached(&self, symbol: &str) -> Option<SymbolStats> {
        self.cache
            .get(symbol)
            .filter(|e| e.computed_at.elapsed() < self.ttl)
            .map(|e| e.stats)
    }

    /// Recompute and cache stats from a fresh deal history.
    pub fn update(&mut self, symbol: &str, deals: &[DealRecord]) -> SymbolStats {
        let stats = compute_stats(deals, self.window);
        debug!(
            "{} history: {} trades, buy_wr={:.2} sell_wr={:.2}",
            symbol, stats.total_trades, stats.buy_wr, stats.sell_wr
        );
        self.cache.insert(
            symbol.to_string(),
            CacheEntry {
                stats,
                computed_at: Instant::now(),
            },
        );
        stats
    }
}

//! Advanced feature extraction: RSI divergence, volume profile, seasonal
//! hour-of-day deviation, momentum and market-regime classification.

use chrono::Timelike;
use market_core::Bar;

use crate::indicators::{linear_regression, mean, momentum, rsi, variance};

const DIVERGENCE_LOOKBACK: usize = 5;
const VOLUME_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
}

impl MarketRegime {
    pub fn name(&self) -> &'static str {
        match self {
            MarketRegime::TrendingUp => "trending_up",
            MarketRegime::TrendingDown => "trending_down",
            MarketRegime::Ranging => "ranging",
            MarketRegime::Volatile => "volatile",
        }
    }
}

/// RSI(14) with a divergence bonus: when the price slope and RSI slope
/// disagree over the last few bars, shift the reading by ±10 toward the
/// divergent side.
pub fn rsi_with_divergence(closes: &[f64]) -> Option<f64> {
    let values = rsi(closes, 14);
    let last = *values.last()?;
    if values.len() < DIVERGENCE_LOOKBACK || closes.len() < DIVERGENCE_LOOKBACK {
        return Some(last);
    }

    let price_tail = &closes[closes.len() - DIVERGENCE_LOOKBACK..];
    let rsi_tail = &values[values.len() - DIVERGENCE_LOOKBACK..];
    let (price_slope, _, _) = linear_regression(price_tail)?;
    let (rsi_slope, _, _) = linear_regression(rsi_tail)?;

    let adjusted = if price_slope < 0.0 && rsi_slope > 0.0 {
        // Bullish divergence: price falls while RSI recovers
        last + 10.0
    } else if price_slope > 0.0 && rsi_slope < 0.0 {
        last - 10.0
    } else {
        last
    };
    Some(adjusted.clamp(0.0, 100.0))
}

/// Last bar's tick volume relative to the 20-bar mean.
pub fn volume_ratio(bars: &[Bar]) -> Option<f64> {
    if bars.len() < VOLUME_WINDOW + 1 {
        return None;
    }
    let volumes: Vec<f64> = bars[bars.len() - VOLUME_WINDOW - 1..bars.len() - 1]
        .iter()
        .map(|b| b.tick_volume as f64)
        .collect();
    let avg = mean(&volumes)?;
    if avg <= 0.0 {
        return None;
    }
    Some(bars.last()?.tick_volume as f64 / avg)
}

/// Deviation of the current hour's mean bar return from the all-hours
/// mean, in return units. Positive means this hour historically trades up.
pub fn seasonal_deviation(bars: &[Bar]) -> Option<f64> {
    let last_hour = bars.last()?.time.hour();
    let mut hour_returns: Vec<f64> = Vec::new();
    let mut all_returns: Vec<f64> = Vec::new();

    for bar in bars {
        if bar.open <= 0.0 {
            continue;
        }
        let r = (bar.close - bar.open) / bar.open;
        all_returns.push(r);
        if bar.time.hour() == last_hour {
            hour_returns.push(r);
        }
    }
    if hour_returns.len() < 3 {
        return None;
    }
    Some(mean(&hour_returns)? - mean(&all_returns)?)
}

/// Mean percentage momentum over the 5/10/20-bar horizons.
pub fn momentum_score(closes: &[f64]) -> Option<f64> {
    let horizons = [5usize, 10, 20];
    let values: Vec<f64> = horizons
        .iter()
        .filter_map(|n| momentum(closes, *n))
        .collect();
    if values.is_empty() {
        return None;
    }
    mean(&values)
}

/// Classify the regime from an OLS fit over the closes: trending when the
/// fit explains the window (|R²| > 0.7), ranging when volatility is under
/// 2% of the average price, volatile otherwise.
pub fn market_regime(closes: &[f64]) -> Option<MarketRegime> {
    if closes.len() < 20 {
        return None;
    }
    let (slope, _, r2) = linear_regression(closes)?;
    if r2 > 0.7 {
        return Some(if slope >= 0.0 {
            MarketRegime::TrendingUp
        } else {
            MarketRegime::TrendingDown
        });
    }
    let avg = mean(closes)?;
    let vol = variance(closes)?.sqrt();
    if avg > 0.0 && vol / avg < 0.02 {
        Some(MarketRegime::Ranging)
    } else {
        Some(MarketRegime::Volatile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_with_volumes(closes: &[f64], volumes: &[i64]) -> Vec<Bar> {
        let now = Utc::now();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| Bar {
                time: now - Duration::minutes(5 * (closes.len() - i) as i64),
                open: c,
                high: c + 0.1,
                low: c - 0.1,
                close: c,
                tick_volume: v,
            })
            .collect()
    }

    #[test]
    fn bullish_divergence_lifts_the_reading() {
        // Price grinds lower while momentum flattens: the tail has falling
        // closes but the RSI tail recovers
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 - i as f64 * 0.8).collect();
        closes.extend([68.5, 68.0, 68.3, 67.9, 68.2, 67.8]);
        let plain = *rsi(&closes, 14).last().unwrap();
        let adjusted = rsi_with_divergence(&closes).unwrap();
        assert!(adjusted >= plain);
    }

    #[test]
    fn volume_spike_shows_ratio_above_one() {
        let closes = vec![100.0; 30];
        let mut volumes = vec![100i64; 30];
        volumes[29] = 400;
        let bars = bars_with_volumes(&closes, &volumes);
        let ratio = volume_ratio(&bars).unwrap();
        assert!((ratio - 4.0).abs() < 1e-9);
    }

    #[test]
    fn seasonal_deviation_flags_a_strong_hour() {
        // Hour 9 bars close up, every other hour closes flat
        let base = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        let mut bars = Vec::new();
        for day in 0..5 {
            for hour in 0..24 {
                let up = if hour == 9 { 1.0 } else { 0.0 };
                bars.push(Bar {
                    time: base + Duration::days(day) + Duration::hours(hour),
                    open: 100.0,
                    high: 101.0 + up,
                    low: 99.0,
                    close: 100.0 + up,
                    tick_volume: 100,
                });
            }
        }
        // Make the newest bar fall in hour 9
        bars.push(Bar {
            time: base + Duration::days(5) + Duration::hours(9),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 101.0,
            tick_volume: 100,
        });
        let dev = seasonal_deviation(&bars).unwrap();
        assert!(dev > 0.0);
    }

    #[test]
    fn steady_climb_is_trending_up() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        assert_eq!(market_regime(&closes), Some(MarketRegime::TrendingUp));
    }

    #[test]
    fn tight_flat_series_is_ranging() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + 0.2 * (i % 2) as f64).collect();
        assert_eq!(market_regime(&closes), Some(MarketRegime::Ranging));
    }

    #[test]
    fn wild_swings_are_volatile() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + 10.0 * ((i as f64 * 1.7).sin()))
            .collect();
        assert_eq!(market_regime(&closes), Some(MarketRegime::Volatile));
    }
}

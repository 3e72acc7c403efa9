//! Trendlines from OLS fits over recent swing points.

use market_core::Bar;

use crate::indicators::fit_line;

const PIVOT_SPAN: usize = 2;
const MAX_POINTS: usize = 5;

/// Projected trendline values at the most recent bar.
#[derive(Debug, Clone, Default)]
pub struct TrendLines {
    /// Bullish line through recent swing lows, projected to now
    pub support: Option<f64>,
    /// Bearish line through recent swing highs, projected to now
    pub resistance: Option<f64>,
    pub support_slope: f64,
    pub resistance_slope: f64,
}

/// Fit lines through the last few swing lows and swing highs and project
/// them to the newest bar index.
pub fn find_trendlines(bars: &[Bar]) -> TrendLines {
    if bars.len() < 2 * PIVOT_SPAN + 2 {
        return TrendLines::default();
    }

    let mut lows: Vec<(f64, f64)> = Vec::new();
    let mut highs: Vec<(f64, f64)> = Vec::new();

    for i in PIVOT_SPAN..bars.len() - PIVOT_SPAN {
        let neighborhood = &bars[i - PIVOT_SPAN..=i + PIVOT_SPAN];
        if neighborhood.iter().all(|b| b.low >= bars[i].low) {
            lows.push((i as f64, bars[i].low));
        }
        if neighborhood.iter().all(|b| b.high <= bars[i].high) {
            highs.push((i as f64, bars[i].high));
        }
    }

    let last_x = (bars.len() - 1) as f64;
    let mut lines = TrendLines::default();

    if lows.len() >= 2 {
        let recent = &lows[lows.len().saturating_sub(MAX_POINTS)..];
        if let Some((slope, intercept)) = fit_line(recent) {
            lines.support = Some(slope * last_x + intercept);
            lines.support_slope = slope;
        }
    }
    if highs.len() >= 2 {
        let recent = &highs[highs.len().saturating_sub(MAX_POINTS)..];
        if let Some((slope, intercept)) = fit_line(recent) {
            lines.resistance = Some(slope * last_x + intercept);
            lines.resistance_slope = slope;
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn zigzag_up(n: usize) -> Vec<Bar> {
        // Rising base with a dip every 6 bars, producing swing lows on a line
        let now = Utc::now();
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                let dip = if i % 6 == 3 { 2.0 } else { 0.0 };
                Bar {
                    time: now - Duration::minutes(5 * (n - i) as i64),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0 - dip,
                    close: base,
                    tick_volume: 100,
                }
            })
            .collect()
    }

    #[test]
    fn rising_swing_lows_give_a_rising_support_line() {
        let lines = find_trendlines(&zigzag_up(60));
        assert!(lines.support.is_some());
        assert!(lines.support_slope > 0.0);
    }

    #[test]
    fn projection_lands_near_the_latest_lows() {
        let bars = zigzag_up(60);
        let lines = find_trendlines(&bars);
        let projected = lines.support.unwrap();
        let last_close = bars.last().unwrap().close;
        // The support projection sits below price but within a few units
        assert!(projected < last_close);
        assert!(last_close - projected < 10.0);
    }

    #[test]
    fn too_few_bars_give_no_lines() {
        let lines = find_trendlines(&zigzag_up(4));
        assert!(lines.support.is_none());
        assert!(lines.resistance.is_none());
    }
}

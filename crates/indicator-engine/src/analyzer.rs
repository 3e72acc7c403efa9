//! Prediction-emitting analyzers.
//!
//! Each analyzer is a pure function of the bar window and returns `None`
//! when it cannot form an opinion (never a HOLD with zero confidence).

use market_core::{Bar, Prediction, PredictionSource, SignalAction};

use crate::features::{
    market_regime, momentum_score, rsi_with_divergence, seasonal_deviation, volume_ratio,
    MarketRegime,
};
use crate::garch::conditional_volatility;
use crate::indicators::ema;
use crate::levels::{find_levels, Levels};
use crate::trendlines::{find_trendlines, TrendLines};

const SR_WINDOW: usize = 20;
const LEVEL_PROXIMITY_PCT: f64 = 0.01;

fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// EMA stack rule over periods {9, 21, 50, 200}.
pub fn ema_prediction(bars: &[Bar]) -> Option<Prediction> {
    let closes = closes(bars);
    let close = *closes.last()?;
    let ema9 = *ema(&closes, 9).last()?;
    let ema21 = *ema(&closes, 21).last()?;

    let action = if close > ema9 && ema9 > ema21 {
        SignalAction::Buy
    } else if close < ema9 && ema9 < ema21 {
        SignalAction::Sell
    } else {
        return None;
    };

    let mut confidence = 0.7;
    let mut note = format!("close/EMA9/EMA21 stack {}", action);

    // Long-EMA confirmation when the window is deep enough
    if closes.len() >= 200 {
        let ema50 = *ema(&closes, 50).last()?;
        let ema200 = *ema(&closes, 200).last()?;
        let confirmed = match action {
            SignalAction::Buy => ema50 > ema200,
            SignalAction::Sell => ema50 < ema200,
            SignalAction::Hold => false,
        };
        if confirmed {
            confidence += 0.2;
            note.push_str(", EMA50/EMA200 confirm");
        }
    }

    Some(Prediction::new(PredictionSource::Technical, action, confidence).with_note(note))
}

/// Support/resistance proximity rule.
pub fn sr_prediction(bars: &[Bar]) -> Option<Prediction> {
    let levels = find_levels(bars, SR_WINDOW);
    let close = bars.last()?.close;
    prediction_from_levels(
        close,
        levels.nearest_support(close),
        levels.nearest_resistance(close),
        "S/R",
    )
}

/// Trendline proximity rule, analogous to S/R but against the projected
/// swing-point lines.
pub fn trendline_prediction(bars: &[Bar]) -> Option<Prediction> {
    let lines = find_trendlines(bars);
    let close = bars.last()?.close;
    let support = lines.support.filter(|s| *s < close);
    let resistance = lines.resistance.filter(|r| *r > close);
    prediction_from_levels(close, support, resistance, "trendline")
}

fn prediction_from_levels(
    close: f64,
    support: Option<f64>,
    resistance: Option<f64>,
    kind: &str,
) -> Option<Prediction> {
    if close <= 0.0 {
        return None;
    }

    if let Some(s) = support {
        if (close - s).abs() / close < LEVEL_PROXIMITY_PCT {
            return Some(
                Prediction::new(PredictionSource::Technical, SignalAction::Buy, 0.8)
                    .with_note(format!("at {kind} support {s:.5}")),
            );
        }
    }
    if let Some(r) = resistance {
        if (close - r).abs() / close < LEVEL_PROXIMITY_PCT {
            return Some(
                Prediction::new(PredictionSource::Technical, SignalAction::Sell, 0.8)
                    .with_note(format!("at {kind} resistance {r:.5}")),
            );
        }
    }

    // Inside the channel: fade toward the nearer wall from past mid
    if let (Some(s), Some(r)) = (support, resistance) {
        let mid = (s + r) / 2.0;
        if close > mid {
            return Some(
                Prediction::new(PredictionSource::Technical, SignalAction::Sell, 0.4)
                    .with_note(format!("upper half of {kind} channel")),
            );
        } else if close < mid {
            return Some(
                Prediction::new(PredictionSource::Technical, SignalAction::Buy, 0.4)
                    .with_note(format!("lower half of {kind} channel")),
            );
        }
    }
    None
}

/// GARCH(1,1) volatility band. Emits a HOLD-action prediction carrying the
/// band; the combiner uses it to modulate, never to vote a direction.
pub fn volatility_prediction(bars: &[Bar]) -> Option<Prediction> {
    let closes = closes(bars);
    let est = conditional_volatility(&closes)?;
    let band = est.band();
    let confidence = match band {
        market_core::VolatilityBand::High => 0.7,
        market_core::VolatilityBand::Low => 0.6,
        market_core::VolatilityBand::Normal => 0.5,
    };
    let mut p = Prediction::new(PredictionSource::Volatility, SignalAction::Hold, confidence)
        .with_note(format!("sigma={:.6} avg={:.6}", est.sigma, est.avg_sigma));
    p.volatility = Some(band);
    Some(p)
}

/// Aggregate advanced features into one fractional prediction.
pub fn features_prediction(bars: &[Bar]) -> Option<Prediction> {
    let closes = closes(bars);
    let mut bull = 0.0f64;
    let mut bear = 0.0f64;
    let mut notes: Vec<String> = Vec::new();
    let mut dampen = false;

    if let Some(adjusted_rsi) = rsi_with_divergence(&closes) {
        if adjusted_rsi < 30.0 {
            bull += 1.0;
            notes.push(format!("RSI oversold {adjusted_rsi:.0}"));
        } else if adjusted_rsi > 70.0 {
            bear += 1.0;
            notes.push(format!("RSI overbought {adjusted_rsi:.0}"));
        }
    }

    if let Some(m) = momentum_score(&closes) {
        if m > 0.005 {
            bull += 1.0;
            notes.push(format!("momentum {:+.2}%", m * 100.0));
        } else if m < -0.005 {
            bear += 1.0;
            notes.push(format!("momentum {:+.2}%", m * 100.0));
        }
    }

    if let Some(dev) = seasonal_deviation(bars) {
        if dev > 0.0 {
            bull += 0.5;
        } else if dev < 0.0 {
            bear += 0.5;
        }
    }

    match market_regime(&closes) {
        Some(MarketRegime::TrendingUp) => {
            bull += 1.0;
            notes.push("trending up".to_string());
        }
        Some(MarketRegime::TrendingDown) => {
            bear += 1.0;
            notes.push("trending down".to_string());
        }
        Some(MarketRegime::Volatile) => dampen = true,
        Some(MarketRegime::Ranging) | None => {}
    }

    if bull == 0.0 && bear == 0.0 {
        return None;
    }

    let (action, margin) = if bull > bear {
        (SignalAction::Buy, bull - bear)
    } else if bear > bull {
        (SignalAction::Sell, bear - bull)
    } else {
        return None;
    };

    let mut confidence = (0.4 + 0.1 * margin).min(0.9);
    // Volume expansion strengthens the reading, volatile regime weakens it
    if let Some(ratio) = volume_ratio(bars) {
        if ratio > 1.5 {
            confidence = (confidence + 0.1).min(0.9);
            notes.push(format!("volume x{ratio:.1}"));
        }
    }
    if dampen {
        confidence *= 0.8;
    }

    Some(Prediction::new(PredictionSource::Features, action, confidence).with_note(notes.join(", ")))
}

/// Run every analyzer over the window. Analyzers without an opinion are
/// simply absent from the result.
pub fn analyze_all(bars: &[Bar]) -> Vec<Prediction> {
    [
        ema_prediction(bars),
        sr_prediction(bars),
        trendline_prediction(bars),
        volatility_prediction(bars),
        features_prediction(bars),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Levels and trendlines for the execution planner's pending-entry logic.
pub fn entry_levels(bars: &[Bar]) -> (Levels, TrendLines) {
    (find_levels(bars, SR_WINDOW), find_trendlines(bars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let now = Utc::now();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                time: now - Duration::minutes(5 * (closes.len() - i) as i64),
                open: c,
                high: c * 1.001,
                low: c * 0.999,
                close: c,
                tick_volume: 100,
            })
            .collect()
    }

    #[test]
    fn uptrend_gives_an_ema_buy() {
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + i as f64 * 0.3).collect();
        let p = ema_prediction(&bars_from_closes(&closes)).unwrap();
        assert_eq!(p.action, SignalAction::Buy);
        // Confirmed by the long EMAs in a monotone uptrend
        assert!((p.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn downtrend_gives_an_ema_sell() {
        let closes: Vec<f64> = (0..250).map(|i| 200.0 - i as f64 * 0.3).collect();
        let p = ema_prediction(&bars_from_closes(&closes)).unwrap();
        assert_eq!(p.action, SignalAction::Sell);
    }

    #[test]
    fn chop_gives_no_ema_opinion() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + 5.0 * ((i % 2) as f64)).collect();
        assert!(ema_prediction(&bars_from_closes(&closes)).is_none());
    }

    #[test]
    fn price_at_support_is_a_buy() {
        // Drop to a trough, bounce, then come back down to the trough
        let mut closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64 * 0.7).collect();
        closes.extend((1..12).map(|i| 90.2 + i as f64 * 0.7));
        closes.extend((0..11).map(|i| 97.9 - i as f64 * 0.75));
        let p = sr_prediction(&bars_from_closes(&closes)).unwrap();
        assert_eq!(p.action, SignalAction::Buy);
        assert!((p.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn volatility_prediction_never_votes_direction() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + (i as f64 * 0.7).sin()).collect();
        let p = volatility_prediction(&bars_from_closes(&closes)).unwrap();
        assert_eq!(p.action, SignalAction::Hold);
        assert!(p.volatility.is_some());
    }

    #[test]
    fn analyzers_are_pure() {
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + (i as f64 * 0.31).sin() * 3.0).collect();
        let bars = bars_from_closes(&closes);
        let a = analyze_all(&bars);
        let b = analyze_all(&bars);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.action, y.action);
            assert_eq!(x.confidence, y.confidence);
            assert_eq!(x.source, y.source);
        }
    }

    #[test]
    fn short_window_yields_nothing() {
        let closes = vec![100.0, 101.0, 102.0];
        assert!(analyze_all(&bars_from_closes(&closes)).is_empty());
    }
}

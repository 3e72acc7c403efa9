//! Weighted voting over per-source predictions.
//!
//! Pure and deterministic: given the same predictions and category the
//! combiner always produces the same decision. The caller owns all I/O.

use chrono::Utc;
use tracing::debug;

use market_core::{
    CombinedSignal, Prediction, PredictionSource, SignalAction, SourceWeights, SymbolCategory,
    VolatilityBand,
};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.35;

const HIGH_ACCURACY_SHIFT: f64 = 0.15;
const LOW_ACCURACY_SHIFT: f64 = 0.05;

/// Per-category base weights. Technical carries the most weight
/// everywhere; boom-crash trusts the volatility and feature engines
/// least because spikes dominate their inputs.
pub fn base_weights(category: SymbolCategory) -> SourceWeights {
    match category {
        SymbolCategory::BoomCrash => SourceWeights {
            ml: 0.5,
            technical: 0.6,
            volatility: 0.05,
            features: 0.05,
        },
        SymbolCategory::Fx => SourceWeights {
            ml: 0.45,
            technical: 0.55,
            volatility: 0.1,
            features: 0.1,
        },
        _ => SourceWeights {
            ml: 0.4,
            technical: 0.6,
            volatility: 0.1,
            features: 0.1,
        },
    }
}

/// Shift ML weight on reported model accuracy, reallocating against
/// technical so the total voting mass stays put.
pub fn adjusted_weights(category: SymbolCategory, predictions: &[Prediction]) -> SourceWeights {
    let mut weights = base_weights(category);
    let accuracy = predictions
        .iter()
        .find(|p| p.source == PredictionSource::Ml)
        .and_then(|p| p.model_accuracy);

    match accuracy {
        Some(a) if a > 0.8 => {
            weights.ml += HIGH_ACCURACY_SHIFT;
            weights.technical = (weights.technical - HIGH_ACCURACY_SHIFT).max(0.0);
        }
        Some(a) if a < 0.65 => {
            weights.ml = (weights.ml - LOW_ACCURACY_SHIFT).max(0.0);
            weights.technical += LOW_ACCURACY_SHIFT;
        }
        _ => {}
    }
    weights
}

/// Combine one symbol's predictions into a single decision, or `None`
/// when no bucket clears `min_confidence` (or HOLD wins).
pub fn combine(
    symbol: &str,
    category: SymbolCategory,
    predictions: Vec<Prediction>,
    min_confidence: f64,
) -> Option<CombinedSignal> {
    if predictions.is_empty() {
        return None;
    }

    let weights = adjusted_weights(category, &predictions);

    let mut buy = 0.0f64;
    let mut sell = 0.0f64;
    let mut hold = 0.0f64;
    let mut volatility: Option<&Prediction> = None;

    for p in &predictions {
        // Volatility modulates after the direction votes are in
        if p.source == PredictionSource::Volatility {
            volatility = Some(p);
            continue;
        }
        let contribution = weights.for_source(p.source) * p.confidence;
        match p.action {
            SignalAction::Buy => buy += contribution,
            SignalAction::Sell => sell += contribution,
            SignalAction::Hold => hold += contribution,
        }
    }

    if let Some(vol) = volatility {
        match vol.volatility {
            Some(VolatilityBand::High) => {
                // A flat 0.8 x weight boost to whichever side already
                // leads; a dead heat gets no amplification at all
                let boost = 0.8 * weights.volatility;
                if buy > sell {
                    buy += boost;
                } else if sell > buy {
                    sell += boost;
                }
            }
            Some(VolatilityBand::Low) => hold += weights.volatility * vol.confidence,
            Some(VolatilityBand::Normal) | None => {}
        }
    }

    let total = buy + sell + hold;
    if total <= 0.0 {
        return None;
    }

    let (action, raw) = pick_winner(buy, sell, hold);
    let confidence = raw / total;

    debug!(
        "{} vote buy={:.3} sell={:.3} hold={:.3} -> {} @ {:.2}",
        symbol, buy, sell, hold, action, confidence
    );

    if action == SignalAction::Hold || confidence < min_confidence {
        return None;
    }

    Some(CombinedSignal {
        symbol: symbol.to_string(),
        action,
        confidence,
        components: predictions,
        weights,
        created_at: Utc::now(),
    })
}

/// Largest raw bucket wins; an exact numerical tie is a HOLD.
fn pick_winner(buy: f64, sell: f64, hold: f64) -> (SignalAction, f64) {
    if buy > sell && buy > hold {
        (SignalAction::Buy, buy)
    } else if sell > buy && sell > hold {
        (SignalAction::Sell, sell)
    } else if hold > buy && hold > sell {
        (SignalAction::Hold, hold)
    } else {
        (SignalAction::Hold, hold.max(buy).max(sell))
    }
}

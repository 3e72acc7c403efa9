//! Entry planning: turns a combined signal plus market snapshot into a
//! broker-ready order, or a typed rejection.

use broker_gateway::{BrokerPosition, OrderKind};
use indicator_engine::{Levels, TrendLines};
use market_core::{
    direction_lock, CategoryDefaults, CombinedSignal, FillMode, FillPreference, Side,
    SymbolCategory, SymbolInfo, TickQuote,
};
use tracing::debug;

use crate::config::AgentConfig;
use crate::types::{EntryPlan, PlanRejection};

/// Broker stops levels below this many points are treated as this floor
/// when validating SL/TP distance.
const MIN_STOP_FLOOR_POINTS: i32 = 10;

/// Everything the planner needs to see about the market right now.
pub struct PlanContext<'a> {
    pub info: &'a SymbolInfo,
    pub tick: &'a TickQuote,
    pub levels: &'a Levels,
    pub trendlines: &'a TrendLines,
    pub open_positions: &'a [BrokerPosition],
}

pub fn build_plan(
    signal: &CombinedSignal,
    ctx: &PlanContext<'_>,
    config: &AgentConfig,
) -> Result<EntryPlan, PlanRejection> {
    let side = signal.action.side().ok_or(PlanRejection::HoldSignal)?;

    if signal.confidence < config.min_confidence {
        return Err(PlanRejection::LowConfidence {
            confidence: signal.confidence,
            minimum: config.min_confidence,
        });
    }

    // Boom only ever spikes up, Crash down. Not overridable.
    if let Some(locked) = direction_lock(&signal.symbol) {
        if side != locked {
            return Err(PlanRejection::DirectionLocked {
                locked,
                requested: side,
            });
        }
    }

    if ctx.open_positions.len() >= config.max_positions {
        return Err(PlanRejection::MaxPositionsReached {
            open: ctx.open_positions.len(),
            cap: config.max_positions,
        });
    }
    if let Some(existing) = ctx.open_positions.iter().find(|p| p.symbol == signal.symbol) {
        return Err(PlanRejection::PositionExists {
            ticket: existing.ticket,
        });
    }

    let category = SymbolCategory::classify(&signal.symbol);
    let defaults = effective_defaults(category, config);

    let market_price = match side {
        Side::Buy => ctx.tick.ask,
        Side::Sell => ctx.tick.bid,
    };

    let (kind, entry) = match pending_entry(side, market_price, ctx, category, &defaults) {
        Some(level) => (OrderKind::PendingLimit, level),
        None => (OrderKind::Market, market_price),
    };

    let (sl, tp) = stop_levels(side, entry, &defaults, ctx.info);
    let volume = plan_volume(defaults.lot, ctx.info)?;
    let fill_mode = initial_fill_mode(&defaults, ctx.info);

    debug!(
        "{} plan: {} {} {:.2} lots @ {} sl={} tp={} fill={}",
        signal.symbol,
        kind.as_str(),
        side,
        volume,
        entry,
        sl,
        tp,
        fill_mode
    );

    Ok(EntryPlan {
        symbol: signal.symbol.clone(),
        category,
        side,
        kind,
        volume,
        price: entry,
        sl,
        tp,
        fill_mode,
        confidence: signal.confidence,
    })
}

fn effective_defaults(category: SymbolCategory, config: &AgentConfig) -> CategoryDefaults {
    let mut d = category.defaults();
    if category == SymbolCategory::Fx {
        if let Some(sl) = config.sl_pct_fx {
            d.sl_pct = sl;
        }
        if let Some(tp) = config.tp_pct_fx {
            d.tp_pct = tp;
        }
    } else {
        if let Some(sl) = config.sl_pct_default {
            d.sl_pct = sl;
        }
        if let Some(tp) = config.tp_pct_default {
            d.tp_pct = tp;
        }
    }
    d
}

/// A resting limit entry at the nearest favorable level, when the
/// category allows it and the level is close enough but not inside the
/// broker's stops distance.
fn pending_entry(
    side: Side,
    market_price: f64,
    ctx: &PlanContext<'_>,
    category: SymbolCategory,
    defaults: &CategoryDefaults,
) -> Option<f64> {
    if !category.allows_pending_entry() || market_price <= 0.0 {
        return None;
    }

    let candidates: Vec<f64> = match side {
        Side::Buy => [ctx.levels.nearest_support(market_price), ctx.trendlines.support]
            .into_iter()
            .flatten()
            .filter(|l| *l > 0.0 && *l < market_price)
            .collect(),
        Side::Sell => [
            ctx.levels.nearest_resistance(market_price),
            ctx.trendlines.resistance,
        ]
        .into_iter()
        .flatten()
        .filter(|l| *l > market_price)
        .collect(),
    };

    // Nearest to the current price wins
    let level = candidates
        .into_iter()
        .min_by(|a, b| {
            (a - market_price)
                .abs()
                .total_cmp(&(b - market_price).abs())
        })?;

    let distance = (market_price - level).abs();
    if distance / market_price > defaults.max_pending_distance_pct {
        return None;
    }
    if distance < ctx.info.stops_level_points.max(0) as f64 * ctx.info.point {
        return None;
    }
    Some(ctx.info.round_price(level))
}

/// SL/TP proportional to the entry, widened to respect the broker's
/// minimum stop distance and rounded to the symbol's digits.
fn stop_levels(side: Side, entry: f64, defaults: &CategoryDefaults, info: &SymbolInfo) -> (f64, f64) {
    let (mut sl, mut tp) = match side {
        Side::Buy => (entry * (1.0 - defaults.sl_pct), entry * (1.0 + defaults.tp_pct)),
        Side::Sell => (entry * (1.0 + defaults.sl_pct), entry * (1.0 - defaults.tp_pct)),
    };

    let min_distance = info.stops_level_points.max(MIN_STOP_FLOOR_POINTS) as f64 * info.point;
    let widened = min_distance + 2.0 * info.point;

    if (entry - sl).abs() < min_distance {
        sl = match side {
            Side::Buy => entry - widened,
            Side::Sell => entry + widened,
        };
    }
    if (tp - entry).abs() < min_distance {
        tp = match side {
            Side::Buy => entry + widened,
            Side::Sell => entry - widened,
        };
    }

    (info.round_price(sl), info.round_price(tp))
}

/// Category lot clamped to the broker's volume band and snapped to the
/// declared step.
fn plan_volume(lot: f64, info: &SymbolInfo) -> Result<f64, PlanRejection> {
    if info.volume_step <= 0.0 || info.min_volume <= 0.0 || info.max_volume < info.min_volume {
        return Err(PlanRejection::InvalidVolume {
            reason: format!(
                "broker volume band [{}, {}] step {} is unusable",
                info.min_volume, info.max_volume, info.volume_step
            ),
        });
    }

    let clamped = lot.clamp(info.min_volume, info.max_volume);
    let steps = (clamped / info.volume_step + 1e-9).floor();
    let snapped = steps * info.volume_step;
    let volume = snapped.clamp(info.min_volume, info.max_volume);
    // Kill float dust so the broker sees an exact step multiple
    Ok((volume / info.volume_step).round() * info.volume_step)
}

fn initial_fill_mode(defaults: &CategoryDefaults, info: &SymbolInfo) -> FillMode {
    match defaults.preferred_fill {
        FillPreference::Fixed(mode) => mode,
        FillPreference::BrokerDeclared => {
            if info.fill_mode_bitmask & FillMode::Fok.bit() != 0 {
                FillMode::Fok
            } else if info.fill_mode_bitmask & FillMode::Ioc.bit() != 0 {
                FillMode::Ioc
            } else if info.fill_mode_bitmask & FillMode::Return.bit() != 0 {
                FillMode::Return
            } else {
                FillMode::Fok
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use market_core::{PredictionSource, SignalAction, SourceWeights};

    fn signal(symbol: &str, action: SignalAction, confidence: f64) -> CombinedSignal {
        CombinedSignal {
            symbol: symbol.to_string(),
            action,
            confidence,
            components: vec![],
            weights: SourceWeights {
                ml: 0.45,
                technical: 0.55,
                volatility: 0.1,
                features: 0.1,
            },
            created_at: Utc::now(),
        }
    }

    fn tick(bid: f64, ask: f64) -> TickQuote {
        TickQuote {
            bid,
            ask,
            time: Utc::now(),
        }
    }

    fn boom_info() -> SymbolInfo {
        SymbolInfo {
            name: "Boom 500 Index".to_string(),
            digits: 2,
            point: 0.01,
            min_volume: 0.2,
            max_volume: 50.0,
            volume_step: 0.1,
            fill_mode_bitmask: FillMode::Fok.bit(),
            stops_level_points: 5,
        }
    }

    fn eurusd_info() -> SymbolInfo {
        SymbolInfo {
            name: "EURUSD".to_string(),
            digits: 5,
            point: 0.00001,
            min_volume: 0.01,
            max_volume: 100.0,
            volume_step: 0.01,
            fill_mode_bitmask: FillMode::Fok.bit(),
            stops_level_points: 10,
        }
    }

    fn empty_ctx<'a>(
        info: &'a SymbolInfo,
        tick: &'a TickQuote,
        levels: &'a Levels,
        lines: &'a TrendLines,
    ) -> PlanContext<'a> {
        PlanContext {
            info,
            tick,
            levels,
            trendlines: lines,
            open_positions: &[],
        }
    }

    #[test]
    fn boom_buy_market_plan() {
        let info = boom_info();
        let quote = tick(1000.00, 1000.10);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);
        let config = AgentConfig::default();

        let plan = build_plan(&signal("Boom 500 Index", SignalAction::Buy, 0.8), &ctx, &config)
            .unwrap();

        assert_eq!(plan.kind, OrderKind::Market);
        assert_eq!(plan.side, Side::Buy);
        assert!((plan.price - 1000.10).abs() < 1e-9);
        assert!((plan.sl - 980.10).abs() < 1e-9);
        assert!((plan.tp - 1040.10).abs() < 1e-9);
        assert!((plan.volume - 0.2).abs() < 1e-9);
        assert_eq!(plan.fill_mode, FillMode::Fok);
    }

    #[test]
    fn crash_buy_is_direction_locked() {
        let mut info = boom_info();
        info.name = "Crash 1000 Index".to_string();
        let quote = tick(5000.0, 5000.2);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);

        let err = build_plan(
            &signal("Crash 1000 Index", SignalAction::Buy, 0.9),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "direction_locked");
    }

    #[test]
    fn fx_pending_limit_at_support() {
        let info = eurusd_info();
        let quote = tick(1.10000, 1.10010);
        let levels = Levels {
            supports: vec![1.09900],
            resistances: vec![],
        };
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);

        let plan = build_plan(
            &signal("EURUSD", SignalAction::Buy, 0.7),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap();

        assert_eq!(plan.kind, OrderKind::PendingLimit);
        assert!((plan.price - 1.09900).abs() < 1e-9);
        assert!((plan.sl - 1.08801).abs() < 1e-9);
        assert!((plan.tp - 1.16494).abs() < 1e-9);
        assert_eq!(plan.fill_mode, FillMode::Fok);
    }

    #[test]
    fn distant_support_falls_back_to_market() {
        let info = eurusd_info();
        let quote = tick(1.10000, 1.10010);
        // 2% below ask, outside the 0.5% fx pending band
        let levels = Levels {
            supports: vec![1.078],
            resistances: vec![],
        };
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);

        let plan = build_plan(
            &signal("EURUSD", SignalAction::Buy, 0.7),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.kind, OrderKind::Market);
        assert!((plan.price - 1.10010).abs() < 1e-9);
    }

    #[test]
    fn support_inside_stops_distance_is_skipped() {
        let info = eurusd_info();
        let quote = tick(1.10000, 1.10010);
        // 5 points below ask, under the 10-point stops level
        let levels = Levels {
            supports: vec![1.10005],
            resistances: vec![],
        };
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);

        let plan = build_plan(
            &signal("EURUSD", SignalAction::Buy, 0.7),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.kind, OrderKind::Market);
    }

    #[test]
    fn stop_distance_invariant_holds() {
        let mut info = boom_info();
        // Huge stops level forces the widening path
        info.stops_level_points = 2500;
        let quote = tick(1000.00, 1000.10);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);

        let plan = build_plan(&signal("Boom 500 Index", SignalAction::Buy, 0.8), &ctx, &AgentConfig::default())
            .unwrap();

        let min_distance = 2500.0 * info.point;
        assert!((plan.price - plan.sl).abs() >= min_distance);
        assert!((plan.tp - plan.price).abs() >= min_distance);
    }

    #[test]
    fn volume_snaps_to_step() {
        let mut info = boom_info();
        info.min_volume = 0.15;
        info.volume_step = 0.15;
        let quote = tick(1000.00, 1000.10);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);

        let plan = build_plan(&signal("Boom 500 Index", SignalAction::Buy, 0.8), &ctx, &AgentConfig::default())
            .unwrap();
        let steps = plan.volume / info.volume_step;
        assert!((steps - steps.round()).abs() < 1e-6);
        assert!(plan.volume >= info.min_volume && plan.volume <= info.max_volume);
    }

    #[test]
    fn position_caps_apply() {
        let info = eurusd_info();
        let quote = tick(1.1, 1.1001);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let open: Vec<BrokerPosition> = (0..3)
            .map(|i| BrokerPosition {
                ticket: 100 + i,
                symbol: format!("SYM{i}"),
                side: Side::Buy,
                volume: 0.01,
                entry_price: 1.0,
                sl: 0.99,
                tp: 1.06,
                open_time: Utc::now(),
                current_price: 1.0,
                profit: 0.0,
            })
            .collect();
        let ctx = PlanContext {
            info: &info,
            tick: &quote,
            levels: &levels,
            trendlines: &lines,
            open_positions: &open,
        };

        let err = build_plan(
            &signal("EURUSD", SignalAction::Buy, 0.7),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "max_positions");
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let info = eurusd_info();
        let quote = tick(1.1, 1.1001);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let open = vec![BrokerPosition {
            ticket: 42,
            symbol: "EURUSD".to_string(),
            side: Side::Buy,
            volume: 0.01,
            entry_price: 1.09,
            sl: 1.08,
            tp: 1.15,
            open_time: Utc::now(),
            current_price: 1.1,
            profit: 1.0,
        }];
        let ctx = PlanContext {
            info: &info,
            tick: &quote,
            levels: &levels,
            trendlines: &lines,
            open_positions: &open,
        };

        let err = build_plan(
            &signal("EURUSD", SignalAction::Buy, 0.7),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "position_exists");
    }

    #[test]
    fn confidence_below_gate_is_rejected() {
        let info = eurusd_info();
        let quote = tick(1.1, 1.1001);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let ctx = empty_ctx(&info, &quote, &levels, &lines);

        let err = build_plan(
            &signal("EURUSD", SignalAction::Buy, 0.2),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "low_confidence");
    }

    #[test]
    fn sell_mirrors_stop_levels() {
        let info = boom_info();
        let mut crash = info.clone();
        crash.name = "Crash 500 Index".to_string();
        let quote = tick(8000.00, 8000.40);
        let levels = Levels::default();
        let lines = TrendLines::default();
        let ctx = empty_ctx(&crash, &quote, &levels, &lines);

        let plan = build_plan(
            &signal("Crash 500 Index", SignalAction::Sell, 0.8),
            &ctx,
            &AgentConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.side, Side::Sell);
        assert!((plan.price - 8000.00).abs() < 1e-9);
        assert!(plan.sl > plan.price);
        assert!(plan.tp < plan.price);
    }
}

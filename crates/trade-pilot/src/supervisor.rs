//! Open-position supervision: peak tracking, protective closes, trailing
//! stops and break-even moves.
//!
//! The broker is authoritative. A position only counts as closed when it
//! disappears from `positions_open`; failed modifies and closes are logged
//! and picked up again on the next tick.

use broker_gateway::{BrokerGateway, BrokerPosition};
use market_core::{PipelineResult, Side, SymbolInfo};
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::peak_store::PeakStore;
use crate::types::CloseReason;

/// Trailing SL moves must beat the current SL by this many points.
const TRAIL_IMPROVEMENT_POINTS: f64 = 10.0;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub trailing_activation_pct: f64,
    pub trailing_distance_pct: f64,
    pub peak_protect_ratio: f64,
    pub absolute_loss_floor: f64,
}

impl From<&AgentConfig> for SupervisorSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            trailing_activation_pct: config.trailing_activation_pct,
            trailing_distance_pct: config.trailing_distance_pct,
            peak_protect_ratio: config.peak_protect_ratio,
            absolute_loss_floor: config.absolute_loss_floor,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClosedPosition {
    pub ticket: u64,
    pub symbol: String,
    pub reason: CloseReason,
    pub profit: f64,
}

#[derive(Debug, Default)]
pub struct SupervisionReport {
    pub open: usize,
    pub closed: Vec<ClosedPosition>,
    pub modified: u64,
    pub errors: u64,
}

pub struct PositionSupervisor {
    settings: SupervisorSettings,
    peaks: PeakStore,
}

impl PositionSupervisor {
    pub fn new(settings: SupervisorSettings, peaks: PeakStore) -> Self {
        Self { settings, peaks }
    }

    pub fn peak(&self, ticket: u64) -> Option<f64> {
        self.peaks.get(ticket)
    }

    /// One supervision pass over everything the broker reports open.
    pub async fn tick(&mut self, gateway: &dyn BrokerGateway) -> PipelineResult<SupervisionReport> {
        let positions = gateway.positions_open().await?;
        let mut report = SupervisionReport {
            open: positions.len(),
            ..Default::default()
        };

        // Positions the broker no longer reports are gone; drop their peaks
        let live: Vec<u64> = positions.iter().map(|p| p.ticket).collect();
        self.peaks.retain_tickets(&live);

        for pos in &positions {
            let peak = self.peaks.record(pos.ticket, pos.profit);

            if pos.profit <= self.settings.absolute_loss_floor {
                self.close(gateway, pos, CloseReason::LossFloor, &mut report).await;
                continue;
            }

            if peak > 0.0 && (peak - pos.profit) >= self.settings.peak_protect_ratio * peak {
                self.close(gateway, pos, CloseReason::PeakProtection, &mut report).await;
                continue;
            }

            let symbol_info = match gateway.symbol_info(&pos.symbol).await {
                Ok(info) => info,
                Err(e) => {
                    warn!("No symbol info for {} ({}), skipping SL upkeep", pos.symbol, e);
                    report.errors += 1;
                    continue;
                }
            };

            let new_sl = self.desired_sl(pos, &symbol_info);
            if (new_sl - pos.sl).abs() > f64::EPSILON {
                match gateway.order_modify(pos.ticket, new_sl, pos.tp).await {
                    Ok(()) => {
                        info!(
                            "SL moved: #{} {} {} -> {}",
                            pos.ticket, pos.symbol, pos.sl, new_sl
                        );
                        report.modified += 1;
                    }
                    Err(e) => {
                        warn!("SL modify failed for #{} ({}), retrying next tick", pos.ticket, e);
                        report.errors += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn close(
        &mut self,
        gateway: &dyn BrokerGateway,
        pos: &BrokerPosition,
        reason: CloseReason,
        report: &mut SupervisionReport,
    ) {
        match gateway.position_close(pos.ticket).await {
            Ok(()) => {
                info!(
                    "Closed #{} {} {}: {} (profit {:.2})",
                    pos.ticket,
                    pos.symbol,
                    pos.side,
                    reason.label(),
                    pos.profit
                );
                self.peaks.remove(pos.ticket);
                report.closed.push(ClosedPosition {
                    ticket: pos.ticket,
                    symbol: pos.symbol.clone(),
                    reason,
                    profit: pos.profit,
                });
            }
            Err(e) => {
                warn!(
                    "Close failed for #{} ({}: {}), retrying next tick",
                    pos.ticket,
                    reason.label(),
                    e
                );
                report.errors += 1;
            }
        }
    }

    /// Trailing stop then break-even, never worsening the current SL.
    fn desired_sl(&self, pos: &BrokerPosition, info: &SymbolInfo) -> f64 {
        let mut new_sl = pos.sl;
        if pos.entry_price <= 0.0 {
            return new_sl;
        }

        let profit_pct = match pos.side {
            Side::Buy => (pos.current_price - pos.entry_price) / pos.entry_price,
            Side::Sell => (pos.entry_price - pos.current_price) / pos.entry_price,
        };

        if profit_pct >= self.settings.trailing_activation_pct {
            let candidate = info.round_price(match pos.side {
                Side::Buy => pos.current_price * (1.0 - self.settings.trailing_distance_pct),
                Side::Sell => pos.current_price * (1.0 + self.settings.trailing_distance_pct),
            });
            let improvement = TRAIL_IMPROVEMENT_POINTS * info.point;
            let better = match pos.side {
                Side::Buy => pos.sl <= 0.0 || candidate >= pos.sl + improvement,
                Side::Sell => pos.sl <= 0.0 || candidate <= pos.sl - improvement,
            };
            if better {
                new_sl = candidate;
            }
        }

        if self.halfway_to_tp(pos) {
            let break_even = info.round_price(pos.entry_price);
            new_sl = match pos.side {
                Side::Buy if new_sl <= 0.0 => break_even,
                Side::Buy => new_sl.max(break_even),
                Side::Sell if new_sl <= 0.0 => break_even,
                Side::Sell => new_sl.min(break_even),
            };
        }

        new_sl
    }

    fn halfway_to_tp(&self, pos: &BrokerPosition) -> bool {
        match pos.side {
            Side::Buy => {
                pos.tp > pos.entry_price
                    && (pos.current_price - pos.entry_price) / (pos.tp - pos.entry_price) >= 0.5
            }
            Side::Sell => {
                pos.tp < pos.entry_price
                    && pos.tp > 0.0
                    && (pos.entry_price - pos.current_price) / (pos.entry_price - pos.tp) >= 0.5
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_gateway::SimGateway;
    use chrono::Utc;
    use market_core::FillMode;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            trailing_activation_pct: 0.005,
            trailing_distance_pct: 0.003,
            peak_protect_ratio: 0.5,
            absolute_loss_floor: -6.0,
        }
    }

    fn fresh_store(tag: &str) -> PeakStore {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        PeakStore::load(std::env::temp_dir().join(format!(
            "supervisor-{tag}-{}-{nanos}.json",
            std::process::id()
        )))
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

    fn buy_position(ticket: u64, entry: f64, sl: f64, tp: f64, current: f64, profit: f64) -> BrokerPosition {
        BrokerPosition {
            ticket,
            symbol: "Boom 500 Index".to_string(),
            side: Side::Buy,
            volume: 0.2,
            entry_price: entry,
            sl,
            tp,
            open_time: Utc::now(),
            current_price: current,
            profit,
        }
    }

    #[tokio::test]
    async fn loss_floor_closes_same_tick() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(1, 1000.0, 980.0, 1040.0, 970.0, -6.0));

        let mut sup = PositionSupervisor::new(settings(), fresh_store("floor"));
        let report = sup.tick(&gw).await.unwrap();

        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, CloseReason::LossFloor);
        assert_eq!(gw.closed_tickets(), vec![1]);
        assert_eq!(sup.peak(1), None);
    }

    #[tokio::test]
    async fn peak_protection_closes_on_half_giveback() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(2, 1000.0, 980.0, 1040.0, 1010.0, 10.0));

        let mut sup = PositionSupervisor::new(settings(), fresh_store("peak"));
        sup.tick(&gw).await.unwrap();
        assert_eq!(sup.peak(2), Some(10.0));

        // Gave back 5.01 of a 10.00 peak
        gw.set_position_profit(2, 4.99, 1004.99);
        let report = sup.tick(&gw).await.unwrap();

        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, CloseReason::PeakProtection);
        assert_eq!(sup.peak(2), None);
    }

    #[tokio::test]
    async fn small_giveback_keeps_the_position() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(3, 1000.0, 980.0, 1040.0, 1010.0, 10.0));

        let mut sup = PositionSupervisor::new(settings(), fresh_store("hold"));
        sup.tick(&gw).await.unwrap();

        gw.set_position_profit(3, 5.01, 1005.01);
        let report = sup.tick(&gw).await.unwrap();
        assert!(report.closed.is_empty());
        assert!(gw.closed_tickets().is_empty());
    }

    #[tokio::test]
    async fn trailing_moves_sl_after_activation() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        // 1% up, activation is 0.5%
        gw.open_position(buy_position(4, 100.0, 98.0, 106.0, 101.0, 0.2));

        let mut sup = PositionSupervisor::new(settings(), fresh_store("trail"));
        let report = sup.tick(&gw).await.unwrap();

        assert_eq!(report.modified, 1);
        let mods = gw.modifications();
        assert_eq!(mods.len(), 1);
        // 101 * 0.997 = 100.697, rounded to 2 digits
        assert!((mods[0].1 - 100.70).abs() < 1e-9);
        assert!((mods[0].2 - 106.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn trailing_needs_a_ten_point_improvement() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(5, 100.0, 100.65, 106.0, 101.0, 0.2));

        let mut sup = PositionSupervisor::new(settings(), fresh_store("nomove"));
        let report = sup.tick(&gw).await.unwrap();
        // Candidate 100.70 is only 5 points better than 100.65
        assert_eq!(report.modified, 0);
        assert!(gw.modifications().is_empty());
    }

    #[tokio::test]
    async fn break_even_at_half_the_tp_distance() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(6, 100.0, 98.0, 106.0, 103.0, 0.6));

        let mut cfg = settings();
        // Keep trailing out of the way so break-even acts alone
        cfg.trailing_activation_pct = 0.5;
        let mut sup = PositionSupervisor::new(cfg, fresh_store("be"));
        let report = sup.tick(&gw).await.unwrap();

        assert_eq!(report.modified, 1);
        let mods = gw.modifications();
        assert!((mods[0].1 - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn break_even_never_worsens_sl() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(7, 100.0, 101.0, 106.0, 103.0, 0.6));

        let mut cfg = settings();
        cfg.trailing_activation_pct = 0.5;
        let mut sup = PositionSupervisor::new(cfg, fresh_store("worse"));
        let report = sup.tick(&gw).await.unwrap();
        assert_eq!(report.modified, 0);
    }

    #[tokio::test]
    async fn sell_side_trails_downward() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        let mut pos = buy_position(8, 100.0, 102.0, 96.0, 99.0, 0.2);
        pos.side = Side::Sell;
        gw.open_position(pos);

        let mut sup = PositionSupervisor::new(settings(), fresh_store("sell"));
        let report = sup.tick(&gw).await.unwrap();

        assert_eq!(report.modified, 1);
        // 99 * 1.003 = 99.297, rounded
        assert!((gw.modifications()[0].1 - 99.30).abs() < 1e-9);
    }

    #[tokio::test]
    async fn vanished_positions_lose_their_peaks() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(9, 1000.0, 980.0, 1040.0, 1002.0, 2.0));

        let mut sup = PositionSupervisor::new(settings(), fresh_store("gone"));
        sup.tick(&gw).await.unwrap();
        assert_eq!(sup.peak(9), Some(2.0));

        gw.remove_position(9);
        sup.tick(&gw).await.unwrap();
        assert_eq!(sup.peak(9), None);
    }

    #[tokio::test]
    async fn failed_close_is_retried_next_tick() {
        let gw = SimGateway::new();
        gw.add_symbol(boom_info());
        gw.open_position(buy_position(10, 1000.0, 980.0, 1040.0, 970.0, -8.0));
        gw.set_fail_close(true);

        let mut sup = PositionSupervisor::new(settings(), fresh_store("retry"));
        let report = sup.tick(&gw).await.unwrap();
        assert!(report.closed.is_empty());
        assert_eq!(report.errors, 1);

        gw.set_fail_close(false);
        let report = sup.tick(&gw).await.unwrap();
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, CloseReason::LossFloor);
    }
}

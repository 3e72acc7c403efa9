use std::collections::VecDeque;
use std::time::Instant;

use tracing::info;

use crate::types::CloseReason;

const RECENT_TRADE_WINDOW: usize = 20;

/// Aggregate counters and per-cycle timing for the agent. Dumped to the
/// log every `log_interval_cycles` cycles.
pub struct AgentMetrics {
    pub cycles_run: u64,
    pub signals_generated: u64,
    pub signals_gated: u64,
    pub plans_rejected: u64,
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub closes_loss_floor: u64,
    pub closes_peak_protect: u64,
    pub supervision_errors: u64,
    pub total_pnl: f64,
    pub last_cycle_duration_ms: u64,

    recent_trades: VecDeque<f64>,
    log_interval_cycles: u64,
}

impl AgentMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            cycles_run: 0,
            signals_generated: 0,
            signals_gated: 0,
            plans_rejected: 0,
            orders_submitted: 0,
            orders_filled: 0,
            orders_rejected: 0,
            closes_loss_floor: 0,
            closes_peak_protect: 0,
            supervision_errors: 0,
            total_pnl: 0.0,
            last_cycle_duration_ms: 0,
            recent_trades: VecDeque::with_capacity(RECENT_TRADE_WINDOW),
            log_interval_cycles,
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_cycle(&mut self, start: Instant) {
        self.last_cycle_duration_ms = start.elapsed().as_millis() as u64;
        self.cycles_run += 1;
        if self.log_interval_cycles > 0 && self.cycles_run % self.log_interval_cycles == 0 {
            self.log_summary();
        }
    }

    pub fn record_close(&mut self, reason: CloseReason, pnl: f64) {
        match reason {
            CloseReason::LossFloor => self.closes_loss_floor += 1,
            CloseReason::PeakProtection => self.closes_peak_protect += 1,
        }
        self.total_pnl += pnl;
        if self.recent_trades.len() == RECENT_TRADE_WINDOW {
            self.recent_trades.pop_front();
        }
        self.recent_trades.push_back(pnl);
    }

    /// Win rate over the rolling recent-trade window.
    pub fn recent_win_rate(&self) -> Option<f64> {
        if self.recent_trades.is_empty() {
            return None;
        }
        let wins = self.recent_trades.iter().filter(|p| **p > 0.0).count();
        Some(wins as f64 / self.recent_trades.len() as f64)
    }

    fn log_summary(&self) {
        info!(
            "Metrics: cycles={} signals={} gated={} plans_rejected={} submitted={} \
             filled={} rejected={} closes(floor={}, peak={}) pnl={:.2} \
             recent_wr={} last_cycle={}ms",
            self.cycles_run,
            self.signals_generated,
            self.signals_gated,
            self.plans_rejected,
            self.orders_submitted,
            self.orders_filled,
            self.orders_rejected,
            self.closes_loss_floor,
            self.closes_peak_protect,
            self.total_pnl,
            self.recent_win_rate()
                .map(|wr| format!("{:.0}%", wr * 100.0))
                .unwrap_or_else(|| "n/a".to_string()),
            self.last_cycle_duration_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_are_counted_by_reason() {
        let mut m = AgentMetrics::new(0);
        m.record_close(CloseReason::LossFloor, -6.2);
        m.record_close(CloseReason::PeakProtection, 4.99);
        assert_eq!(m.closes_loss_floor, 1);
        assert_eq!(m.closes_peak_protect, 1);
        assert!((m.total_pnl + 1.21).abs() < 1e-9);
    }

    #[test]
    fn recent_window_caps_at_twenty() {
        let mut m = AgentMetrics::new(0);
        for i in 0..30 {
            m.record_close(CloseReason::PeakProtection, if i % 2 == 0 { 1.0 } else { -1.0 });
        }
        assert_eq!(m.recent_trades.len(), RECENT_TRADE_WINDOW);
        assert_eq!(m.recent_win_rate(), Some(0.5));
    }

    #[test]
    fn empty_window_has_no_win_rate() {
        assert_eq!(AgentMetrics::new(0).recent_win_rate(), None);
    }
}

use broker_gateway::OrderKind;
use market_core::{FillMode, Side, SymbolCategory};
use serde::Serialize;

/// A fully-validated entry the submitter can send without further checks.
#[derive(Debug, Clone, Serialize)]
pub struct EntryPlan {
    pub symbol: String,
    pub category: SymbolCategory,
    pub side: Side,
    pub kind: OrderKind,
    pub volume: f64,
    pub price: f64,
    pub sl: f64,
    pub tp: f64,
    pub fill_mode: FillMode,
    /// Combined (and history-adjusted) confidence behind the entry
    pub confidence: f64,
}

/// Why the planner refused to produce a plan. Logged, never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanRejection {
    DirectionLocked { locked: Side, requested: Side },
    MaxPositionsReached { open: usize, cap: usize },
    PositionExists { ticket: u64 },
    LowConfidence { confidence: f64, minimum: f64 },
    HoldSignal,
    InvalidVolume { reason: String },
}

impl PlanRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            PlanRejection::DirectionLocked { .. } => "direction_locked",
            PlanRejection::MaxPositionsReached { .. } => "max_positions",
            PlanRejection::PositionExists { .. } => "position_exists",
            PlanRejection::LowConfidence { .. } => "low_confidence",
            PlanRejection::HoldSignal => "hold_signal",
            PlanRejection::InvalidVolume { .. } => "invalid_volume",
        }
    }
}

impl std::fmt::Display for PlanRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanRejection::DirectionLocked { locked, requested } => {
                write!(f, "direction_locked: {requested} requested, only {locked} allowed")
            }
            PlanRejection::MaxPositionsReached { open, cap } => {
                write!(f, "max_positions: {open} open, cap {cap}")
            }
            PlanRejection::PositionExists { ticket } => {
                write!(f, "position_exists: ticket #{ticket}")
            }
            PlanRejection::LowConfidence { confidence, minimum } => {
                write!(f, "low_confidence: {confidence:.2} < {minimum:.2}")
            }
            PlanRejection::HoldSignal => write!(f, "hold_signal"),
            PlanRejection::InvalidVolume { reason } => write!(f, "invalid_volume: {reason}"),
        }
    }
}

/// Why the supervisor closed a position. Labels are stable: they end up
/// in logs, deal comments and the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    LossFloor,
    PeakProtection,
}

impl CloseReason {
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::LossFloor => "Loss_6_Dollars",
            CloseReason::PeakProtection => "Protect_50_Percent_Gains",
        }
    }
}

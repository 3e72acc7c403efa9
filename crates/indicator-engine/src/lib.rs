pub mod analyzer;
pub mod features;
pub mod garch;
pub mod indicators;
pub mod levels;
pub mod trendlines;

pub use analyzer::*;
pub use features::MarketRegime;
pub use garch::GarchEstimate;
pub use levels::Levels;
pub use trendlines::TrendLines;

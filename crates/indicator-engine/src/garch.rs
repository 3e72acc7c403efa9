//! Simplified GARCH(1,1) conditional volatility.
//!
//! The estimate modulates combiner confidence; it never votes a direction
//! on its own.

use market_core::VolatilityBand;

use crate::indicators::{log_returns, variance};

const OMEGA: f64 = 1e-5;
const ALPHA: f64 = 0.1;
const BETA: f64 = 0.85;
const MIN_RETURNS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct GarchEstimate {
    /// Current conditional volatility (sigma of log-returns)
    pub sigma: f64,
    /// Mean conditional volatility over the window
    pub avg_sigma: f64,
}

impl GarchEstimate {
    pub fn band(&self) -> VolatilityBand {
        if self.avg_sigma <= 0.0 {
            return VolatilityBand::Normal;
        }
        if self.sigma > 1.5 * self.avg_sigma {
            VolatilityBand::High
        } else if self.sigma < 0.5 * self.avg_sigma {
            VolatilityBand::Low
        } else {
            VolatilityBand::Normal
        }
    }
}

/// Run the GARCH(1,1) recursion over the closes' log-returns.
/// Needs at least 50 returns; otherwise returns `None`.
pub fn conditional_volatility(closes: &[f64]) -> Option<GarchEstimate> {
    let returns = log_returns(closes);
    if returns.len() < MIN_RETURNS {
        return None;
    }

    // Seed with the sample variance of the window
    let mut sigma2 = variance(&returns)?.max(OMEGA);
    let mut sigmas = Vec::with_capacity(returns.len());

    for r in &returns {
        sigma2 = OMEGA + ALPHA * r * r + BETA * sigma2;
        sigmas.push(sigma2.sqrt());
    }

    let sigma = *sigmas.last()?;
    let avg_sigma = sigmas.iter().sum::<f64>() / sigmas.len() as f64;
    Some(GarchEstimate { sigma, avg_sigma })
}

//! Support/resistance levels from rolling local extrema.

use market_core::Bar;

/// Detected price levels, most recent last.
#[derive(Debug, Clone, Default)]
pub struct Levels {
    pub supports: Vec<f64>,
    pub resistances: Vec<f64>,
}

impl Levels {
    /// Nearest support strictly below `price`.
    pub fn nearest_support(&self, price: f64) -> Option<f64> {
        self.supports
            .iter()
            .copied()
            .filter(|s| *s < price)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Nearest resistance strictly above `price`.
    pub fn nearest_resistance(&self, price: f64) -> Option<f64> {
        self.resistances
            .iter()
            .copied()
            .filter(|r| *r > price)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Find local extrema over a rolling window. A bar is a support when its
/// low is the minimum of the `window` bars centered on it, a resistance
/// when its high is the maximum.
pub fn find_levels(bars: &[Bar], window: usize) -> Levels {
    let half = (window / 2).max(1);
    if bars.len() < 2 * half + 1 {
        return Levels::default();
    }

    let mut levels = Levels::default();
    for i in half..bars.len() - half {
        let neighborhood = &bars[i - half..=i + half];
        let low = bars[i].low;
        let high = bars[i].high;
        if neighborhood.iter().all(|b| b.low >= low) {
            levels.supports.push(low);
        }
        if neighborhood.iter().all(|b| b.high <= high) {
            levels.resistances.push(high);
        }
    }
    levels
}

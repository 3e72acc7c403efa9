//! Windowed indicator math. All functions are pure over their input slice.

/// Exponential Moving Average
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len());
    let multiplier = 2.0 / (period as f64 + 1.0);

    // Seed with the SMA of the first window
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result.push(seed);

    for value in &data[period..] {
        let prev = *result.last().unwrap_or(&seed);
        result.push((value - prev) * multiplier + prev);
    }

    result
}

/// Relative Strength Index
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::new();
    let mut losses = Vec::new();

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(gains.len() - period + 1);
    values.push(rsi_point(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        values.push(rsi_point(avg_gain, avg_loss));
    }

    values
}

fn rsi_point(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
}

/// Percentage change over the last `n` bars
pub fn momentum(data: &[f64], n: usize) -> Option<f64> {
    if n == 0 || data.len() <= n {
        return None;
    }
    let newest = *data.last()?;
    let base = data[data.len() - 1 - n];
    if base == 0.0 {
        return None;
    }
    Some((newest - base) / base)
}

/// Ordinary least squares over y with x = 0..n. Returns (slope, intercept, r²).
pub fn linear_regression(y: &[f64]) -> Option<(f64, f64, f64)> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (i, value) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = value - y_mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let r2 = if syy == 0.0 { 1.0 } else { (sxy * sxy) / (sxx * syy) };
    Some((slope, intercept, r2))
}

/// OLS fit over explicit (x, y) points. Returns (slope, intercept).
pub fn fit_line(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / nf;
    let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in points {
        sxy += (x - x_mean) * (y - y_mean);
        sxx += (x - x_mean) * (x - x_mean);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}

/// Log returns between consecutive closes
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

pub fn variance(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    if data.len() < 2 {
        return None;
    }
    Some(data.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (data.len() - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_tracks_a_constant_series() {
        let data = vec![5.0; 30];
        let result = ema(&data, 9);
        assert!(!result.is_empty());
        for v in result {
            assert!((v - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ema_needs_a_full_window() {
        assert!(ema(&[1.0, 2.0], 9).is_empty());
    }

    #[test]
    fn rsi_is_100_on_straight_gains() {
        let data: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let values = rsi(&data, 14);
        assert!((values.last().unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_low_on_straight_losses() {
        let data: Vec<f64> = (0..30).map(|i| 100.0 - i as f64 * 0.5).collect();
        let values = rsi(&data, 14);
        assert!(*values.last().unwrap() < 10.0);
    }

    #[test]
    fn momentum_measures_pct_change() {
        let data = vec![100.0, 101.0, 102.0, 103.0, 104.0, 110.0];
        let m = momentum(&data, 5).unwrap();
        assert!((m - 0.10).abs() < 1e-9);
    }

    #[test]
    fn regression_recovers_a_perfect_line() {
        let y: Vec<f64> = (0..50).map(|i| 3.0 + 2.0 * i as f64).collect();
        let (slope, intercept, r2) = linear_regression(&y).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 3.0).abs() < 1e-9);
        assert!((r2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fit_line_through_two_points() {
        let (slope, intercept) = fit_line(&[(0.0, 1.0), (2.0, 5.0)]).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }
}

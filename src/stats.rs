//! Pure statistical helpers used by the detector and for offline analysis.
//!
//! Every function here is deterministic and allocation is limited to the
//! series-returning helpers.

/// Arithmetic mean. An empty series has mean 0.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (Bessel-corrected, divides by `n - 1`).
/// Returns 0 for fewer than two values.
pub fn stddev(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = xs.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (xs.len() - 1) as f64).sqrt()
}

/// Signed distance of `value` from `mean` in standard deviations.
/// Zero spread yields a z-score of 0.
pub fn zscore(value: f64, mean: f64, stddev: f64) -> f64 {
    if stddev == 0.0 {
        return 0.0;
    }
    (value - mean) / stddev
}

/// Causal moving average: element `i` is the mean of the trailing
/// `min(i + 1, window_size)` values ending at `i`.
pub fn rolling_average(xs: &[f64], window_size: usize) -> Vec<f64> {
    if window_size == 0 {
        return Vec::new();
    }
    (0..xs.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window_size);
            mean(&xs[start..=i])
        })
        .collect()
}

/// Simple exponential smoothing, seeded with the first value.
pub fn exponential_smoothing(xs: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(xs.len());
    let mut iter = xs.iter();
    let Some(&first) = iter.next() else {
        return out;
    };
    out.push(first);
    let mut prev = first;
    for &x in iter {
        prev = alpha * x + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Batch z-score detection: one global mean/stddev over the series, then
/// each value is flagged when `|z| > threshold`.
pub fn detect_anomalies(xs: &[f64], threshold: f64) -> Vec<bool> {
    let m = mean(xs);
    let sd = stddev(xs, m);
    xs.iter()
        .map(|&v| zscore(v, m, sd).abs() > threshold)
        .collect()
}

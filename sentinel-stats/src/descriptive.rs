//! Descriptive statistics over price slices.
//!
//! All functions take `ArrayView1<f64>` so callers can pass a window's
//! prices without copying. Degenerate inputs (too few points, zero mean)
//! return neutral values instead of NaN.

use ndarray::ArrayView1;

/// Scale factor that makes the median absolute deviation a consistent
/// estimator of the standard deviation for normal data.
pub const MAD_SCALE: f64 = 1.4826;

/// Arithmetic mean, or `None` for an empty view.
pub fn mean(values: ArrayView1<f64>) -> Option<f64> {
    values.mean()
}

/// Sample standard deviation (ddof = 1). Returns 0.0 for fewer than two
/// values.
pub fn sample_std(values: ArrayView1<f64>) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.std(1.0)
}

/// Coefficient of variation: sample std / mean.
///
/// Returns 0.0 ("not computable") for fewer than two values, a zero mean, or
/// statistics that overflow.
pub fn coefficient_of_variation(values: ArrayView1<f64>) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let cv = match mean(values) {
        Some(m) if m != 0.0 && m.is_finite() => sample_std(values) / m,
        _ => 0.0,
    };
    if cv.is_finite() {
        cv
    } else {
        0.0
    }
}

/// Median of the values, or `None` for an empty view.
pub fn median(values: ArrayView1<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation around the median, unscaled.
pub fn median_absolute_deviation(values: ArrayView1<f64>) -> Option<f64> {
    let center = median(values)?;
    let deviations = ndarray::Array1::from_iter(values.iter().map(|v| (v - center).abs()));
    median(deviations.view())
}

/// Minimum and maximum, or `None` for an empty view.
pub fn min_max(values: ArrayView1<f64>) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

//! Trailing rolling z-scores and spike detection.
//!
//! Each point is compared against the trailing sub-window that ends at (and
//! includes) that point. Points with fewer than two observations available
//! get a z-score of 0.0.
//!
//! Because the point is part of its own statistics, a single outlier among
//! `n` observations can reach at most `|z| = (n - 1) / sqrt(n)` (about 2.27
//! for the default window of 7). The rolling std is therefore floored at a
//! fraction of the rolling mean as well as at an absolute epsilon, so a move
//! that is tiny relative to the price level never reaches that cap.

use ndarray::{s, ArrayView1};
use serde::Serialize;

use crate::descriptive::{mean, sample_std};

/// Most extreme rolling deviation found in a series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpikeSummary {
    /// Signed z-score with the largest magnitude (0.0 for an empty series).
    pub max_zscore: f64,
    /// Position of that point in the series, if any.
    pub index: Option<usize>,
    /// Whether `|max_zscore|` exceeds the threshold.
    pub detected: bool,
}

/// Compute the rolling z-score of every point.
///
/// `window` is clamped to at least 2. The rolling standard deviation is the
/// sample std, floored at `max(std_floor, relative_floor * |rolling mean|)`
/// before dividing. Non-finite results (overflowing prices) become 0.0.
pub fn rolling_zscores(
    values: ArrayView1<f64>,
    window: usize,
    std_floor: f64,
    relative_floor: f64,
) -> Vec<f64> {
    let window = window.max(2);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let sub = values.slice(s![start..i + 1]);
            if sub.len() < 2 {
                return 0.0;
            }
            let sd = sample_std(sub);
            // Constant sub-window: no deviation, whatever the rounded mean says.
            if sd == 0.0 {
                return 0.0;
            }
            let m = mean(sub).unwrap_or(values[i]);
            let floor = std_floor.max(relative_floor * m.abs());
            let z = (values[i] - m) / sd.max(floor);
            if z.is_finite() {
                z
            } else {
                0.0
            }
        })
        .collect()
}

/// Find the most extreme z-score and test it against `threshold`.
///
/// Ties on magnitude keep the earliest point.
pub fn summarize_spikes(zscores: &[f64], threshold: f64) -> SpikeSummary {
    let mut best: Option<(usize, f64)> = None;
    for (i, &z) in zscores.iter().enumerate() {
        match best {
            Some((_, b)) if z.abs() <= b.abs() => {}
            _ => best = Some((i, z)),
        }
    }
    match best {
        Some((index, z)) => SpikeSummary {
            max_zscore: z,
            index: Some(index),
            detected: z.abs() > threshold,
        },
        None => SpikeSummary {
            max_zscore: 0.0,
            index: None,
            detected: false,
        },
    }
}

/// Indices of every point whose `|z|` exceeds the threshold.
pub fn spike_indices(zscores: &[f64], threshold: f64) -> Vec<usize> {
    zscores
        .iter()
        .enumerate()
        .filter(|(_, z)| z.abs() > threshold)
        .map(|(i, _)| i)
        .collect()
}

//! Window metrics: drop %, volatility, and rolling z-score spike detection.
//!
//! The anomaly score is left at 0.0 here and filled in by
//! [`crate::anomaly::AnomalyScorer`].

use sentinel_stats::descriptive::coefficient_of_variation;
use sentinel_stats::rolling::{rolling_zscores, summarize_spikes};
use sentinel_stats::thresholds::{ZSCORE_RELATIVE_STD_FLOOR, ZSCORE_STD_FLOOR};

use crate::config::DetectionConfig;
use crate::types::{Metrics, Window};

/// Fractional discount from `claimed_original` to `eval_price`.
///
/// Negative when the claimed original is below the evaluation price; 0.0 for
/// a non-positive claimed price.
pub fn drop_pct(claimed_original: f64, eval_price: f64) -> f64 {
    if claimed_original > 0.0 {
        (claimed_original - eval_price) / claimed_original
    } else {
        0.0
    }
}

#[derive(Clone, Debug)]
pub struct MetricsCalculator {
    rolling_window: usize,
    spike_z_threshold: f64,
    volatility_ceiling: f64,
}

impl MetricsCalculator {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            rolling_window: config.rolling_window,
            spike_z_threshold: config.spike_z_threshold,
            volatility_ceiling: config.volatility_ceiling,
        }
    }

    /// Compute the window metrics and the rolling z-score of every window
    /// record (aligned with `window.records`).
    pub fn compute(&self, window: &Window, eval_price: f64, claimed_original: f64) -> (Metrics, Vec<f64>) {
        let prices = window.prices();
        let volatility = coefficient_of_variation(prices.view());
        if window.len() >= 2 && volatility == 0.0 {
            log::debug!("flat or zero-mean window, volatility=0");
        }
        let zscores = rolling_zscores(
            prices.view(),
            self.rolling_window,
            ZSCORE_STD_FLOOR,
            ZSCORE_RELATIVE_STD_FLOOR,
        );
        let spikes = summarize_spikes(&zscores, self.spike_z_threshold);

        let metrics = Metrics {
            drop_pct: drop_pct(claimed_original, eval_price),
            volatility,
            volatility_score: (volatility / self.volatility_ceiling).clamp(0.0, 1.0),
            spike_detected: spikes.detected,
            spike_zscore: spikes.max_zscore,
            anomaly_score: 0.0,
        };
        (metrics, zscores)
    }
}

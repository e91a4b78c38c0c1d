//! Anomaly scoring of the evaluation price against its window.
//!
//! Each window record becomes one sample row: `[price]`, or
//! `[price, day-over-day delta]` when the delta feature is enabled (the
//! first row's delta is 0). The evaluation point's delta is measured from
//! the last window price. The model is refit on every call.

use ndarray::{Array1, Array2, Axis};
use sentinel_stats::outlier::fit_and_score;

use crate::config::{AnomalyConfig, AnomalyModelKind};
use crate::types::Window;

#[derive(Clone, Debug)]
pub struct AnomalyScorer {
    config: AnomalyConfig,
}

impl AnomalyScorer {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Score `eval_price` in `[0, 1]`, higher = more anomalous. Windows
    /// smaller than the model minimum or without spread score 0.0.
    pub fn score(&self, window: &Window, eval_price: f64) -> f64 {
        let (samples, point) = self.features(window, eval_price);
        let score = match self.config.model {
            AnomalyModelKind::IsolationForest => {
                fit_and_score(&self.config.isolation_forest(), samples.view(), point.view())
            }
            AnomalyModelKind::RobustZscore => {
                fit_and_score(&self.config.robust_zscore(), samples.view(), point.view())
            }
        };
        log::debug!(
            "model={:?} samples={} eval_price={:.2} anomaly_score={:.3}",
            self.config.model,
            samples.nrows(),
            eval_price,
            score
        );
        score
    }

    fn features(&self, window: &Window, eval_price: f64) -> (Array2<f64>, Array1<f64>) {
        let prices = window.prices();
        if !self.config.use_delta_feature {
            return (prices.insert_axis(Axis(1)), Array1::from(vec![eval_price]));
        }

        let mut samples = Array2::zeros((prices.len(), 2));
        let mut previous = None;
        for (i, &price) in prices.iter().enumerate() {
            samples[[i, 0]] = price;
            samples[[i, 1]] = previous.map_or(0.0, |p| price - p);
            previous = Some(price);
        }
        let delta = window.last_price().map_or(0.0, |p| eval_price - p);
        (samples, Array1::from(vec![eval_price, delta]))
    }
}

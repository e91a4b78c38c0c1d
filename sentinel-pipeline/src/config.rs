//! Detection configuration.
//!
//! Passed explicitly into the orchestrator; nothing reads thresholds from
//! global state. Every field has a serde default, so a JSON file only needs
//! the keys it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sentinel_stats::outlier::{IsolationForest, RobustZScore};
use sentinel_stats::thresholds::*;

use crate::error::{DetectionError, Result};
use crate::types::EvaluationMode;

/// Which outlier model scores the evaluation price.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyModelKind {
    #[default]
    IsolationForest,
    RobustZscore,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub model: AnomalyModelKind,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
    /// Fewest window records the model is fit on.
    pub min_samples: usize,
    /// Score at or above which the evaluation price counts as an outlier.
    pub score_threshold: f64,
    /// Add the day-over-day price change as a second feature.
    pub use_delta_feature: bool,
    /// Robust z at which the robust model scores 0.5.
    pub robust_scale: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            model: AnomalyModelKind::default(),
            n_estimators: IFOREST_N_ESTIMATORS,
            max_samples: IFOREST_MAX_SAMPLES,
            seed: IFOREST_RANDOM_STATE,
            min_samples: MIN_ANOMALY_SAMPLES,
            score_threshold: ANOMALY_SCORE_THRESHOLD,
            use_delta_feature: true,
            robust_scale: RobustZScore::default().scale,
        }
    }
}

impl AnomalyConfig {
    pub fn isolation_forest(&self) -> IsolationForest {
        IsolationForest {
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            seed: self.seed,
            min_samples: self.min_samples,
        }
    }

    pub fn robust_zscore(&self) -> RobustZScore {
        RobustZScore {
            scale: self.robust_scale,
            min_samples: self.min_samples,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub drop_threshold: f64,
    pub spike_z_threshold: f64,
    pub window_days: u32,
    pub rolling_window: usize,
    pub volatility_ceiling: f64,
    pub high_volatility_score: f64,
    pub min_records_historical: usize,
    pub min_records_realtime: usize,
    /// Catalog scans skip products with fewer distinct price days.
    pub min_history_days: usize,
    pub anomaly: AnomalyConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            drop_threshold: DROP_THRESHOLD,
            spike_z_threshold: SPIKE_Z_THRESHOLD,
            window_days: RECENT_WINDOW_DAYS,
            rolling_window: ROLLING_WINDOW,
            volatility_ceiling: VOLATILITY_CEILING,
            high_volatility_score: HIGH_VOLATILITY_SCORE,
            min_records_historical: MIN_RECORDS_HISTORICAL,
            min_records_realtime: MIN_RECORDS_REALTIME,
            min_history_days: MIN_HISTORY_DAYS,
            anomaly: AnomalyConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Minimum window size below which the result is `LimitedData`.
    pub fn min_records(&self, mode: EvaluationMode) -> usize {
        match mode {
            EvaluationMode::Historical => self.min_records_historical,
            EvaluationMode::RealTime => self.min_records_realtime,
        }
    }

    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DetectionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> DetectionError {
            DetectionError::InvalidConfig {
                field,
                reason: reason.into(),
            }
        }

        if !(self.drop_threshold > 0.0 && self.drop_threshold < 1.0) {
            return Err(invalid("drop_threshold", format!("{} not in (0, 1)", self.drop_threshold)));
        }
        if !(self.spike_z_threshold.is_finite() && self.spike_z_threshold > 0.0) {
            return Err(invalid("spike_z_threshold", "must be positive"));
        }
        if self.window_days == 0 {
            return Err(invalid("window_days", "must be at least 1"));
        }
        if self.rolling_window < 2 {
            return Err(invalid("rolling_window", "must be at least 2"));
        }
        if !(self.volatility_ceiling.is_finite() && self.volatility_ceiling > 0.0) {
            return Err(invalid("volatility_ceiling", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.high_volatility_score) {
            return Err(invalid("high_volatility_score", "must be in [0, 1]"));
        }
        if self.min_records_historical == 0 || self.min_records_realtime == 0 {
            return Err(invalid("min_records", "must be at least 1"));
        }
        if self.anomaly.n_estimators == 0 || self.anomaly.max_samples < 2 {
            return Err(invalid("anomaly", "need at least one tree and two samples per tree"));
        }
        if !(0.0..=1.0).contains(&self.anomaly.score_threshold) {
            return Err(invalid("anomaly.score_threshold", "must be in [0, 1]"));
        }
        if !(self.anomaly.robust_scale.is_finite() && self.anomaly.robust_scale > 0.0) {
            return Err(invalid("anomaly.robust_scale", "must be positive"));
        }
        Ok(())
    }
}

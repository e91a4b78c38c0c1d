//! Centralized detection defaults for discount classification.
//!
//! These are the values a `DetectionConfig` starts from. Changing a default
//! here affects both the metric calculations (spike detection, volatility
//! scoring) and the decision rules in `sentinel-pipeline/decision.rs`.

/// Fractional drop from the claimed original price at or above which a
/// discount counts as "large" (0.20 = 20%).
pub const DROP_THRESHOLD: f64 = 0.20;

/// Absolute rolling z-score above which a price point is a spike.
pub const SPIKE_Z_THRESHOLD: f64 = 2.0;

/// Look-back window in calendar days.
pub const RECENT_WINDOW_DAYS: u32 = 90;

/// Number of trailing observations in each rolling z-score sub-window.
pub const ROLLING_WINDOW: usize = 7;

/// Floor applied to a rolling standard deviation before dividing by it.
pub const ZSCORE_STD_FLOOR: f64 = 1e-9;

/// Floor applied to a rolling standard deviation, as a fraction of the
/// rolling mean. Moves much smaller than 1% of the price level never
/// register as spikes.
pub const ZSCORE_RELATIVE_STD_FLOOR: f64 = 0.01;

/// Coefficient of variation that maps to a volatility score of 1.0.
pub const VOLATILITY_CEILING: f64 = 0.35;

/// Volatility score at or above which a window counts as highly volatile.
/// With the default ceiling this is a CV of 0.175.
pub const HIGH_VOLATILITY_SCORE: f64 = 0.5;

/// Minimum window size for a historical evaluation.
pub const MIN_RECORDS_HISTORICAL: usize = 5;

/// Minimum window size for a real-time evaluation. Lower than the
/// historical minimum because the window is anchored to the dataset end.
pub const MIN_RECORDS_REALTIME: usize = 3;

/// Number of isolation trees per forest.
pub const IFOREST_N_ESTIMATORS: usize = 100;

/// Maximum sub-sample drawn for each isolation tree.
pub const IFOREST_MAX_SAMPLES: usize = 256;

/// Base seed for reproducible forests.
pub const IFOREST_RANDOM_STATE: u64 = 42;

/// Fewest window records an outlier model will fit on. Below this the
/// anomaly score is neutral (0.0).
pub const MIN_ANOMALY_SAMPLES: usize = 5;

/// Anomaly score at or above which the evaluation price counts as an
/// outlier vote in the decision rules.
pub const ANOMALY_SCORE_THRESHOLD: f64 = 0.6;

/// Products with fewer distinct price days than this are left out of
/// catalog scans.
pub const MIN_HISTORY_DAYS: usize = 30;

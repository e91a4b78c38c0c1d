//! Statistical primitives behind discount detection.
//!
//! Pure numeric code with no domain types: descriptive statistics, rolling
//! z-scores for spike detection, and the outlier models used to score an
//! evaluation price against its recent history.

pub mod descriptive;
pub mod math;
pub mod outlier;
pub mod rolling;
pub mod thresholds;

pub use descriptive::{coefficient_of_variation, mean, sample_std};
pub use outlier::{fit_and_score, IsolationForest, OutlierModel, RobustZScore};
pub use rolling::{rolling_zscores, spike_indices, summarize_spikes, SpikeSummary};

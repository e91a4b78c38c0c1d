//! Fake-discount detection over daily price histories.
//!
//! `DetectionOrchestrator` is the entry point: it selects the recent window,
//! computes drop, volatility and spike metrics, scores the evaluation price
//! for anomalies, and classifies the discount. `price_loader` builds the
//! histories from purchase CSVs and `batch` scans whole catalogs.

pub mod anomaly;
pub mod batch;
pub mod config;
pub mod decision;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod price_loader;
pub mod types;
pub mod window;

pub use anomaly::AnomalyScorer;
pub use batch::{rank, scan, ScanEntry};
pub use config::{AnomalyConfig, AnomalyModelKind, DetectionConfig};
pub use decision::{anchoring_note, DecisionEngine};
pub use detector::{analyze, resolve_mode, DetectionOrchestrator};
pub use error::{DetectionError, Result};
pub use metrics::{drop_pct, MetricsCalculator};
pub use price_loader::{load_catalog, load_catalog_file, LoadStats, PriceCatalog, PurchaseRow};
pub use types::{
    DetectionReport, DetectionResult, DiscountStatus, EvaluationContext, EvaluationMode, Metrics,
    PriceHistory, PriceRecord, Signals, Window,
};
pub use window::WindowSelector;

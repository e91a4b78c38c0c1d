use std::fmt;

use chrono::{Days, NaiveDate};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

/// One daily mean price.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub price: f64,
}

impl PriceRecord {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// A product's daily price records, validated on construction: every price
/// is finite and positive and dates never decrease.
///
/// An empty history is allowed; detection treats it as limited data.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PriceHistory {
    records: Vec<PriceRecord>,
}

impl PriceHistory {
    /// Validate and wrap `records`.
    pub fn new(records: Vec<PriceRecord>) -> Result<Self> {
        for record in &records {
            if !(record.price.is_finite() && record.price > 0.0) {
                return Err(DetectionError::NonPositivePrice {
                    date: record.date,
                    price: record.price,
                });
            }
        }
        if let Some(pair) = records.windows(2).find(|w| w[1].date < w[0].date) {
            return Err(DetectionError::UnorderedHistory {
                previous: pair[0].date,
                next: pair[1].date,
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Number of distinct calendar days with a price.
    pub fn distinct_days(&self) -> usize {
        let mut days = self.records.iter().map(|r| r.date).collect::<Vec<_>>();
        days.dedup();
        days.len()
    }

    /// The latest record dated on or before `date`.
    pub fn record_on_or_before(&self, date: NaiveDate) -> Option<&PriceRecord> {
        let idx = self.records.partition_point(|r| r.date <= date);
        idx.checked_sub(1).map(|i| &self.records[i])
    }

    /// Records with `start <= date <= end`.
    pub fn between_inclusive(&self, start: NaiveDate, end: NaiveDate) -> &[PriceRecord] {
        let lo = self.records.partition_point(|r| r.date < start);
        let hi = self.records.partition_point(|r| r.date <= end);
        &self.records[lo..hi.max(lo)]
    }

    /// Records with `start <= date < end`.
    pub fn between_half_open(&self, start: NaiveDate, end: NaiveDate) -> &[PriceRecord] {
        let lo = self.records.partition_point(|r| r.date < start);
        let hi = self.records.partition_point(|r| r.date < end);
        &self.records[lo..hi.max(lo)]
    }
}

/// `date - days`, saturating at the earliest representable date.
pub(crate) fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

// ---------------------------------------------------------------------------
// Evaluation request
// ---------------------------------------------------------------------------

/// How the evaluation date relates to the dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationMode {
    /// The evaluation date lies within the dataset's date range.
    Historical,
    /// The evaluation date is a user-supplied "today" past the dataset end;
    /// the window is anchored to the last dataset date.
    RealTime,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMode::Historical => write!(f, "historical"),
            EvaluationMode::RealTime => write!(f, "real-time"),
        }
    }
}

/// A single analysis request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Pinned mode. `None` lets the orchestrator resolve it from the
    /// evaluation date and the history.
    pub mode: Option<EvaluationMode>,
    pub eval_date: NaiveDate,
    pub current_price: f64,
    pub claimed_original_price: f64,
}

impl EvaluationContext {
    pub fn new(eval_date: NaiveDate, current_price: f64, claimed_original_price: f64) -> Self {
        Self {
            mode: None,
            eval_date,
            current_price,
            claimed_original_price,
        }
    }

    /// Pin the evaluation mode instead of resolving it from the history.
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Derive a historical request from the dataset alone.
    ///
    /// The current price is the dataset price on `eval_date` (or on the
    /// closest earlier day with data, which then becomes the evaluation
    /// date). The claimed original is the highest price in
    /// `[eval_date - window_days, eval_date]`.
    pub fn from_history(history: &PriceHistory, eval_date: NaiveDate, window_days: u32) -> Result<Self> {
        let anchor = history
            .record_on_or_before(eval_date)
            .ok_or(DetectionError::NoRecordOnOrBefore(eval_date))?;
        if anchor.date != eval_date {
            log::info!(
                "no price on {}; using closest previous date {}",
                eval_date,
                anchor.date
            );
        }
        let recent_high = history
            .between_inclusive(days_before(anchor.date, window_days), anchor.date)
            .iter()
            .map(|r| r.price)
            .fold(anchor.price, f64::max);

        Ok(Self::new(anchor.date, anchor.price, recent_high).with_mode(EvaluationMode::Historical))
    }

    /// Reject prices that are not finite and positive.
    pub fn validate(&self) -> Result<()> {
        check_price("current_price", self.current_price)?;
        check_price("claimed_original_price", self.claimed_original_price)
    }
}

fn check_price(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DetectionError::InvalidContextPrice { field, value })
    }
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// The recent-history slice a detection runs over.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Window {
    pub mode: EvaluationMode,
    /// First date the window may contain.
    pub start: NaiveDate,
    /// Effective "today": the evaluation date (historical, exclusive) or the
    /// last dataset date (real-time, inclusive).
    pub anchor: NaiveDate,
    pub records: Vec<PriceRecord>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn prices(&self) -> Array1<f64> {
        self.records.iter().map(|r| r.price).collect()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.records.last().map(|r| r.price)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Metrics computed over a window. Fractions, not percentages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    /// `(claimed - current) / claimed`; negative when there is no discount.
    pub drop_pct: f64,
    /// Coefficient of variation of the window prices.
    pub volatility: f64,
    /// `volatility / ceiling`, clamped to `[0, 1]`.
    pub volatility_score: f64,
    pub spike_detected: bool,
    /// Signed rolling z-score with the largest magnitude in the window.
    pub spike_zscore: f64,
    /// Outlier score of the evaluation price, `[0, 1]`.
    pub anomaly_score: f64,
}

/// The final classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountStatus {
    Genuine,
    Suspicious,
    NoDiscount,
    LimitedData,
}

impl fmt::Display for DiscountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountStatus::Genuine => write!(f, "Genuine"),
            DiscountStatus::Suspicious => write!(f, "Suspicious"),
            DiscountStatus::NoDiscount => write!(f, "No Discount"),
            DiscountStatus::LimitedData => write!(f, "Limited Data"),
        }
    }
}

/// Which conditions a set of metrics satisfies.
///
/// Only the first three vote in the mixed-signal rule; `anomalous` is
/// reported alongside them but never changes the status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Signals {
    pub large_drop: bool,
    pub spike: bool,
    pub high_volatility: bool,
    pub anomalous: bool,
}

impl Signals {
    /// Number of voting conditions.
    pub const VOTERS: usize = 3;

    pub fn suspicious_votes(&self) -> usize {
        [self.large_drop, self.spike, self.high_volatility]
            .iter()
            .filter(|&&v| v)
            .count()
    }

    /// Names of the voting conditions that fired.
    pub fn active(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.large_drop {
            names.push("large drop");
        }
        if self.spike {
            names.push("price spike");
        }
        if self.high_volatility {
            names.push("high volatility");
        }
        names
    }
}

/// Status plus the numbers that justify it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    pub status: DiscountStatus,
    pub metrics: Metrics,
    /// All false for `NoDiscount` and `LimitedData`, which stop before the
    /// signals are evaluated.
    pub signals: Signals,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchoring_note: Option<String>,
}

/// Everything a chart or UI needs to render one detection: the result, the
/// window it ran over, the rolling z-scores aligned with the window records,
/// and the records flagged as spikes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionReport {
    pub result: DetectionResult,
    pub mode: EvaluationMode,
    pub eval_date: NaiveDate,
    pub current_price: f64,
    pub claimed_original_price: f64,
    pub window: Window,
    pub rolling_zscores: Vec<f64>,
    pub spikes: Vec<PriceRecord>,
}

impl DetectionReport {
    pub fn status(&self) -> DiscountStatus {
        self.result.status
    }

    /// Plain-language explanation for end users. Every sentence about a
    /// spike, volatility, or the anomaly score follows the signals that fired.
    pub fn narrative(&self) -> String {
        let m = &self.result.metrics;
        let signals = &self.result.signals;
        let mut sentences = match self.result.status {
            DiscountStatus::Suspicious => vec![format!(
                "The discount appears suspicious. The price dropped {:.1}% from a claimed \
                 original of {:.2} to the current price of {:.2}.",
                m.drop_pct * 100.0,
                self.claimed_original_price,
                self.current_price,
            )],
            DiscountStatus::Genuine => vec![format!(
                "The discount appears genuine. The price dropped {:.1}% from a claimed \
                 original of {:.2} to the current price of {:.2}.",
                m.drop_pct * 100.0,
                self.claimed_original_price,
                self.current_price,
            )],
            DiscountStatus::NoDiscount | DiscountStatus::LimitedData => {
                return self.result.explanation.clone();
            }
        };

        if signals.spike {
            sentences.push(format!(
                "A price spike was detected in the recent history (max z-score {:.2}).",
                m.spike_zscore
            ));
        } else {
            sentences.push("No price spike was detected in the recent history.".to_string());
        }
        if signals.high_volatility {
            sentences.push(format!(
                "Recent prices were highly volatile (volatility score {:.2}).",
                m.volatility_score
            ));
        } else {
            sentences.push(format!(
                "Recent prices were stable (volatility score {:.2}).",
                m.volatility_score
            ));
        }
        if signals.anomalous {
            sentences.push(format!(
                "The current price is unusual for this product (anomaly score {:.2}).",
                m.anomaly_score
            ));
        }

        match self.result.status {
            DiscountStatus::Suspicious => sentences
                .push("Together these suggest the original price may have been inflated.".to_string()),
            _ if signals.suspicious_votes() > 0 => sentences.push(format!(
                "Only {} of {} warning signs fired ({}), not enough to call it suspicious.",
                signals.suspicious_votes(),
                Signals::VOTERS,
                signals.active().join(", ")
            )),
            _ => {}
        }

        if let Some(note) = &self.result.anchoring_note {
            sentences.push(note.clone());
        }
        sentences.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn history(points: &[(&str, f64)]) -> PriceHistory {
        PriceHistory::new(points.iter().map(|(s, p)| PriceRecord::new(d(s), *p)).collect()).unwrap()
    }

    #[test]
    fn rejects_non_positive_prices() {
        let err = PriceHistory::new(vec![PriceRecord::new(d("2024-01-01"), 0.0)]).unwrap_err();
        assert!(matches!(err, DetectionError::NonPositivePrice { .. }));
        let err = PriceHistory::new(vec![PriceRecord::new(d("2024-01-01"), f64::NAN)]).unwrap_err();
        assert!(matches!(err, DetectionError::NonPositivePrice { .. }));
    }

    #[test]
    fn rejects_unordered_dates() {
        let err = PriceHistory::new(vec![
            PriceRecord::new(d("2024-01-02"), 10.0),
            PriceRecord::new(d("2024-01-01"), 10.0),
        ])
        .unwrap_err();
        assert!(matches!(err, DetectionError::UnorderedHistory { .. }));
    }

    #[test]
    fn empty_history_is_valid() {
        let h = PriceHistory::new(Vec::new()).unwrap();
        assert!(h.is_empty());
        assert_eq!(h.last_date(), None);
    }

    #[test]
    fn range_queries_respect_bounds() {
        let h = history(&[
            ("2024-01-01", 1.0),
            ("2024-01-03", 2.0),
            ("2024-01-05", 3.0),
        ]);
        assert_eq!(h.between_inclusive(d("2024-01-03"), d("2024-01-05")).len(), 2);
        assert_eq!(h.between_half_open(d("2024-01-03"), d("2024-01-05")).len(), 1);
        assert!(h.between_half_open(d("2024-02-01"), d("2024-01-01")).is_empty());
        assert_eq!(h.record_on_or_before(d("2024-01-04")).unwrap().price, 2.0);
        assert!(h.record_on_or_before(d("2023-12-31")).is_none());
    }

    #[test]
    fn from_history_uses_recent_high_as_claimed_price() {
        let h = history(&[
            ("2024-01-01", 80.0),
            ("2024-01-10", 120.0),
            ("2024-01-20", 90.0),
        ]);
        let ctx = EvaluationContext::from_history(&h, d("2024-01-20"), 90).unwrap();
        assert_eq!(ctx.current_price, 90.0);
        assert_eq!(ctx.claimed_original_price, 120.0);
        assert_eq!(ctx.mode, Some(EvaluationMode::Historical));
    }

    #[test]
    fn from_history_falls_back_to_previous_date() {
        let h = history(&[("2024-01-01", 80.0), ("2024-01-10", 120.0)]);
        let ctx = EvaluationContext::from_history(&h, d("2024-01-15"), 90).unwrap();
        assert_eq!(ctx.eval_date, d("2024-01-10"));
        assert_eq!(ctx.current_price, 120.0);

        let err = EvaluationContext::from_history(&h, d("2023-06-01"), 90).unwrap_err();
        assert!(matches!(err, DetectionError::NoRecordOnOrBefore(_)));
    }

    #[test]
    fn context_validation_rejects_bad_prices() {
        let ok = EvaluationContext::new(d("2024-01-01"), 10.0, 12.0);
        assert!(ok.validate().is_ok());
        let bad = EvaluationContext::new(d("2024-01-01"), -1.0, 12.0);
        assert!(matches!(
            bad.validate(),
            Err(DetectionError::InvalidContextPrice { field: "current_price", .. })
        ));
        let bad = EvaluationContext::new(d("2024-01-01"), 10.0, f64::INFINITY);
        assert!(bad.validate().is_err());
    }

    fn report(status: DiscountStatus, signals: Signals, metrics: Metrics) -> DetectionReport {
        let eval_date = d("2024-03-01");
        DetectionReport {
            result: DetectionResult {
                status,
                metrics,
                signals,
                explanation: String::new(),
                anchoring_note: None,
            },
            mode: EvaluationMode::Historical,
            eval_date,
            current_price: 95.0,
            claimed_original_price: 100.0,
            window: Window {
                mode: EvaluationMode::Historical,
                start: d("2023-12-02"),
                anchor: eval_date,
                records: Vec::new(),
            },
            rolling_zscores: Vec::new(),
            spikes: Vec::new(),
        }
    }

    #[test]
    fn genuine_narrative_mentions_a_detected_spike() {
        let signals = Signals {
            spike: true,
            anomalous: true,
            ..Signals::default()
        };
        let metrics = Metrics {
            drop_pct: 0.05,
            spike_detected: true,
            spike_zscore: 2.27,
            anomaly_score: 0.8,
            ..Metrics::default()
        };
        let text = report(DiscountStatus::Genuine, signals, metrics).narrative();
        assert!(text.starts_with("The discount appears genuine."));
        assert!(text.contains("A price spike was detected in the recent history (max z-score 2.27)."));
        assert!(text.contains("anomaly score 0.80"));
        assert!(text.contains("Only 1 of 3 warning signs fired (price spike)"));
        assert!(!text.contains("No price spike"));
    }

    #[test]
    fn calm_genuine_narrative_has_no_warnings() {
        let metrics = Metrics {
            drop_pct: 0.05,
            volatility_score: 0.1,
            ..Metrics::default()
        };
        let text = report(DiscountStatus::Genuine, Signals::default(), metrics).narrative();
        assert!(text.contains("No price spike was detected"));
        assert!(text.contains("Recent prices were stable (volatility score 0.10)."));
        assert!(!text.contains("warning signs"));
        assert!(!text.contains("anomaly"));
    }

    #[test]
    fn suspicious_narrative_does_not_cite_calm_volatility_as_evidence() {
        let signals = Signals {
            large_drop: true,
            spike: true,
            ..Signals::default()
        };
        let metrics = Metrics {
            drop_pct: 0.4,
            spike_detected: true,
            spike_zscore: 2.5,
            ..Metrics::default()
        };
        let text = report(DiscountStatus::Suspicious, signals, metrics).narrative();
        assert!(text.starts_with("The discount appears suspicious. The price dropped 40.0%"));
        assert!(text.contains("Recent prices were stable (volatility score 0.00)."));
        assert!(!text.contains("highly volatile"));
        assert!(text.ends_with("Together these suggest the original price may have been inflated."));
    }

    #[test]
    fn anomaly_does_not_vote() {
        let s = Signals {
            large_drop: true,
            anomalous: true,
            ..Signals::default()
        };
        assert_eq!(s.suspicious_votes(), 1);
        assert_eq!(s.active(), vec!["large drop"]);
    }

    #[test]
    fn status_display_names() {
        assert_eq!(DiscountStatus::NoDiscount.to_string(), "No Discount");
        assert_eq!(DiscountStatus::LimitedData.to_string(), "Limited Data");
        assert_eq!(EvaluationMode::RealTime.to_string(), "real-time");
    }
}

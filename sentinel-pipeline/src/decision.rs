//! Discount classification from window metrics.
//!
//! Rules are evaluated in precedence order, first match wins:
//!
//! 1. `NoDiscount`: the claimed original is below the current price.
//! 2. `LimitedData`: the window holds fewer than `min_records(mode)` records.
//! 3. `Suspicious`: large drop, a spike, and high volatility together.
//! 4. `Genuine`: small drop, no spike, and low volatility together.
//! 5. Mixed signals: majority of the three rule-3 conditions. Three voters
//!    cannot tie. The anomaly score is reported but never votes.

use chrono::NaiveDate;

use crate::config::DetectionConfig;
use crate::types::{DetectionResult, DiscountStatus, EvaluationMode, Metrics, Signals};

/// The note attached to every real-time result.
pub fn anchoring_note(last_dataset_date: NaiveDate) -> String {
    format!(
        "Dataset ends on {}. Today's evaluation is anchored to that date, so results are approximate.",
        last_dataset_date
    )
}

#[derive(Clone, Debug)]
pub struct DecisionEngine {
    config: DetectionConfig,
}

impl DecisionEngine {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn signals(&self, metrics: &Metrics) -> Signals {
        Signals {
            large_drop: metrics.drop_pct >= self.config.drop_threshold,
            spike: metrics.spike_detected,
            high_volatility: metrics.volatility_score >= self.config.high_volatility_score,
            anomalous: metrics.anomaly_score >= self.config.anomaly.score_threshold,
        }
    }

    /// Classify one evaluation. `anchor` is the last dataset date, quoted in
    /// the real-time anchoring note.
    pub fn decide(
        &self,
        mode: EvaluationMode,
        window_size: usize,
        metrics: Metrics,
        claimed_original: f64,
        current_price: f64,
        anchor: NaiveDate,
    ) -> DetectionResult {
        let (status, signals, mut explanation) =
            self.classify(mode, window_size, &metrics, claimed_original, current_price);

        let anchoring_note = match mode {
            EvaluationMode::RealTime => Some(anchoring_note(anchor)),
            EvaluationMode::Historical => None,
        };
        if let Some(note) = &anchoring_note {
            explanation.push(' ');
            explanation.push_str(note);
        }

        DetectionResult {
            status,
            metrics,
            signals,
            explanation,
            anchoring_note,
        }
    }

    fn classify(
        &self,
        mode: EvaluationMode,
        window_size: usize,
        m: &Metrics,
        claimed_original: f64,
        current_price: f64,
    ) -> (DiscountStatus, Signals, String) {
        if claimed_original < current_price {
            return (
                DiscountStatus::NoDiscount,
                Signals::default(),
                format!(
                    "Claimed original price {:.2} is less than current price {:.2}. No discount detected.",
                    claimed_original, current_price
                ),
            );
        }

        let needed = self.config.min_records(mode);
        if window_size < needed {
            return (
                DiscountStatus::LimitedData,
                Signals::default(),
                format!(
                    "Not enough recent historical data for reliable assessment: {} record(s) in the {} window, {} required.",
                    window_size, mode, needed
                ),
            );
        }

        let signals = self.signals(m);
        let figures = format!(
            "Volatility: {:.3} (score {:.2}). Max rolling z-score: {:.2}. Anomaly score: {:.3} (higher = more abnormal).",
            m.volatility, m.volatility_score, m.spike_zscore, m.anomaly_score
        );

        let votes = signals.suspicious_votes();
        if votes == Signals::VOTERS {
            return (
                DiscountStatus::Suspicious,
                signals,
                format!(
                    "Suspicious: Sharp drop of {:.1}% after price spike detected. {}",
                    m.drop_pct * 100.0,
                    figures
                ),
            );
        }
        if votes == 0 {
            return (
                DiscountStatus::Genuine,
                signals,
                format!(
                    "Genuine: Drop of {:.1}% with no price spike and low volatility. {}",
                    m.drop_pct * 100.0,
                    figures
                ),
            );
        }

        let status = if votes * 2 > Signals::VOTERS {
            DiscountStatus::Suspicious
        } else {
            DiscountStatus::Genuine
        };
        (
            status,
            signals,
            format!(
                "{}: Drop of {:.1}% with mixed signals, {} of {} suspicious ({}). {}",
                status,
                m.drop_pct * 100.0,
                votes,
                Signals::VOTERS,
                signals.active().join(", "),
                figures
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(&DetectionConfig::default())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn metrics(drop_pct: f64, spike: bool, volatility_score: f64, anomaly_score: f64) -> Metrics {
        Metrics {
            drop_pct,
            volatility: volatility_score * 0.35,
            volatility_score,
            spike_detected: spike,
            spike_zscore: if spike { 2.5 } else { 0.4 },
            anomaly_score,
        }
    }

    fn status(m: Metrics) -> DiscountStatus {
        engine()
            .decide(EvaluationMode::Historical, 60, m, 100.0, 100.0 * (1.0 - m.drop_pct), day())
            .status
    }

    #[test]
    fn no_discount_wins_over_everything() {
        let r = engine().decide(
            EvaluationMode::Historical,
            0,
            metrics(-0.33, true, 1.0, 1.0),
            30.0,
            40.0,
            day(),
        );
        assert_eq!(r.status, DiscountStatus::NoDiscount);
        assert!(r.explanation.contains("No discount detected"));
    }

    #[test]
    fn limited_data_thresholds_depend_on_mode() {
        let e = engine();
        let m = metrics(0.2, false, 0.0, 0.0);
        assert_eq!(
            e.decide(EvaluationMode::Historical, 4, m, 50.0, 40.0, day()).status,
            DiscountStatus::LimitedData
        );
        assert_ne!(
            e.decide(EvaluationMode::Historical, 5, m, 50.0, 40.0, day()).status,
            DiscountStatus::LimitedData
        );
        assert_eq!(
            e.decide(EvaluationMode::RealTime, 2, m, 50.0, 40.0, day()).status,
            DiscountStatus::LimitedData
        );
        assert_ne!(
            e.decide(EvaluationMode::RealTime, 3, m, 50.0, 40.0, day()).status,
            DiscountStatus::LimitedData
        );
    }

    #[test]
    fn all_three_conditions_are_suspicious() {
        assert_eq!(status(metrics(0.75, true, 0.9, 0.0)), DiscountStatus::Suspicious);
    }

    #[test]
    fn calm_small_drop_is_genuine() {
        // A high anomaly score alone does not block rule 4.
        assert_eq!(status(metrics(0.05, false, 0.1, 0.9)), DiscountStatus::Genuine);
    }

    #[test]
    fn mixed_signals_use_majority() {
        // drop only: 1 of 3
        assert_eq!(status(metrics(0.5, false, 0.1, 0.1)), DiscountStatus::Genuine);
        // drop + anomaly: the anomaly score does not vote
        assert_eq!(status(metrics(0.5, false, 0.1, 0.8)), DiscountStatus::Genuine);
        // spike + volatility without a large drop: 2 of 3
        assert_eq!(status(metrics(0.1, true, 0.7, 0.0)), DiscountStatus::Suspicious);
        // drop + spike: 2 of 3
        assert_eq!(status(metrics(0.3, true, 0.2, 0.0)), DiscountStatus::Suspicious);
        // spike alone: 1 of 3
        assert_eq!(status(metrics(0.1, true, 0.2, 0.1)), DiscountStatus::Genuine);
    }

    #[test]
    fn small_drop_with_spike_and_anomaly_stays_genuine() {
        let r = engine().decide(
            EvaluationMode::Historical,
            40,
            metrics(0.05, true, 0.0, 0.9),
            100.0,
            95.0,
            day(),
        );
        assert_eq!(r.status, DiscountStatus::Genuine);
        assert!(r.signals.anomalous);
        assert!(r.explanation.contains("1 of 3 suspicious (price spike)"));
    }

    #[test]
    fn threshold_boundaries_are_inclusive() {
        let e = engine();
        let s = e.signals(&metrics(0.20, false, 0.5, 0.6));
        assert!(s.large_drop && s.high_volatility && s.anomalous);
        assert_eq!(s.suspicious_votes(), 2);
    }

    #[test]
    fn calm_explanation_does_not_claim_no_anomalies() {
        let r = engine().decide(
            EvaluationMode::Historical,
            30,
            metrics(0.05, false, 0.1, 0.9),
            100.0,
            95.0,
            day(),
        );
        assert_eq!(r.status, DiscountStatus::Genuine);
        assert!(r.explanation.starts_with("Genuine: Drop of 5.0% with no price spike and low volatility."));
        assert!(!r.explanation.contains("no anomalies"));
    }

    #[test]
    fn realtime_results_carry_anchoring_note() {
        let r = engine().decide(
            EvaluationMode::RealTime,
            10,
            metrics(0.05, false, 0.1, 0.0),
            100.0,
            95.0,
            day(),
        );
        let note = "Dataset ends on 2024-06-30. Today's evaluation is anchored to that date, so results are approximate.";
        assert_eq!(r.anchoring_note.as_deref(), Some(note));
        assert!(r.explanation.ends_with(note));

        let r = engine().decide(EvaluationMode::RealTime, 0, Metrics::default(), 50.0, 40.0, day());
        assert_eq!(r.status, DiscountStatus::LimitedData);
        assert!(r.anchoring_note.is_some());
    }

    #[test]
    fn historical_results_have_no_note() {
        let r = engine().decide(
            EvaluationMode::Historical,
            10,
            metrics(0.05, false, 0.1, 0.0),
            100.0,
            95.0,
            day(),
        );
        assert!(r.anchoring_note.is_none());
        assert!(r.explanation.contains("Drop of 5.0%"));
    }
}

//! The detection orchestrator.
//!
//! Wires the stages together:
//! 1. resolve the evaluation mode (unless the context pins one)
//! 2. `WindowSelector` picks the recent-history window
//! 3. `MetricsCalculator` computes drop, volatility and spikes
//! 4. `AnomalyScorer` scores the evaluation price against the window
//! 5. `DecisionEngine` turns the metrics into a status
//!
//! Every call is independent. The orchestrator holds only configuration, so
//! one instance can be shared across threads.

use chrono::NaiveDate;
use sentinel_stats::rolling::spike_indices;

use crate::anomaly::AnomalyScorer;
use crate::config::DetectionConfig;
use crate::decision::DecisionEngine;
use crate::error::Result;
use crate::metrics::MetricsCalculator;
use crate::types::{DetectionReport, DetectionResult, EvaluationContext, EvaluationMode, PriceHistory};
use crate::window::WindowSelector;

/// Historical when `eval_date` falls on or before the last dataset date,
/// real-time otherwise (including an empty history).
pub fn resolve_mode(history: &PriceHistory, eval_date: NaiveDate) -> EvaluationMode {
    match history.last_date() {
        Some(last) if eval_date <= last => EvaluationMode::Historical,
        _ => EvaluationMode::RealTime,
    }
}

#[derive(Clone, Debug)]
pub struct DetectionOrchestrator {
    config: DetectionConfig,
    selector: WindowSelector,
    metrics: MetricsCalculator,
    scorer: AnomalyScorer,
    engine: DecisionEngine,
}

impl DetectionOrchestrator {
    /// Build an orchestrator after validating `config`.
    pub fn new(config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            selector: WindowSelector,
            metrics: MetricsCalculator::new(&config),
            scorer: AnomalyScorer::new(config.anomaly.clone()),
            engine: DecisionEngine::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn analyze(&self, history: &PriceHistory, context: &EvaluationContext) -> Result<DetectionResult> {
        self.analyze_report(history, context).map(|report| report.result)
    }

    /// Run a detection and keep the window and z-score series alongside the
    /// result.
    pub fn analyze_report(
        &self,
        history: &PriceHistory,
        context: &EvaluationContext,
    ) -> Result<DetectionReport> {
        context.validate()?;

        let mode = context
            .mode
            .unwrap_or_else(|| resolve_mode(history, context.eval_date));
        let window = self
            .selector
            .select(history, context.eval_date, self.config.window_days, mode);

        let (mut metrics, rolling_zscores) =
            self.metrics
                .compute(&window, context.current_price, context.claimed_original_price);
        metrics.anomaly_score = self.scorer.score(&window, context.current_price);

        let result = self.engine.decide(
            mode,
            window.len(),
            metrics,
            context.claimed_original_price,
            context.current_price,
            window.anchor,
        );

        log::info!(
            "eval_date={} mode={} window={} status={} drop={:.3} volatility={:.3} spike_z={:.2} anomaly={:.3}",
            context.eval_date,
            mode,
            window.len(),
            result.status,
            metrics.drop_pct,
            metrics.volatility,
            metrics.spike_zscore,
            metrics.anomaly_score
        );

        let spikes = spike_indices(&rolling_zscores, self.config.spike_z_threshold)
            .into_iter()
            .map(|i| window.records[i])
            .collect();

        Ok(DetectionReport {
            result,
            mode,
            eval_date: context.eval_date,
            current_price: context.current_price,
            claimed_original_price: context.claimed_original_price,
            window,
            rolling_zscores,
            spikes,
        })
    }
}

/// One-shot detection with an explicit configuration.
pub fn analyze(
    history: &PriceHistory,
    context: &EvaluationContext,
    config: &DetectionConfig,
) -> Result<DetectionResult> {
    DetectionOrchestrator::new(config.clone())?.analyze(history, context)
}

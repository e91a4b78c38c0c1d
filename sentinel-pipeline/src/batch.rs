//! Parallel catalog scans.
//!
//! Every product is evaluated historically with a context derived from its
//! own history (current price on the evaluation date, claimed original =
//! recent high), then the results are ranked so the most suspicious
//! discounts come first.

use std::cmp::Ordering;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::detector::DetectionOrchestrator;
use crate::error::Result;
use crate::price_loader::PriceCatalog;
use crate::types::{DetectionResult, DiscountStatus, EvaluationContext, EvaluationMode};

/// One ranked scan result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanEntry {
    pub product_code: String,
    pub eval_date: NaiveDate,
    pub mode: EvaluationMode,
    pub current_price: f64,
    pub claimed_original_price: f64,
    pub window_records: usize,
    pub result: DetectionResult,
}

impl ScanEntry {
    pub fn status(&self) -> DiscountStatus {
        self.result.status
    }
}

/// Evaluate every product in `catalog` and rank the results.
///
/// `eval_date` defaults to each product's last date. Products with fewer
/// than `min_history_days` distinct days, or with no price on or before the
/// evaluation date, are skipped.
pub fn scan(
    catalog: &PriceCatalog,
    eval_date: Option<NaiveDate>,
    orchestrator: &DetectionOrchestrator,
) -> Result<Vec<ScanEntry>> {
    let config = orchestrator.config();
    let products: Vec<_> = catalog.iter().collect();

    let evaluated = products
        .par_iter()
        .map(|&(code, history)| -> Result<Option<ScanEntry>> {
            if history.distinct_days() < config.min_history_days {
                log::debug!(
                    "product={} days={} below min_history_days={}, skipped",
                    code,
                    history.distinct_days(),
                    config.min_history_days
                );
                return Ok(None);
            }
            let Some(date) = eval_date.or_else(|| history.last_date()) else {
                return Ok(None);
            };
            let context = match EvaluationContext::from_history(history, date, config.window_days) {
                Ok(context) => context,
                Err(e) => {
                    log::debug!("product={} skipped: {}", code, e);
                    return Ok(None);
                }
            };
            let report = orchestrator.analyze_report(history, &context)?;
            Ok(Some(ScanEntry {
                product_code: code.to_string(),
                eval_date: report.eval_date,
                mode: report.mode,
                current_price: report.current_price,
                claimed_original_price: report.claimed_original_price,
                window_records: report.window.len(),
                result: report.result,
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut entries: Vec<ScanEntry> = evaluated.into_iter().flatten().collect();
    rank(&mut entries);

    log::info!(
        "scanned={} evaluated={} suspicious={}",
        products.len(),
        entries.len(),
        entries
            .iter()
            .filter(|e| e.status() == DiscountStatus::Suspicious)
            .count()
    );
    Ok(entries)
}

/// Suspicious first, then anomaly score and drop descending. NaN sorts
/// last; product code breaks remaining ties.
pub fn rank(entries: &mut [ScanEntry]) {
    entries.sort_by(|a, b| {
        let suspicious = |e: &ScanEntry| e.status() == DiscountStatus::Suspicious;
        suspicious(b)
            .cmp(&suspicious(a))
            .then_with(|| descending_nan_last(a.result.metrics.anomaly_score, b.result.metrics.anomaly_score))
            .then_with(|| descending_nan_last(a.result.metrics.drop_pct, b.result.metrics.drop_pct))
            .then_with(|| a.product_code.cmp(&b.product_code))
    });
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

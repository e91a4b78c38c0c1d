//! Recent-history window selection.
//!
//! Historical windows cover `[eval_date - window_days, eval_date)`; the
//! evaluation day itself is excluded so its price is judged against what
//! came before it. Real-time windows cover
//! `[last_date - window_days, last_date]`, because "today" is never in the
//! dataset. A thin or empty window is not an error here; the decision
//! engine turns it into `LimitedData`.

use chrono::NaiveDate;

use crate::types::{days_before, EvaluationMode, PriceHistory, Window};

#[derive(Clone, Copy, Debug, Default)]
pub struct WindowSelector;

impl WindowSelector {
    pub fn select(
        &self,
        history: &PriceHistory,
        eval_date: NaiveDate,
        window_days: u32,
        mode: EvaluationMode,
    ) -> Window {
        let (start, anchor, records) = match mode {
            EvaluationMode::Historical => {
                let start = days_before(eval_date, window_days);
                (start, eval_date, history.between_half_open(start, eval_date))
            }
            EvaluationMode::RealTime => {
                // Empty history: anchor on the evaluation date itself.
                let anchor = history.last_date().unwrap_or(eval_date);
                let start = days_before(anchor, window_days);
                (start, anchor, history.between_inclusive(start, anchor))
            }
        };

        log::debug!(
            "mode={} window={}..{} records={}",
            mode,
            start,
            anchor,
            records.len()
        );

        Window {
            mode,
            start,
            anchor,
            records: records.to_vec(),
        }
    }
}

//! Same-day re-alert suppression.

use chrono::NaiveDate;
use fire_alert_detection_models::RunState;

/// Whether the current result warrants a new alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// Send the alert, then persist today's count.
    Dispatch,
    /// Same day and same count as the last alert.
    Suppress,
}

/// Compares the current result against the last dispatched alert.
///
/// Only the date and the aggregate count are compared, so a different set of
/// detections with the same count is still suppressed.
#[must_use]
pub fn should_dispatch(prior: Option<&RunState>, today: NaiveDate, count: usize) -> DedupDecision {
    match prior {
        Some(state) if state.date == today && state.count == count => DedupDecision::Suppress,
        _ => DedupDecision::Dispatch,
    }
}

//! Concurrent multi-source aggregation.
//!
//! Every source is fetched concurrently under its own timeout. A source that
//! errors or times out is logged and left out; the others are unaffected.
//! Surviving rows are concatenated in source declaration order (no
//! cross-source deduplication, since two satellites seeing the same fire
//! legitimately produce two rows) and numbered with a [`SourceId`].

use fire_alert_detection_models::{Detection, SourceId, TrackedDetection};
use futures::future::join_all;

use crate::{DetectionSource, FetchOptions, SourceError};

/// Outcome of fetching one source.
#[derive(Debug)]
pub struct SourceReport {
    /// Source identifier.
    pub source_id: String,
    /// Rows contributed, or the reason the source was skipped.
    pub result: Result<usize, String>,
}

/// Result of one aggregation.
#[derive(Debug, Default)]
pub struct AggregatedBatch {
    /// Concatenated detections numbered in aggregation order.
    pub detections: Vec<TrackedDetection>,
    /// One entry per source, in declaration order.
    pub reports: Vec<SourceReport>,
}

impl AggregatedBatch {
    /// Number of sources that failed.
    #[must_use]
    pub fn failed_sources(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_err()).count()
    }

    /// Whether no source contributed any rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Fetches a single source under `options.timeout`.
///
/// # Errors
///
/// Returns [`SourceError::Timeout`] if the budget elapses, or the source's
/// own error.
pub async fn fetch_source(
    source: &dyn DetectionSource,
    options: &FetchOptions,
) -> Result<Vec<Detection>, SourceError> {
    tokio::time::timeout(options.timeout, source.fetch(options))
        .await
        .map_err(|_| SourceError::Timeout(options.timeout))?
}

/// Fetches every source concurrently and concatenates the results.
///
/// Never fails: an empty batch is a valid outcome.
pub async fn aggregate(
    sources: &[Box<dyn DetectionSource>],
    options: &FetchOptions,
) -> AggregatedBatch {
    let results = join_all(
        sources
            .iter()
            .map(|source| fetch_source(source.as_ref(), options)),
    )
    .await;

    let mut batch = AggregatedBatch::default();
    let mut next_id = 0_u32;

    for (source, result) in sources.iter().zip(results) {
        let result = match result {
            Ok(detections) => {
                log::info!("[{}] loaded {} detection(s)", source.id(), detections.len());
                let count = detections.len();
                for detection in detections {
                    batch.detections.push(TrackedDetection {
                        source_id: SourceId(next_id),
                        detection,
                    });
                    next_id += 1;
                }
                Ok(count)
            }
            Err(e) => {
                log::warn!("[{}] skipping source: {e}", source.id());
                Err(e.to_string())
            }
        };

        batch.reports.push(SourceReport {
            source_id: source.id().to_string(),
            result,
        });
    }

    log::info!(
        "Aggregated {} detection(s) from {}/{} source(s)",
        batch.detections.len(),
        sources.len() - batch.failed_sources(),
        sources.len()
    );

    batch
}

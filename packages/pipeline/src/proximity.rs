//! Industrial proximity filter.

use chrono::NaiveDate;
use fire_alert_detection_models::{FlaggedDetection, TrackedDetection};
use fire_alert_spatial::industrial::IndustrialIndex;

/// Flags every detection lying within `radius_km` (inclusive, geodesic) of
/// an industrial site.
#[must_use]
pub fn flag_industrial(
    detections: Vec<TrackedDetection>,
    index: &IndustrialIndex,
    radius_km: f64,
) -> Vec<FlaggedDetection> {
    detections
        .into_iter()
        .map(|tracked| {
            let d = &tracked.detection;
            let industrial = index.is_industrial(d.latitude, d.longitude, radius_km);
            if industrial && log::log_enabled!(log::Level::Debug) {
                if let Some((site, km)) = index.nearest_within(d.latitude, d.longitude, radius_km) {
                    log::debug!(
                        "{} ({}, {}) is {km:.2} km from industrial site {}",
                        tracked.source_id,
                        d.latitude,
                        d.longitude,
                        site.name.as_deref().unwrap_or("(unnamed)")
                    );
                }
            }
            FlaggedDetection {
                source_id: tracked.source_id,
                detection: tracked.detection,
                industrial,
            }
        })
        .collect()
}

/// Keeps non-industrial detections acquired on `today`.
#[must_use]
pub fn select_candidates(flagged: Vec<FlaggedDetection>, today: NaiveDate) -> Vec<FlaggedDetection> {
    let total = flagged.len();
    let candidates: Vec<_> = flagged
        .into_iter()
        .filter(|f| !f.industrial && f.detection.acquired_on == today)
        .collect();
    log::info!(
        "Proximity filter: {} of {total} detection(s) are non-industrial and dated {today}",
        candidates.len()
    );
    candidates
}

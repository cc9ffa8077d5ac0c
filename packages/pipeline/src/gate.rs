//! Protected-area gate.

use fire_alert_detection_models::ClassifiedDetection;

/// Keeps detections inside a conservation unit or a buffer zone. Every other
/// attribute passes through untouched.
#[must_use]
pub fn retain_protected(classified: Vec<ClassifiedDetection>) -> Vec<ClassifiedDetection> {
    let total = classified.len();
    let kept: Vec<_> = classified
        .into_iter()
        .filter(ClassifiedDetection::is_protected)
        .collect();
    log::info!(
        "Protected-area gate: {} of {total} detection(s) inside a conservation unit or buffer zone",
        kept.len()
    );
    kept
}

//! Ordered polygon-containment joins.
//!
//! A join emits one row per matching polygon, best match first, and is then
//! collapsed back to one row per [`SourceId`] by [`dedup_by_source_id`]. The
//! administrative join is inner (points outside every polygon are dropped);
//! the conservation-unit and buffer-zone joins are left joins.

use std::collections::BTreeSet;

use fire_alert_detection_models::{ClassifiedDetection, FlaggedDetection, SourceId};
use fire_alert_spatial::layer::{LayerFeature, PolygonLayer};

/// Property names read from the administrative layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdministrativeFields {
    /// Municipality name property.
    pub municipality: String,
    /// Neighborhood name property.
    pub neighborhood: String,
    /// District name property.
    pub district: String,
}

/// The three layers detections are classified against.
pub struct ClassificationLayers {
    /// Municipality/neighborhood/district polygons.
    pub administrative: PolygonLayer,
    /// Which administrative properties map to which attribute.
    pub administrative_fields: AdministrativeFields,
    /// Conservation unit polygons; a feature's name is the unit name.
    pub conservation_units: PolygonLayer,
    /// Buffer zone polygons; a feature's name is the zone name.
    pub buffer_zones: PolygonLayer,
}

fn unclassified(flagged: FlaggedDetection) -> ClassifiedDetection {
    ClassifiedDetection {
        source_id: flagged.source_id,
        detection: flagged.detection,
        industrial: flagged.industrial,
        municipality: None,
        neighborhood: None,
        district: None,
        conservation_unit: None,
        buffer_zone: None,
    }
}

fn fan_out(
    rows: Vec<ClassifiedDetection>,
    layer: &PolygonLayer,
    keep_unmatched: bool,
    attach: impl Fn(&mut ClassifiedDetection, &LayerFeature),
) -> Vec<ClassifiedDetection> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let (lng, lat) = row.detection.lng_lat();
        let matches = layer.ranked_matches(lng, lat);
        if matches.is_empty() {
            if keep_unmatched {
                out.push(row);
            } else {
                log::debug!(
                    "{} ({lat}, {lng}) is outside layer '{}'",
                    row.source_id,
                    layer.label()
                );
            }
            continue;
        }
        for feature in matches {
            let mut joined = row.clone();
            attach(&mut joined, feature);
            out.push(joined);
        }
    }
    out
}

/// Inner containment join: one output row per (row, matching polygon) pair,
/// ranked by the layer's tie-break. Rows matching nothing are dropped.
#[must_use]
pub fn join_inner(
    rows: Vec<ClassifiedDetection>,
    layer: &PolygonLayer,
    attach: impl Fn(&mut ClassifiedDetection, &LayerFeature),
) -> Vec<ClassifiedDetection> {
    fan_out(rows, layer, false, attach)
}

/// Left containment join: like [`join_inner`], but rows matching nothing are
/// kept unchanged.
#[must_use]
pub fn join_left(
    rows: Vec<ClassifiedDetection>,
    layer: &PolygonLayer,
    attach: impl Fn(&mut ClassifiedDetection, &LayerFeature),
) -> Vec<ClassifiedDetection> {
    fan_out(rows, layer, true, attach)
}

/// Keeps the first row for each [`SourceId`], preserving order.
#[must_use]
pub fn dedup_by_source_id(rows: Vec<ClassifiedDetection>) -> Vec<ClassifiedDetection> {
    let mut seen = BTreeSet::<SourceId>::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.source_id))
        .collect()
}

/// Runs the administrative, conservation-unit and buffer-zone joins in
/// order, deduplicating after each.
#[must_use]
pub fn classify(
    candidates: Vec<FlaggedDetection>,
    layers: &ClassificationLayers,
) -> Vec<ClassifiedDetection> {
    let total = candidates.len();
    let rows: Vec<_> = candidates.into_iter().map(unclassified).collect();

    let fields = &layers.administrative_fields;
    let rows = dedup_by_source_id(join_inner(rows, &layers.administrative, |row, feature| {
        row.municipality = feature.attribute(&fields.municipality).map(str::to_string);
        row.neighborhood = feature.attribute(&fields.neighborhood).map(str::to_string);
        row.district = feature.attribute(&fields.district).map(str::to_string);
    }));
    log::info!(
        "Administrative join: {} of {total} detection(s) inside '{}'",
        rows.len(),
        layers.administrative.label()
    );

    let rows = dedup_by_source_id(join_left(rows, &layers.conservation_units, |row, feature| {
        row.conservation_unit = feature.name().map(str::to_string);
    }));
    let rows = dedup_by_source_id(join_left(rows, &layers.buffer_zones, |row, feature| {
        row.buffer_zone = feature.name().map(str::to_string);
    }));

    log::info!(
        "Protected-area joins: {} conservation unit match(es), {} buffer zone match(es)",
        rows.iter().filter(|r| r.conservation_unit.is_some()).count(),
        rows.iter().filter(|r| r.buffer_zone.is_some()).count()
    );

    rows
}

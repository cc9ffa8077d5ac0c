//! `GeoJSON` polygon layers with R-tree indexed containment lookups.
//!
//! Each layer keeps its features in original file order. Lookups return
//! every polygon that strictly contains the point (a point on a boundary is
//! not contained), and [`PolygonLayer::lookup`] picks exactly one of them
//! using the layer's [`TieBreak`].

use std::collections::BTreeMap;
use std::path::Path;

use geo::{BoundingRect as _, Contains as _, GeodesicArea as _, MultiPolygon, Point};
use geojson::{FeatureCollection, GeoJson};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};

use crate::SpatialError;
use crate::crs::Crs;

/// How to choose among several polygons that contain the same point.
///
/// Every strategy falls back to original feature order for remaining ties,
/// so the result is deterministic for a given input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First matching feature in file order.
    #[default]
    LayerOrder,
    /// Matching feature with the smallest geodesic area.
    SmallestArea,
    /// Matching feature whose primary name sorts first.
    Name,
}

/// One polygon feature with the properties the caller asked for.
#[derive(Debug, Clone)]
pub struct LayerFeature {
    /// Position in the source file (0-based).
    pub index: usize,
    /// Requested properties, rendered as strings. Missing and `null`
    /// properties are absent.
    pub attributes: BTreeMap<String, String>,
    /// Geodesic area in square meters.
    pub area_m2: f64,
    primary: Option<String>,
}

impl LayerFeature {
    /// Returns the value of property `key`, if present.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns the first requested property, used as the feature's name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.primary.as_deref()
    }
}

/// A polygon stored in the R-tree, pointing back at its feature.
struct LayerEntry {
    feature: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for LayerEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Loading parameters for one layer.
#[derive(Debug, Clone)]
pub struct LayerSpec<'a> {
    /// Label used in logs and errors (e.g. `"conservation_units"`).
    pub label: &'a str,
    /// Properties to keep. The first one is the feature's name.
    pub properties: &'a [&'a str],
    /// CRS override. When `None`, the file's own `crs` member is used, and
    /// WGS84 when it has none.
    pub crs: Option<Crs>,
    /// Multi-match resolution.
    pub tie_break: TieBreak,
}

/// An immutable, indexed polygon layer in WGS84.
pub struct PolygonLayer {
    label: String,
    crs: Crs,
    tie_break: TieBreak,
    features: Vec<LayerFeature>,
    tree: RTree<LayerEntry>,
}

impl PolygonLayer {
    /// Reads and indexes a `GeoJSON` file.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read, is not a
    /// `FeatureCollection`, declares an unsupported CRS, or contains no
    /// polygons.
    pub fn load(path: &Path, spec: &LayerSpec<'_>) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let layer = Self::from_geojson(&text, spec)?;
        log::info!(
            "Loaded {} polygon(s) into layer '{}' from {} ({})",
            layer.len(),
            layer.label,
            path.display(),
            layer.crs
        );
        Ok(layer)
    }

    /// Parses and indexes a `GeoJSON` `FeatureCollection`.
    ///
    /// Features without a `Polygon`/`MultiPolygon` geometry are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the text is not a `FeatureCollection`,
    /// declares an unsupported CRS, or yields no polygons.
    pub fn from_geojson(text: &str, spec: &LayerSpec<'_>) -> Result<Self, SpatialError> {
        let geojson: GeoJson = text.parse().map_err(|e| SpatialError::GeoJson {
            layer: spec.label.to_string(),
            source: Box::new(e),
        })?;

        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(SpatialError::InvalidLayer {
                layer: spec.label.to_string(),
                message: "expected a FeatureCollection".to_string(),
            });
        };

        let crs = match spec.crs {
            Some(crs) => crs,
            None => declared_crs(&collection)?.unwrap_or_default(),
        };

        let mut features = Vec::new();
        let mut entries = Vec::new();

        for (index, feature) in collection.features.into_iter().enumerate() {
            let Some(multi_polygon) = feature
                .geometry
                .as_ref()
                .and_then(|g| to_multipolygon(g.clone()))
            else {
                log::warn!(
                    "Layer '{}': skipping feature {index} without polygon geometry",
                    spec.label
                );
                continue;
            };

            let polygon = crs.reproject(multi_polygon);

            let attributes: BTreeMap<String, String> = spec
                .properties
                .iter()
                .filter_map(|key| {
                    feature
                        .property(key)
                        .and_then(property_to_string)
                        .map(|v| ((*key).to_string(), v))
                })
                .collect();
            let primary = spec
                .properties
                .first()
                .and_then(|key| attributes.get(*key).cloned());

            let slot = features.len();
            entries.push(LayerEntry {
                feature: slot,
                envelope: compute_envelope(&polygon),
                polygon: polygon.clone(),
            });
            features.push(LayerFeature {
                index,
                attributes,
                area_m2: polygon.geodesic_area_unsigned(),
                primary,
            });
        }

        if features.is_empty() {
            return Err(SpatialError::InvalidLayer {
                layer: spec.label.to_string(),
                message: "layer contains no polygons".to_string(),
            });
        }

        Ok(Self {
            label: spec.label.to_string(),
            crs,
            tie_break: spec.tie_break,
            features,
            tree: RTree::bulk_load(entries),
        })
    }

    /// Layer label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// CRS the layer was reprojected from.
    #[must_use]
    pub const fn source_crs(&self) -> Crs {
        self.crs
    }

    /// Number of polygon features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features. Never true for a loaded layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Every feature strictly containing the point, in file order.
    #[must_use]
    pub fn matches(&self, lng: f64, lat: f64) -> Vec<&LayerFeature> {
        let point = Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.feature)
            .collect();
        slots.sort_unstable();

        slots.into_iter().map(|slot| &self.features[slot]).collect()
    }

    /// Every feature strictly containing the point, best first according to
    /// the layer's tie-break.
    #[must_use]
    pub fn ranked_matches(&self, lng: f64, lat: f64) -> Vec<&LayerFeature> {
        let mut candidates = self.matches(lng, lat);
        if candidates.len() > 1 {
            log::debug!(
                "Layer '{}': ({lat}, {lng}) matches {} features, ranking by {:?}",
                self.label,
                candidates.len(),
                self.tie_break
            );
            rank(&mut candidates, self.tie_break);
        }
        candidates
    }

    /// The single feature containing the point, chosen by the layer's
    /// tie-break.
    #[must_use]
    pub fn lookup(&self, lng: f64, lat: f64) -> Option<&LayerFeature> {
        self.ranked_matches(lng, lat).into_iter().next()
    }
}

/// Orders `candidates` (already in file order) best first. The sort is
/// stable, so equal keys keep file order.
fn rank(candidates: &mut [&LayerFeature], tie_break: TieBreak) {
    match tie_break {
        TieBreak::LayerOrder => {}
        TieBreak::SmallestArea => candidates.sort_by(|a, b| a.area_m2.total_cmp(&b.area_m2)),
        // Unnamed features sort after named ones.
        TieBreak::Name => candidates.sort_by(|a, b| match (a.name(), b.name()) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }),
    }
}

/// Reads the legacy `crs` member (`{"type":"name","properties":{"name":...}}`)
/// that GIS exports still emit.
fn declared_crs(collection: &FeatureCollection) -> Result<Option<Crs>, SpatialError> {
    let Some(name) = collection
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(serde_json::Value::as_str)
    else {
        return Ok(None);
    };
    Crs::from_identifier(name).map(Some)
}

/// Renders a property value as a string. `null` and empty strings are
/// treated as missing.
fn property_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        other => Some(other.to_string()),
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Satellite fire detection types.
//!
//! A [`Detection`] is one fire/heat point reported by an upstream satellite
//! product. As it moves through the alert pipeline it is wrapped in
//! progressively richer types: [`TrackedDetection`] (numbered with a
//! [`SourceId`]), [`FlaggedDetection`] (industrial proximity known), and
//! finally [`ClassifiedDetection`] (administrative and protected-area names
//! attached).

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Stable per-run sequence number identifying one raw detection.
///
/// Assigned once in aggregation order and carried unchanged through every
/// spatial join, so a point matching several polygons can always be traced
/// back to exactly one upstream row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether the detection was acquired during the day or night pass.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum DayNight {
    /// Daytime pass (`D`).
    #[strum(serialize = "D")]
    #[serde(rename = "D")]
    Day,
    /// Nighttime pass (`N`).
    #[strum(serialize = "N")]
    #[serde(rename = "N")]
    Night,
}

/// One fire/heat point as reported by an upstream product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    /// Upstream product the row came from (e.g. `"VIIRS_NOAA20_NRT"`).
    pub product: String,
    /// Latitude (WGS84 degrees).
    pub latitude: f64,
    /// Longitude (WGS84 degrees).
    pub longitude: f64,
    /// Acquisition date (UTC).
    pub acquired_on: NaiveDate,
    /// Acquisition time of day (UTC, minute resolution).
    pub acquired_at: NaiveTime,
    /// Day or night pass.
    pub day_night: DayNight,
    /// Satellite identifier (e.g. `"N20"`, `"Aqua"`).
    pub satellite: String,
    /// Instrument name (e.g. `"VIIRS"`, `"MODIS"`).
    pub instrument: String,
    /// Detection confidence as reported upstream. VIIRS uses
    /// `l`/`n`/`h`, MODIS a 0-100 percentage.
    pub confidence: Option<String>,
    /// Fire radiative power in megawatts.
    pub frp: Option<f64>,
}

impl Detection {
    /// Returns the detection location as `(longitude, latitude)`, the axis
    /// order used by `geo`.
    #[must_use]
    pub const fn lng_lat(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// A detection numbered with its per-run [`SourceId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedDetection {
    /// Per-run identity.
    pub source_id: SourceId,
    /// The raw detection.
    pub detection: Detection,
}

/// A tracked detection with its industrial-proximity flag computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedDetection {
    /// Per-run identity.
    pub source_id: SourceId,
    /// The raw detection.
    pub detection: Detection,
    /// `true` when the point lies within the exclusion radius of a known
    /// industrial heat source.
    pub industrial: bool,
}

/// A detection enriched with every spatial attribute the pipeline attaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedDetection {
    /// Per-run identity.
    pub source_id: SourceId,
    /// The raw detection.
    pub detection: Detection,
    /// Industrial-proximity flag carried from the proximity filter.
    pub industrial: bool,
    /// Municipality name from the administrative layer.
    pub municipality: Option<String>,
    /// Neighborhood name from the administrative layer.
    pub neighborhood: Option<String>,
    /// District name from the administrative layer.
    pub district: Option<String>,
    /// Conservation unit containing the point, if any.
    pub conservation_unit: Option<String>,
    /// Buffer zone containing the point, if any.
    pub buffer_zone: Option<String>,
}

impl ClassifiedDetection {
    /// Whether the detection falls inside a conservation unit or a buffer
    /// zone.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.conservation_unit.is_some() || self.buffer_zone.is_some()
    }
}

/// A fixed industrial heat source (refinery, steel mill, flare stack).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustrialSite {
    /// Optional human-readable label.
    #[serde(default)]
    pub name: Option<String>,
    /// Latitude (WGS84 degrees).
    pub latitude: f64,
    /// Longitude (WGS84 degrees).
    pub longitude: f64,
}

/// Geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude.
    pub west: f64,
    /// Southern latitude.
    pub south: f64,
    /// Eastern longitude.
    pub east: f64,
    /// Northern latitude.
    pub north: f64,
}

impl BoundingBox {
    /// Whether the box is well-formed (west < east, south < north, inside
    /// valid coordinate ranges).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.west)
            && (-180.0..=180.0).contains(&self.east)
            && (-90.0..=90.0).contains(&self.south)
            && (-90.0..=90.0).contains(&self.north)
            && self.west < self.east
            && self.south < self.north
    }
}

/// Renders as `west,south,east,north`, the order the FIRMS area API expects.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// The last successfully dispatched alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Run date the alert was sent for.
    pub date: NaiveDate,
    /// Number of qualifying detections in that alert.
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn parses_day_night_flags() {
        assert_eq!(DayNight::from_str("D").unwrap(), DayNight::Day);
        assert_eq!(DayNight::from_str("N").unwrap(), DayNight::Night);
        assert!(DayNight::from_str("X").is_err());
    }

    #[test]
    fn bbox_displays_in_firms_order() {
        let bbox = BoundingBox {
            west: -45.4,
            south: -23.6,
            east: -40.9,
            north: -20.7,
        };
        assert_eq!(bbox.to_string(), "-45.4,-23.6,-40.9,-20.7");
        assert!(bbox.is_valid());
    }

    #[test]
    fn rejects_inverted_bbox() {
        let bbox = BoundingBox {
            west: -40.9,
            south: -23.6,
            east: -45.4,
            north: -20.7,
        };
        assert!(!bbox.is_valid());
    }

    #[test]
    fn run_state_serializes_as_date_and_count() {
        let state = RunState {
            date: NaiveDate::from_ymd_opt(2025, 8, 14).unwrap(),
            count: 3,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"date":"2025-08-14","count":3}"#);
    }
}

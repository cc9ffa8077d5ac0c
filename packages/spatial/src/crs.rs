//! Coordinate reference systems accepted for polygon layers.
//!
//! Detections are always WGS84 longitude/latitude (EPSG:4326); every layer
//! is reprojected into that system once at load time.

use std::f64::consts::FRAC_PI_2;

use geo::{Coord, MapCoords, MultiPolygon};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::SpatialError;

/// WGS84 semi-major axis in meters, the sphere radius used by Web Mercator.
const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// A supported coordinate reference system.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Crs {
    /// WGS84 geographic degrees.
    #[default]
    #[strum(serialize = "EPSG:4326")]
    #[serde(rename = "EPSG:4326")]
    Wgs84,
    /// SIRGAS 2000 geographic degrees. Its realization agrees with WGS84 to
    /// well under a meter, so coordinates pass through unchanged.
    #[strum(serialize = "EPSG:4674")]
    #[serde(rename = "EPSG:4674")]
    Sirgas2000,
    /// Spherical (Web) Mercator meters.
    #[strum(serialize = "EPSG:3857")]
    #[serde(rename = "EPSG:3857")]
    WebMercator,
}

impl Crs {
    /// Parses a CRS identifier in any of the common spellings: `EPSG:4674`,
    /// `urn:ogc:def:crs:EPSG::4674`, or `urn:ogc:def:crs:OGC:1.3:CRS84`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnsupportedCrs`] for anything else.
    pub fn from_identifier(s: &str) -> Result<Self, SpatialError> {
        let trimmed = s.trim();
        if trimmed.ends_with("CRS84") {
            return Ok(Self::Wgs84);
        }

        let code = trimmed
            .rsplit(':')
            .next()
            .filter(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| SpatialError::UnsupportedCrs(trimmed.to_string()))?;

        match code {
            "4326" => Ok(Self::Wgs84),
            "4674" => Ok(Self::Sirgas2000),
            "3857" | "900913" => Ok(Self::WebMercator),
            _ => Err(SpatialError::UnsupportedCrs(trimmed.to_string())),
        }
    }

    /// Converts one coordinate from this CRS into WGS84 longitude/latitude.
    #[must_use]
    pub fn to_wgs84(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            Self::Wgs84 | Self::Sirgas2000 => coord,
            Self::WebMercator => Coord {
                x: (coord.x / WEB_MERCATOR_RADIUS_M).to_degrees(),
                y: (2.0 * (coord.y / WEB_MERCATOR_RADIUS_M).exp().atan() - FRAC_PI_2)
                    .to_degrees()
                    .clamp(-90.0, 90.0),
            },
        }
    }

    /// Reprojects a whole multipolygon into WGS84.
    #[must_use]
    pub fn reproject(self, mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            Self::Wgs84 | Self::Sirgas2000 => mp,
            Self::WebMercator => mp.map_coords(|c| self.to_wgs84(c)),
        }
    }
}

/// Forward Web Mercator projection; only used to build test fixtures.
#[cfg(test)]
pub(crate) fn wgs84_to_web_mercator(coord: Coord<f64>) -> Coord<f64> {
    use std::f64::consts::PI;

    Coord {
        x: coord.x.to_radians() * WEB_MERCATOR_RADIUS_M,
        y: (PI / 4.0 + coord.y.to_radians() / 2.0).tan().ln() * WEB_MERCATOR_RADIUS_M,
    }
}

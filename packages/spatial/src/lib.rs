#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial indexes for fire detection classification.
//!
//! [`layer::PolygonLayer`] loads a `GeoJSON` polygon layer, reprojects it to
//! WGS84, builds an R-tree over polygon envelopes and answers strict
//! point-in-polygon queries with a deterministic tie-break.
//! [`industrial::IndustrialIndex`] answers geodesic proximity queries
//! against known industrial heat sources.

pub mod crs;
pub mod industrial;
pub mod layer;

use std::path::PathBuf;

/// Errors raised while loading reference data.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Reference file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON parse error in layer '{layer}': {source}")]
    GeoJson {
        /// Layer label.
        layer: String,
        /// Underlying parse error.
        source: Box<geojson::Error>,
    },

    /// Industrial site list could not be parsed.
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// The layer is structurally unusable.
    #[error("Invalid layer '{layer}': {message}")]
    InvalidLayer {
        /// Layer label.
        layer: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The layer declares a coordinate reference system we cannot
    /// reproject from.
    #[error("Unsupported CRS '{0}'")]
    UnsupportedCrs(String),
}

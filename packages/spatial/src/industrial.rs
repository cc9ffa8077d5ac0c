//! Geodesic proximity checks against known industrial heat sources.
//!
//! Refineries, steel mills and flare stacks show up as persistent thermal
//! anomalies. Any detection within the exclusion radius of one is treated
//! as industrial rather than a fire.

use std::path::Path;

use fire_alert_detection_models::IndustrialSite;
use geo::{Distance as _, Geodesic, Point};

use crate::SpatialError;

/// Default exclusion radius around an industrial site, in kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 1.5;

/// Read-only set of industrial sites for one run.
#[derive(Debug, Clone)]
pub struct IndustrialIndex {
    sites: Vec<IndustrialSite>,
}

impl IndustrialIndex {
    /// Wraps an already-loaded site list.
    #[must_use]
    pub const fn new(sites: Vec<IndustrialSite>) -> Self {
        Self { sites }
    }

    /// Loads sites from a CSV file with `latitude`, `longitude`, and an
    /// optional `name` column.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read or any row is
    /// malformed. A bad reference list is fatal, so rows are not skipped.
    pub fn load_csv(path: &Path) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::from_csv(&text)?;
        log::info!(
            "Loaded {} industrial site(s) from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Parses sites from CSV text.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if a row is malformed or a coordinate is
    /// out of range.
    pub fn from_csv(text: &str) -> Result<Self, SpatialError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut sites = Vec::new();
        for (row, result) in reader.deserialize::<IndustrialSite>().enumerate() {
            let site = result?;
            if !(site.latitude.abs() <= 90.0 && site.longitude.abs() <= 180.0) {
                return Err(SpatialError::InvalidLayer {
                    layer: "industrial_sites".to_string(),
                    message: format!(
                        "row {}: coordinate out of range ({}, {})",
                        row + 1,
                        site.latitude,
                        site.longitude
                    ),
                });
            }
            sites.push(site);
        }

        Ok(Self::new(sites))
    }

    /// Number of sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the index has no sites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// The closest site within `radius_km` of the point, with its geodesic
    /// distance in kilometers. The radius is inclusive.
    #[must_use]
    pub fn nearest_within(&self, lat: f64, lng: f64, radius_km: f64) -> Option<(&IndustrialSite, f64)> {
        let point = Point::new(lng, lat);
        self.sites
            .iter()
            .map(|site| (site, geodesic_km(point, Point::new(site.longitude, site.latitude))))
            .filter(|(_, km)| *km <= radius_km)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
    }

    /// Whether the point lies within `radius_km` (inclusive) of any site.
    #[must_use]
    pub fn is_industrial(&self, lat: f64, lng: f64, radius_km: f64) -> bool {
        let point = Point::new(lng, lat);
        self.sites
            .iter()
            .any(|site| geodesic_km(point, Point::new(site.longitude, site.latitude)) <= radius_km)
    }
}

/// Geodesic (WGS84 ellipsoid) distance between two lon/lat points in
/// kilometers.
#[must_use]
pub fn geodesic_km(a: Point<f64>, b: Point<f64>) -> f64 {
    Geodesic.distance(a, b) / 1000.0
}

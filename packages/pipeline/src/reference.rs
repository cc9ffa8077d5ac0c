//! Reference data loading: industrial sites and the three polygon layers.

use fire_alert_spatial::SpatialError;
use fire_alert_spatial::industrial::IndustrialIndex;
use fire_alert_spatial::layer::{LayerSpec, PolygonLayer};

use crate::classify::{AdministrativeFields, ClassificationLayers};
use crate::config::{NamedLayerConfig, ReferenceConfig};

/// Everything the filtering stages read. Immutable for the run.
pub struct ReferenceData {
    /// Industrial heat sources.
    pub industrial: IndustrialIndex,
    /// Polygon layers.
    pub layers: ClassificationLayers,
}

/// Provides reference data to a run.
pub trait ReferenceLoader: Send + Sync {
    /// Loads all reference data.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if any input is missing or unusable.
    fn load(&self) -> Result<ReferenceData, SpatialError>;
}

/// Loads reference data from the files named in the config.
pub struct FileReferenceLoader {
    config: ReferenceConfig,
}

impl FileReferenceLoader {
    #[must_use]
    pub const fn new(config: ReferenceConfig) -> Self {
        Self { config }
    }
}

fn load_named(label: &str, config: &NamedLayerConfig) -> Result<PolygonLayer, SpatialError> {
    PolygonLayer::load(
        &config.path,
        &LayerSpec {
            label,
            properties: &[config.name_field.as_str()],
            crs: config.crs,
            tie_break: config.tie_break,
        },
    )
}

impl ReferenceLoader for FileReferenceLoader {
    fn load(&self) -> Result<ReferenceData, SpatialError> {
        let industrial = IndustrialIndex::load_csv(&self.config.industrial_sites)?;

        let admin = &self.config.administrative;
        let administrative = PolygonLayer::load(
            &admin.path,
            &LayerSpec {
                label: "administrative",
                properties: &[
                    admin.municipality_field.as_str(),
                    admin.neighborhood_field.as_str(),
                    admin.district_field.as_str(),
                ],
                crs: admin.crs,
                tie_break: admin.tie_break,
            },
        )?;

        let conservation_units = load_named("conservation_units", &self.config.conservation_units)?;
        let buffer_zones = load_named("buffer_zones", &self.config.buffer_zones)?;

        Ok(ReferenceData {
            industrial,
            layers: ClassificationLayers {
                administrative,
                administrative_fields: AdministrativeFields {
                    municipality: admin.municipality_field.clone(),
                    neighborhood: admin.neighborhood_field.clone(),
                    district: admin.district_field.clone(),
                },
                conservation_units,
                buffer_zones,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use fire_alert_spatial::layer::TieBreak;

    use super::*;
    use crate::classify::tests::rectangles;
    use crate::config::AdministrativeLayerConfig;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fire_alert_reference_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(dir: &Path) -> ReferenceConfig {
        ReferenceConfig {
            industrial_sites: write(
                dir,
                "sites.csv",
                "name,latitude,longitude\nREDUC,-22.712,-43.267\n",
            ),
            administrative: AdministrativeLayerConfig {
                path: write(
                    dir,
                    "admin.geojson",
                    &rectangles(&[(r#"{"NM_MUN":"Rio de Janeiro"}"#, -44.0, -24.0, -42.0, -22.0)]),
                ),
                crs: None,
                tie_break: TieBreak::LayerOrder,
                municipality_field: "NM_MUN".to_string(),
                neighborhood_field: "NM_BAIRRO".to_string(),
                district_field: "NM_DIST".to_string(),
            },
            conservation_units: NamedLayerConfig {
                path: write(
                    dir,
                    "ucs.geojson",
                    &rectangles(&[(r#"{"nome":"PE Pedra Branca"}"#, -43.5, -23.2, -43.0, -22.8)]),
                ),
                crs: None,
                tie_break: TieBreak::SmallestArea,
                name_field: "nome".to_string(),
            },
            buffer_zones: NamedLayerConfig {
                path: write(
                    dir,
                    "zas.geojson",
                    &rectangles(&[(r#"{"Nome":"ZA Tijuca"}"#, -43.3, -23.0, -43.2, -22.9)]),
                ),
                crs: None,
                tie_break: TieBreak::LayerOrder,
                name_field: "Nome".to_string(),
            },
        }
    }

    #[test]
    fn loads_every_input() {
        let dir = fixture_dir("ok");
        let data = FileReferenceLoader::new(config(&dir)).load().unwrap();

        assert_eq!(data.industrial.len(), 1);
        assert_eq!(data.layers.administrative.len(), 1);
        assert_eq!(data.layers.administrative_fields.municipality, "NM_MUN");
        assert_eq!(
            data.layers
                .conservation_units
                .lookup(-43.2, -23.0)
                .and_then(|f| f.name()),
            Some("PE Pedra Branca")
        );
        assert_eq!(
            data.layers.buffer_zones.lookup(-43.25, -22.95).and_then(|f| f.name()),
            Some("ZA Tijuca")
        );
    }

    #[test]
    fn missing_layer_is_an_error() {
        let dir = fixture_dir("missing");
        let mut config = config(&dir);
        config.buffer_zones.path = dir.join("absent.geojson");

        let result = FileReferenceLoader::new(config).load();
        assert!(matches!(result, Err(SpatialError::Io { .. })));
    }

    #[test]
    fn unreadable_site_list_is_an_error() {
        let dir = fixture_dir("bad_sites");
        let mut config = config(&dir);
        config.industrial_sites = write(&dir, "sites.csv", "name,latitude,longitude\nX,abc,-43\n");

        assert!(FileReferenceLoader::new(config).load().is_err());
    }
}

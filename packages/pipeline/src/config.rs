//! TOML configuration for the alert pipeline.
//!
//! Everything the pipeline needs (credentials, region, radius, reference
//! file locations, schedule) is read once into an immutable [`AlertConfig`]
//! and passed down explicitly. Secrets may come from the environment instead
//! of the file: `FIRMS_MAP_KEY` and `WHAPI_TOKEN`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use fire_alert_detection_models::BoundingBox;
use fire_alert_source::{FetchOptions, ProductConfig};
use fire_alert_spatial::crs::Crs;
use fire_alert_spatial::layer::TieBreak;
use serde::Deserialize;

use crate::run::PipelineConfig;

/// Environment variable overriding `firms.map_key`.
pub const MAP_KEY_ENV: &str = "FIRMS_MAP_KEY";

/// Environment variable overriding `notify.token`.
pub const WHAPI_TOKEN_ENV: &str = "WHAPI_TOKEN";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AlertConfig`].
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("Invalid config value for {field}: {message}")]
    Invalid {
        /// Dotted field path (e.g. `region.west`).
        field: &'static str,
        /// Description of what went wrong.
        message: String,
    },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Upstream detection products.
    pub firms: FirmsConfig,
    /// Monitored region.
    pub region: RegionConfig,
    /// Filtering parameters.
    #[serde(default)]
    pub filter: FilterConfig,
    /// Reference data locations.
    pub reference: ReferenceConfig,
    /// Alert delivery.
    pub notify: NotifyConfig,
    /// Persisted run state.
    #[serde(default)]
    pub state: StateConfig,
    /// Daily run times.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// `[firms]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FirmsConfig {
    /// FIRMS host.
    #[serde(default = "default_firms_base_url")]
    pub base_url: String,
    /// FIRMS map key. Usually supplied via `FIRMS_MAP_KEY`.
    #[serde(default)]
    pub map_key: String,
    /// Lookback window in days (1-10).
    #[serde(default = "default_day_range")]
    pub day_range: u8,
    /// Per-source time budget in seconds, covering retries.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Products to query, in the order their rows are concatenated.
    pub sources: Vec<ProductConfig>,
}

/// `[region]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// Display name used in the alert header.
    pub name: String,
    /// Query box.
    #[serde(flatten)]
    pub bbox: BoundingBox,
}

/// `[filter]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Exclusion radius around industrial sites in kilometers (inclusive).
    #[serde(default = "default_radius_km")]
    pub industrial_radius_km: f64,
    /// Fixed UTC offset used to display acquisition times.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            industrial_radius_km: default_radius_km(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

/// `[reference]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// CSV of industrial heat sources.
    pub industrial_sites: PathBuf,
    /// Municipality/neighborhood/district polygons.
    pub administrative: AdministrativeLayerConfig,
    /// Conservation unit polygons.
    pub conservation_units: NamedLayerConfig,
    /// Buffer zone polygons.
    pub buffer_zones: NamedLayerConfig,
}

/// Administrative layer file and its property names.
#[derive(Debug, Clone, Deserialize)]
pub struct AdministrativeLayerConfig {
    /// `GeoJSON` file.
    pub path: PathBuf,
    /// CRS override; defaults to the file's declared CRS.
    #[serde(default)]
    pub crs: Option<Crs>,
    /// Multi-match resolution.
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Municipality name property.
    #[serde(default = "default_municipality_field")]
    pub municipality_field: String,
    /// Neighborhood name property.
    #[serde(default = "default_neighborhood_field")]
    pub neighborhood_field: String,
    /// District name property.
    #[serde(default = "default_district_field")]
    pub district_field: String,
}

/// A protected-area layer file and its name property.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedLayerConfig {
    /// `GeoJSON` file.
    pub path: PathBuf,
    /// CRS override; defaults to the file's declared CRS.
    #[serde(default)]
    pub crs: Option<Crs>,
    /// Multi-match resolution.
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Name property.
    pub name_field: String,
}

/// `[notify]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Whapi gateway.
    #[serde(default = "default_whapi_base_url")]
    pub base_url: String,
    /// Bearer token. Usually supplied via `WHAPI_TOKEN`.
    #[serde(default)]
    pub token: String,
    /// Destination chat/group id.
    pub destination: String,
    /// Per-request time budget for delivery.
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

/// `[state]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// JSON file holding the last dispatched alert.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// `[schedule]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Local times of day (`HH:MM`) at which to run.
    #[serde(default = "default_times")]
    pub times: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            times: default_times(),
        }
    }
}

impl ScheduleConfig {
    /// Parses the configured times, sorted ascending and deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any entry is not `HH:MM`.
    pub fn parsed_times(&self) -> Result<Vec<NaiveTime>, ConfigError> {
        let mut times = self
            .times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
                    field: "schedule.times",
                    message: format!("'{t}': {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        times.sort_unstable();
        times.dedup();
        Ok(times)
    }
}

fn default_firms_base_url() -> String {
    fire_alert_source::firms::DEFAULT_BASE_URL.to_string()
}

const fn default_day_range() -> u8 {
    1
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_notify_timeout_secs() -> u64 {
    30
}

const fn default_radius_km() -> f64 {
    fire_alert_spatial::industrial::DEFAULT_RADIUS_KM
}

const fn default_utc_offset_hours() -> i32 {
    -3
}

fn default_municipality_field() -> String {
    "NM_MUN".to_string()
}

fn default_neighborhood_field() -> String {
    "NM_BAIRRO".to_string()
}

fn default_district_field() -> String {
    "NM_DIST".to_string()
}

fn default_whapi_base_url() -> String {
    fire_alert_notify::whapi::DEFAULT_BASE_URL.to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state/last_alert.json")
}

fn default_times() -> Vec<String> {
    vec!["10:30".to_string(), "16:00".to_string(), "17:30".to_string()]
}

impl AlertConfig {
    /// Reads, overrides from the environment, and validates a config file.
    ///
    /// Relative reference and state paths are resolved against the config
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text without environment overrides or
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the text does not match the schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Replaces secrets with values from `lookup` when present and
    /// non-empty.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(MAP_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.firms.map_key = key;
        }
        if let Some(token) = lookup(WHAPI_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.notify.token = token;
        }
    }

    /// Makes relative file paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.reference.industrial_sites);
        resolve(&mut self.reference.administrative.path);
        resolve(&mut self.reference.conservation_units.path);
        resolve(&mut self.reference.buffer_zones.path);
        resolve(&mut self.state.path);
    }

    /// Checks every value the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Invalid`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, message: &str| {
            Err(ConfigError::Invalid {
                field,
                message: message.to_string(),
            })
        };

        if self.firms.map_key.trim().is_empty() {
            return invalid("firms.map_key", &format!("missing (set it or {MAP_KEY_ENV})"));
        }
        if !(1..=10).contains(&self.firms.day_range) {
            return invalid("firms.day_range", "must be between 1 and 10");
        }
        if self.firms.timeout_secs == 0 {
            return invalid("firms.timeout_secs", "must be positive");
        }
        if self.firms.sources.is_empty() {
            return invalid("firms.sources", "at least one source is required");
        }
        let mut ids: Vec<&str> = self.firms.sources.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return invalid("firms.sources", "source ids must be unique");
        }
        if !self.region.bbox.is_valid() {
            return invalid("region", "bounding box must satisfy west < east and south < north");
        }
        let radius = self.filter.industrial_radius_km;
        if !radius.is_finite() || radius < 0.0 {
            return invalid("filter.industrial_radius_km", "must be a non-negative number");
        }
        if !(-12..=14).contains(&self.filter.utc_offset_hours) {
            return invalid("filter.utc_offset_hours", "must be between -12 and 14");
        }
        if self.notify.destination.trim().is_empty() {
            return invalid("notify.destination", "missing");
        }
        if self.notify.timeout_secs == 0 {
            return invalid("notify.timeout_secs", "must be positive");
        }
        self.schedule.parsed_times()?;
        Ok(())
    }

    /// Fetch parameters derived from the config.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            bbox: self.region.bbox,
            day_range: self.firms.day_range,
            timeout: Duration::from_secs(self.firms.timeout_secs),
        }
    }

    /// Per-run parameters derived from the config.
    #[must_use]
    pub fn pipeline_config(&self, dry_run: bool) -> PipelineConfig {
        PipelineConfig {
            region_name: self.region.name.clone(),
            fetch: self.fetch_options(),
            industrial_radius_km: self.filter.industrial_radius_km,
            utc_offset_hours: self.filter.utc_offset_hours,
            destination: self.notify.destination.clone(),
            dry_run,
        }
    }
}

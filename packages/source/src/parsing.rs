//! Parsing for the FIRMS area CSV format.
//!
//! Every FIRMS product shares the same core columns (`latitude`,
//! `longitude`, `acq_date`, `acq_time`, `daynight`, `satellite`,
//! `instrument`). Product-specific extras such as `bright_ti4` are ignored,
//! except `confidence` and `frp` which are carried when present.

use std::str::FromStr as _;

use chrono::{NaiveDate, NaiveTime};
use fire_alert_detection_models::{DayNight, Detection};

use crate::SourceError;

/// Columns every detection CSV must provide.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "latitude",
    "longitude",
    "acq_date",
    "acq_time",
    "daynight",
    "satellite",
    "instrument",
];

/// Column positions resolved from the header row.
struct ColumnIndex {
    latitude: usize,
    longitude: usize,
    acq_date: usize,
    acq_time: usize,
    daynight: usize,
    satellite: usize,
    instrument: usize,
    confidence: Option<usize>,
    frp: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, SourceError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| SourceError::Malformed {
                message: format!("missing required column '{name}'"),
            })
        };

        let [latitude, longitude, acq_date, acq_time, daynight, satellite, instrument] =
            REQUIRED_COLUMNS.map(require);

        Ok(Self {
            latitude: latitude?,
            longitude: longitude?,
            acq_date: acq_date?,
            acq_time: acq_time?,
            daynight: daynight?,
            satellite: satellite?,
            instrument: instrument?,
            confidence: find("confidence"),
            frp: find("frp"),
        })
    }
}

/// Parses a FIRMS CSV body into detections tagged with `product`.
///
/// A header-only body is a valid empty result. A body with no header row or
/// one missing a required column is an error for the whole source. Rows that
/// fail to parse are logged and skipped.
///
/// # Errors
///
/// Returns [`SourceError`] if the body is empty or the header row does not
/// contain every column in [`REQUIRED_COLUMNS`].
pub fn parse_detections_csv(product: &str, body: &str) -> Result<Vec<Detection>, SourceError> {
    if body.trim().is_empty() {
        return Err(SourceError::Malformed {
            message: "empty response body".to_string(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let columns = ColumnIndex::resolve(reader.headers()?)?;

    let mut detections = Vec::new();
    let mut skipped = 0_usize;

    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("[{product}] skipping unreadable row {}: {e}", line + 1);
                skipped += 1;
                continue;
            }
        };

        match parse_row(product, &record, &columns) {
            Some(detection) => detections.push(detection),
            None => {
                log::warn!(
                    "[{product}] skipping malformed row {}: {:?}",
                    line + 1,
                    record.iter().collect::<Vec<_>>()
                );
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!("[{product}] skipped {skipped} malformed row(s)");
    }

    Ok(detections)
}

fn parse_row(product: &str, record: &csv::StringRecord, columns: &ColumnIndex) -> Option<Detection> {
    let field = |i: usize| record.get(i).map(str::trim);

    let latitude = parse_coordinate(field(columns.latitude)?, 90.0)?;
    let longitude = parse_coordinate(field(columns.longitude)?, 180.0)?;
    let acquired_on = parse_acq_date(field(columns.acq_date)?)?;
    let acquired_at = parse_acq_time(field(columns.acq_time)?)?;
    let day_night = DayNight::from_str(field(columns.daynight)?).ok()?;

    Some(Detection {
        product: product.to_string(),
        latitude,
        longitude,
        acquired_on,
        acquired_at,
        day_night,
        satellite: field(columns.satellite)?.to_string(),
        instrument: field(columns.instrument)?.to_string(),
        confidence: columns
            .confidence
            .and_then(field)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        frp: columns.frp.and_then(field).and_then(|s| s.parse().ok()),
    })
}

/// Parses a coordinate, rejecting non-finite values and values outside
/// `[-limit, limit]`.
fn parse_coordinate(s: &str, limit: f64) -> Option<f64> {
    let value = s.parse::<f64>().ok()?;
    (value.is_finite() && value.abs() <= limit).then_some(value)
}

/// Parses a FIRMS `acq_date` (`YYYY-MM-DD`).
#[must_use]
pub fn parse_acq_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parses a FIRMS `acq_time` (UTC `HHMM`, leading zeros optional, so `332`
/// is 03:32).
#[must_use]
pub fn parse_acq_time(s: &str) -> Option<NaiveTime> {
    if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hhmm = s.parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hhmm / 100, hhmm % 100, 0)
}

//! Alert message rendering.
//!
//! The alert is plain text in Portuguese, one block per detection, in the
//! order the pipeline produced them. Acquisition times arrive in UTC and are
//! shown in the region's local time.

use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use fire_alert_detection_models::{ClassifiedDetection, DayNight};

/// Formats a UTC acquisition time as local `HH:MM` given a fixed UTC offset
/// in hours (e.g. `-3` for Brasília). The date rollover is ignored since
/// only the time of day is displayed.
#[must_use]
pub fn local_time_label(acquired_on: NaiveDate, acquired_at: NaiveTime, utc_offset_hours: i32) -> String {
    let utc = acquired_on.and_time(acquired_at);
    TimeDelta::try_hours(i64::from(utc_offset_hours))
        .and_then(|offset| utc.checked_add_signed(offset))
        .unwrap_or(utc)
        .format("%H:%M")
        .to_string()
}

/// Portuguese label for the acquisition period.
#[must_use]
pub const fn period_label(day_night: DayNight) -> &'static str {
    match day_night {
        DayNight::Day => "Dia",
        DayNight::Night => "Noite",
    }
}

/// Renders the alert body for `detections` found on `today` in `region`.
#[must_use]
pub fn render_alert(
    detections: &[ClassifiedDetection],
    today: NaiveDate,
    region: &str,
    utc_offset_hours: i32,
) -> String {
    let mut message = format!(
        "Focos de calor encontrados em {region} hoje ({today}) em UCs ou ZAs:\n\n"
    );

    for (i, item) in detections.iter().enumerate() {
        let d = &item.detection;
        let local = local_time_label(d.acquired_on, d.acquired_at, utc_offset_hours);

        writeln!(message, "Foco {}:", i + 1).unwrap();
        writeln!(message, "  Latitude: {}", d.latitude).unwrap();
        writeln!(message, "  Longitude: {}", d.longitude).unwrap();
        writeln!(message, "  Data: {}", d.acquired_on).unwrap();
        writeln!(message, "  Hora (local): {local}").unwrap();
        writeln!(message, "  Período: {}", period_label(d.day_night)).unwrap();
        writeln!(
            message,
            "  Município: {}",
            item.municipality.as_deref().unwrap_or("N/A")
        )
        .unwrap();
        if let Some(neighborhood) = &item.neighborhood {
            writeln!(message, "  Bairro: {neighborhood}").unwrap();
        }
        if let Some(district) = &item.district {
            writeln!(message, "  Distrito: {district}").unwrap();
        }
        if let Some(unit) = &item.conservation_unit {
            writeln!(message, "  Unidade de Conservação: {unit}").unwrap();
        }
        if let Some(zone) = &item.buffer_zone {
            writeln!(message, "  Zona de Amortecimento: {zone}").unwrap();
        }
        writeln!(message, "  Fonte: {}, {}\n", d.satellite, d.instrument).unwrap();
    }

    message
}

//! Time-of-day trigger for the `schedule` command.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Utc};

/// Current wall-clock time in the region, given its fixed UTC offset.
#[must_use]
pub fn region_now(utc_offset_hours: i32) -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    TimeDelta::try_hours(i64::from(utc_offset_hours))
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or(now)
}

/// The first configured time strictly after `now`, rolling over to the
/// next day when every time has passed. `times` must be sorted.
#[must_use]
pub fn next_run(now: NaiveDateTime, times: &[NaiveTime]) -> Option<NaiveDateTime> {
    if let Some(time) = times.iter().find(|t| **t > now.time()) {
        return Some(now.date().and_time(*time));
    }
    let first = times.first()?;
    now.date().succ_opt().map(|tomorrow| tomorrow.and_time(*first))
}

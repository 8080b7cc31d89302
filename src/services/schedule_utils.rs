use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub fn parse_datetime(value: &str) -> AppResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|err| {
        AppError::validation_with_details(
            "invalid datetime",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

pub fn format_datetime(dt: DateTime<FixedOffset>) -> String {
    dt.to_rfc3339()
}

pub fn add_minutes(dt: DateTime<FixedOffset>, minutes: i64) -> AppResult<DateTime<FixedOffset>> {
    Duration::try_minutes(minutes)
        .and_then(|delta| dt.checked_add_signed(delta))
        .ok_or_else(|| {
            AppError::validation_with_details(
                "time arithmetic out of range",
                json!({"value": format_datetime(dt), "minutes": minutes}),
            )
        })
}

/// Whole minutes from `start` to `end`; negative spans count as zero.
pub fn duration_minutes(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> i64 {
    end.signed_duration_since(start).num_minutes().max(0)
}

/// Fractional days from `from` until `until`, floored at zero.
pub fn days_between(from: DateTime<FixedOffset>, until: DateTime<FixedOffset>) -> f64 {
    let minutes = until.signed_duration_since(from).num_minutes() as f64;
    (minutes / (24.0 * 60.0)).max(0.0)
}

pub fn overlaps(
    a_start: DateTime<FixedOffset>,
    a_end: DateTime<FixedOffset>,
    b_start: DateTime<FixedOffset>,
    b_end: DateTime<FixedOffset>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// `hour:00` on `date` in `offset`; hour 24 is midnight of the next day.
pub fn at_hour(date: NaiveDate, hour: u32, offset: FixedOffset) -> DateTime<FixedOffset> {
    let midnight = date.and_time(NaiveTime::from_hms_opt(0, 0, 0).expect("00:00 must be valid"));
    let local = midnight + Duration::hours(i64::from(hour));
    offset
        .from_local_datetime(&local)
        .single()
        .unwrap_or_else(|| offset.from_utc_datetime(&local))
}

pub fn hour_of(dt: DateTime<FixedOffset>) -> u32 {
    dt.time().hour()
}

pub fn same_day(a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> bool {
    a.date_naive() == b.date_naive()
}

/// Stable block id derived from the task and the block's start.
pub fn block_id(task_id: &str, start: DateTime<FixedOffset>) -> String {
    let name = format!("{}@{}", task_id, format_datetime(start));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

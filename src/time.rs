//! Timestamp normalisation.
//!
//! Every timestamp that leaves this crate (database rows, JSON payloads,
//! checkpoints) is an ISO-8601 string with an explicit UTC offset and
//! millisecond precision, e.g. `2024-03-01T09:30:00.000+13:00`.

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SecondsFormat, TimeZone};

pub type Timestamp = DateTime<FixedOffset>;

pub fn now() -> Timestamp {
    Local::now().fixed_offset()
}

pub fn now_iso() -> String {
    to_iso(&now())
}

pub fn to_iso(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, false)
}

pub fn parse_iso(value: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(value).map_err(|err| anyhow!("invalid timestamp '{value}': {err}"))
}

/// Interpret epoch millis in the device's local offset.
pub fn from_epoch_millis(millis: i64) -> Result<Timestamp> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| anyhow!("epoch millis {millis} out of range"))
}

pub fn epoch_millis_to_iso(millis: i64) -> Result<String> {
    from_epoch_millis(millis).map(|ts| to_iso(&ts))
}

pub fn iso_to_epoch_millis(value: &str) -> Result<i64> {
    parse_iso(value).map(|ts| ts.timestamp_millis())
}

/// Resolve a wall-clock time on this device. Ambiguous times (DST fall-back)
/// take the earlier instant; non-existent ones (spring-forward gap) error.
pub fn from_local(local: NaiveDateTime) -> Result<Timestamp> {
    Local
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| anyhow!("local time {local} does not exist in this timezone"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn iso_keeps_offset_and_millis() {
        let offset = FixedOffset::east_opt(13 * 3600).unwrap();
        let ts = offset.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(to_iso(&ts), "2024-03-01T09:30:00.000+13:00");
    }

    #[test]
    fn epoch_round_trip_is_lossless_at_millis() {
        let millis = 1_709_251_200_123;
        let iso = epoch_millis_to_iso(millis).unwrap();
        assert_eq!(iso_to_epoch_millis(&iso).unwrap(), millis);
    }

    #[test]
    fn parse_rejects_missing_offset() {
        assert!(parse_iso("2024-03-01T09:30:00").is_err());
        assert!(parse_iso("not a date").is_err());
    }

    #[test]
    fn utc_and_offset_forms_compare_equal() {
        let a = parse_iso("2024-03-01T00:00:00.000+00:00").unwrap();
        let b = parse_iso("2024-03-01T13:00:00.000+13:00").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn local_date_time_resolves() {
        let local = NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let ts = from_local(local).unwrap();
        assert_eq!(ts.naive_local(), local);
    }
}

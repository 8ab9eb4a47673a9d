//! Date normalization for heterogeneous timeline inputs.
//!
//! Converts epoch numbers, ISO-8601 strings and a handful of locale formats
//! into a canonical UTC instant with millisecond precision. Every failure is a
//! plain `None`; nothing here returns an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest representable distance from the epoch, in milliseconds (±100,000,000 days).
pub const MAX_EPOCH_MILLIS: i64 = 8_640_000_000_000_000;

/// Date-only patterns tried after the ISO and epoch attempts fail.
pub const EXPLICIT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Anything that can be normalized into a canonical instant.
pub trait ToInstant {
    fn to_instant(&self) -> Option<DateTime<Utc>>;
}

impl ToInstant for DateTime<Utc> {
    fn to_instant(&self) -> Option<DateTime<Utc>> {
        canonical(*self)
    }
}

impl ToInstant for i64 {
    fn to_instant(&self) -> Option<DateTime<Utc>> {
        if *self == 0 {
            return None;
        }
        from_epoch_millis(*self)
    }
}

impl ToInstant for f64 {
    fn to_instant(&self) -> Option<DateTime<Utc>> {
        if !self.is_finite() || *self == 0.0 {
            return None;
        }
        let truncated = self.trunc();
        if truncated.abs() > MAX_EPOCH_MILLIS as f64 {
            return None;
        }
        from_epoch_millis(truncated as i64)
    }
}

impl ToInstant for str {
    fn to_instant(&self) -> Option<DateTime<Utc>> {
        parse_date_str(self)
    }
}

impl ToInstant for String {
    fn to_instant(&self) -> Option<DateTime<Utc>> {
        parse_date_str(self)
    }
}

impl ToInstant for Value {
    fn to_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i.to_instant(),
                None => n.as_f64().and_then(|f| f.to_instant()),
            },
            Value::String(s) => parse_date_str(s),
            _ => None,
        }
    }
}

impl<T: ToInstant + ?Sized> ToInstant for &T {
    fn to_instant(&self) -> Option<DateTime<Utc>> {
        (**self).to_instant()
    }
}

/// Normalize a value into a canonical instant.
///
/// Zero, the empty string and null are rejected outright; zero is never read
/// as the epoch start.
pub fn parse_date<T: ToInstant + ?Sized>(value: &T) -> Option<DateTime<Utc>> {
    value.to_instant()
}

/// Check whether a string is in a supported date format.
pub fn validate_date_format(date: &str) -> bool {
    parse_date_str(date).is_some()
}

/// Format an instant as ISO-8601 UTC with millisecond precision.
pub fn to_iso_string(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(instant) = parse_iso(s) {
        return Some(instant);
    }

    if is_integer_literal(s) {
        if let Some(instant) = s.parse::<i64>().ok().and_then(from_epoch_millis) {
            return Some(instant);
        }
    }

    EXPLICIT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(midnight_utc)
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return canonical(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return canonical(dt.with_timezone(&Utc));
        }
    }

    // Offset-less date-times are read as UTC.
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return canonical(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return midnight_utc(date);
    }

    // Year-month and bare four-digit years are ISO shorthands.
    if s.len() == 7 {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
            return midnight_utc(date);
        }
    }
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(date) = s.parse::<i32>().ok().and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)) {
            return midnight_utc(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return canonical(dt.with_timezone(&Utc));
    }

    None
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms.abs() > MAX_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(ms)
}

fn midnight_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).and_then(|naive| canonical(naive.and_utc()))
}

fn canonical(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if instant.timestamp_millis().abs() > MAX_EPOCH_MILLIS {
        return None;
    }
    Some(instant.trunc_subsecs(3))
}

/// Inclusive window used by the date-range filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(with = "iso_millis")]
    pub start: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Inclusive overlap: the interval only has to touch the window.
    pub fn overlaps(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> bool {
        *start <= self.end && *end >= self.start
    }
}

/// Serde adapter writing instants the way `to_iso_string` does.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso_string(instant))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date_str(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_falsy_inputs_rejected() {
        assert_eq!(parse_date(&json!(0)), None);
        assert_eq!(parse_date(&json!(0.0)), None);
        assert_eq!(parse_date(&json!("")), None);
        assert_eq!(parse_date(&json!(null)), None);
        assert_eq!(parse_date(&json!(false)), None);
        assert_eq!(parse_date("   "), None);
    }

    #[test]
    fn test_iso_strings() {
        assert_eq!(parse_date("2024-01-01"), Some(utc(2024, 1, 1)));
        assert_eq!(
            parse_date("2024-01-01T10:30:00Z"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap())
        );
        assert_eq!(
            parse_date("2024-01-01T12:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date("2024-03-05T08:15:00"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 8, 15, 0).unwrap())
        );
        assert_eq!(parse_date("2024-06"), Some(utc(2024, 6, 1)));
        assert_eq!(parse_date("1999"), Some(utc(1999, 1, 1)));
    }

    #[test]
    fn test_epoch_numbers_and_strings() {
        let expected = DateTime::from_timestamp_millis(1_704_067_200_000).unwrap();
        assert_eq!(parse_date(&json!(1_704_067_200_000i64)), Some(expected));
        assert_eq!(parse_date(&json!(1_704_067_200_000.7)), Some(expected));
        assert_eq!(parse_date("1704067200000"), Some(expected));
        assert_eq!(parse_date(&json!(9.0e15)), None);
    }

    #[test]
    fn test_explicit_formats() {
        assert_eq!(parse_date("01/15/2024"), Some(utc(2024, 1, 15)));
        assert_eq!(parse_date("01-15-2024"), Some(utc(2024, 1, 15)));
        assert_eq!(parse_date("13/45/2024"), None);
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2024-13-45"), None);
        assert_eq!(parse_date(&json!({"date": "2024-01-01"})), None);
        assert_eq!(parse_date(&json!(["2024-01-01"])), None);
        assert_eq!(parse_date(&json!(true)), None);
    }

    #[test]
    fn test_iso_round_trip() {
        for raw in ["2024-01-01", "2024-02-29T23:59:59.999Z", "2021-07-04T01:02:03.123456+05:30"] {
            let parsed = parse_date(raw).unwrap();
            assert_eq!(parse_date(&to_iso_string(&parsed)), Some(parsed));
        }
    }

    #[test]
    fn test_iso_string_format() {
        assert_eq!(to_iso_string(&utc(2024, 1, 5)), "2024-01-05T00:00:00.000Z");
    }

    #[test]
    fn test_date_range_overlap_inclusive() {
        let range = DateRange::new(utc(2024, 2, 1), utc(2024, 2, 28));
        assert!(range.overlaps(&utc(2024, 1, 1), &utc(2024, 12, 31)));
        assert!(range.overlaps(&utc(2024, 1, 1), &utc(2024, 2, 1)));
        assert!(range.overlaps(&utc(2024, 2, 28), &utc(2024, 3, 10)));
        assert!(!range.overlaps(&utc(2024, 3, 1), &utc(2024, 3, 10)));
    }

    #[test]
    fn test_validate_date_format() {
        assert!(validate_date_format("2024-01-01"));
        assert!(!validate_date_format("yesterday"));
    }
}

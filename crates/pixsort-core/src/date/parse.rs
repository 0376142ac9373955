use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

/// Formats carrying a UTC offset. Tried first.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y:%m:%d %H:%M:%S%.f%z",
    "%Y:%m:%d %H:%M:%S%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y:%m:%d", "%Y/%m/%d", "%Y.%m.%d"];

static DATE_SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\d{4}[-:/.]\d{1,2}[-:/.]\d{1,2}(?:[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?)?(?:Z|[+-]\d{2}:?\d{2})?",
    )
    .unwrap()
});

/// Parse a timestamp string from any metadata source into local wall-clock time.
///
/// Values with an explicit offset are converted to the local zone, then the
/// offset is dropped. A final pass pulls the date-like span out of noisy
/// values (`"Taken: 2023:01:01 10:00:00 (camera)"`) and retries.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_matches(|c| c == '"' || c == '\0').trim();
    if s.is_empty() || is_zero_date(s) {
        return None;
    }
    parse_exact(s).or_else(|| {
        let span = DATE_SPAN_RE.find(s)?.as_str();
        if span == s {
            return None;
        }
        parse_exact(span)
    })
}

/// `0000:00:00 00:00:00` and friends, written by cameras with no clock.
pub fn is_zero_date(s: &str) -> bool {
    let digits: Vec<char> = s.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.len() >= 8 && digits[..8].iter().all(|c| *c == '0')
}

fn parse_exact(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Local).naive_local());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

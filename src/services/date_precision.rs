//! Precision-aware dates: reading raw input at a stated precision, normalizing
//! the stored instant and rendering it back for display.
//!
//! Year and month entries are pinned to the first instant of their period in
//! the configured timezone. Day, hour and minute entries keep the instant as
//! given; their precision only affects rendering.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::models::{DisplayConfig, Precision, TimeFormat};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn year_month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<year>\d{4})(?:-(?P<month>\d{1,2}))?$").expect("static pattern is valid")
    })
}

/// Reads `raw` as a date at `precision` and returns the canonical stored instant.
pub fn parse_entry_date(raw: &str, precision: Precision, config: &DisplayConfig) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(normalize(dt.with_timezone(&Utc), precision, config));
    }

    // Coarser precisions also accept the finer shapes a form may send.
    let naive = match precision {
        Precision::Year => parse_year_or_month(raw, false)
            .or_else(|| parse_year_or_month(raw, true))
            .or_else(|| parse_day(raw))
            .or_else(|| parse_naive_datetime(raw)),
        Precision::Month => parse_year_or_month(raw, true)
            .or_else(|| parse_day(raw))
            .or_else(|| parse_naive_datetime(raw)),
        Precision::Day => parse_day(raw).or_else(|| parse_naive_datetime(raw)),
        Precision::Hour | Precision::Minute => parse_naive_datetime(raw),
    };

    let naive = naive.ok_or_else(|| AppError::invalid_date(raw, precision))?;
    Ok(normalize(localize(naive, config.timezone), precision, config))
}

/// Reads a full instant (RFC 3339, or a naive date-time in the configured zone).
pub fn parse_instant(raw: &str, config: &DisplayConfig) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_naive_datetime(raw)
        .map(|naive| localize(naive, config.timezone))
        .ok_or_else(|| AppError::invalid_date(raw, "instant"))
}

/// Reads an inclusive search bound. A bare `YYYY-MM-DD` covers the whole day.
pub fn parse_range_bound(raw: &str, is_end: bool, config: &DisplayConfig) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Some(day) = parse_day(raw) {
        let start = localize(day, config.timezone);
        if is_end {
            let next_day = localize(day + Duration::days(1), config.timezone);
            return Ok(next_day - Duration::milliseconds(1));
        }
        return Ok(start);
    }
    parse_instant(raw, config)
}

/// Pins year and month instants to the start of their period.
pub fn normalize(instant: DateTime<Utc>, precision: Precision, config: &DisplayConfig) -> DateTime<Utc> {
    let local = instant.with_timezone(&config.timezone);
    let start = match precision {
        Precision::Year => NaiveDate::from_ymd_opt(local.year(), 1, 1),
        Precision::Month => NaiveDate::from_ymd_opt(local.year(), local.month(), 1),
        Precision::Day | Precision::Hour | Precision::Minute => return instant,
    };

    start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| localize(naive, config.timezone))
        .unwrap_or(instant)
}

/// Renders `date` the way a timeline shows it for the given precision.
pub fn format_entry_date(date: DateTime<Utc>, precision: Precision, config: &DisplayConfig) -> String {
    let twelve_hour = config.time_format == TimeFormat::TwelveHour;
    let pattern = match precision {
        Precision::Year => "%Y",
        Precision::Month => "%B %Y",
        Precision::Day => "%B %-d, %Y",
        Precision::Hour if twelve_hour => "%B %-d, %Y %I:00 %p",
        Precision::Hour => "%B %-d, %Y %H:00",
        Precision::Minute if twelve_hour => "%B %-d, %Y %I:%M %p",
        Precision::Minute => "%B %-d, %Y %H:%M",
    };
    date.with_timezone(&config.timezone).format(pattern).to_string()
}

fn parse_year_or_month(raw: &str, want_month: bool) -> Option<NaiveDateTime> {
    let caps = year_month_pattern().captures(raw)?;
    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    let month = match (caps.name("month"), want_month) {
        (Some(m), true) => m.as_str().parse().ok()?,
        (None, false) => 1,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_day(raw: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

fn parse_naive_datetime(raw: &str) -> Option<NaiveDateTime> {
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Resolves a wall-clock time in `tz`. Times skipped by a DST jump move forward an hour.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

use chrono::{Datelike, NaiveDate};

use crate::error::{Error, Result};

/// Format used for every date string the crate hands out
pub const ISO_FORMAT: &str = "%Y-%m-%d";

/// Normalize a record date to `YYYY-MM-DD`.
///
/// Accepts ISO dates as-is and rewrites `M/D/YYYY` with zero-padded month and
/// day. Anything else, including impossible days like `2/30/2024`, is a
/// [`Error::DataFormat`].
pub fn normalize_date(raw: &str) -> Result<String> {
    parse_date(raw).map(to_iso)
}

/// Parse a record date in either accepted form
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();

    let parsed = if trimmed.contains('/') {
        parse_slash(trimmed)
    } else {
        parse_iso(trimmed)
    };

    parsed.ok_or_else(|| Error::data_format(raw))
}

fn parse_iso(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }

    let year = digits(&s[0..4], 4)?;
    let month = digits(&s[5..7], 2)?;
    let day = digits(&s[8..10], 2)?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

fn parse_slash(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split('/');
    let month = digits(parts.next()?, 2)?;
    let day = digits(parts.next()?, 2)?;
    let year_part = parts.next()?;
    if parts.next().is_some() || year_part.len() != 4 {
        return None;
    }
    let year = digits(year_part, 4)?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Parse 1..=max_len ASCII digits
fn digits(s: &str, max_len: usize) -> Option<u32> {
    if s.is_empty() || s.len() > max_len || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn to_iso(date: NaiveDate) -> String {
    date.format(ISO_FORMAT).to_string()
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-based) of `year`
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

pub fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

/// Weekday of January 1 of `year`, 0 = Sunday .. 6 = Saturday
pub fn first_day_offset(year: i32) -> usize {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .map(|d| d.weekday().num_days_from_sunday() as usize)
        .unwrap_or(0)
}

/// Long form used in the details panel header, e.g. "Friday, March 15, 2024"
pub fn format_long_date(date: NaiveDate) -> String {
    format!(
        "{}, {} {}, {}",
        date.format("%A"),
        date.format("%B"),
        date.day(),
        date.year()
    )
}

/// Parse a strictly ISO date string, used for lookups and URL fragments
pub fn parse_iso_strict(s: &str) -> Option<NaiveDate> {
    parse_iso(s)
}

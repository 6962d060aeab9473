use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::error::{Error, Result};

static RE_YMD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Parse a `YYYY-MM-DD` date, naming the offending parameter on failure.
/// The year must be exactly four digits.
pub fn parse_ymd(value: &str, field: &str) -> Result<NaiveDate> {
    let invalid = || Error::InvalidInput(format!("{field} must be YYYY-MM-DD, got '{value}'"));
    let trimmed = value.trim();
    if !RE_YMD.is_match(trimmed) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())
}

pub fn format_ymd(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Number of calendar days in `[start, end]`, inclusive. Zero if `start > end`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    if start > end {
        0
    } else {
        (end - start).num_days() + 1
    }
}

/// Every date in `[start, end]`, ascending.
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(days_inclusive(start, end) as usize);
    let mut d = start;
    while d <= end {
        out.push(d);
        d += Duration::days(1);
    }
    out
}

pub fn first_day_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2025, 1), d(2025, 1, 31));
        assert_eq!(last_day_of_month(2025, 2), d(2025, 2, 28));
        assert_eq!(last_day_of_month(2024, 2), d(2024, 2, 29)); // Leap year
        assert_eq!(last_day_of_month(2025, 12), d(2025, 12, 31));
    }

    #[test]
    fn test_parse_ymd() {
        assert_eq!(parse_ymd("2024-01-05", "startDate").unwrap(), d(2024, 1, 5));
        let err = parse_ymd("05.01.2024", "startDate").unwrap_err();
        assert!(err.to_string().contains("startDate"));
        assert_eq!(parse_ymd(" 2024-01-05 ", "startDate").unwrap(), d(2024, 1, 5));
        for bad in ["-2024-01-05", "+2024-01-05", "20240-01-05", "2024-1-5", "2024-02-30"] {
            assert!(parse_ymd(bad, "endDate").is_err(), "{bad}");
        }
    }

    #[test]
    fn test_dates_between() {
        let days = dates_between(d(2024, 2, 27), d(2024, 3, 1));
        assert_eq!(days, vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);
        assert!(dates_between(d(2024, 3, 2), d(2024, 3, 1)).is_empty());
    }

    #[test]
    fn test_days_inclusive() {
        assert_eq!(days_inclusive(d(2024, 1, 1), d(2024, 1, 1)), 1);
        assert_eq!(days_inclusive(d(2024, 1, 1), d(2024, 1, 31)), 31);
        assert_eq!(days_inclusive(d(2024, 1, 2), d(2024, 1, 1)), 0);
    }
}

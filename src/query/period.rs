use std::sync::LazyLock;

use chrono::{Datelike, Days, Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;

use crate::date_util::{dates_between, days_inclusive, first_day_of_month, last_day_of_month, parse_ymd};
use crate::error::{Error, Result};

static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)(\d{1,4})d$").unwrap());
static RE_EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})$").unwrap()
});

/// Longest accepted range in days. The ads platform keeps a little over
/// three years of insights.
pub const MAX_RANGE_DAYS: i64 = 1_140;

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Build from `YYYY-MM-DD` strings, rejecting `start > end` and ranges
    /// longer than [`MAX_RANGE_DAYS`].
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let range = Self::new(parse_ymd(start, "startDate")?, parse_ymd(end, "endDate")?);
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::InvalidInput(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        if self.len_days() > MAX_RANGE_DAYS {
            return Err(Error::InvalidInput(format!(
                "range {self} spans {} days; at most {MAX_RANGE_DAYS} are allowed",
                self.len_days()
            )));
        }
        Ok(())
    }

    /// Length in days, counting both ends.
    pub fn len_days(&self) -> i64 {
        days_inclusive(self.start, self.end)
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        dates_between(self.start, self.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// The immediately preceding range of the same length.
    pub fn previous(&self) -> Result<Self> {
        let out_of_range = || Error::InvalidInput(format!("no period precedes {self}"));
        let end = self.start.checked_sub_days(Days::new(1)).ok_or_else(out_of_range)?;
        let len = u64::try_from(self.len_days() - 1).map_err(|_| out_of_range())?;
        let start = end.checked_sub_days(Days::new(len)).ok_or_else(out_of_range)?;
        Ok(Self { start, end })
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A named dashboard period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Month(i32, u8),
    /// Last N days ending on the given date.
    Rolling(u32, NaiveDate),
    MonthToDate(NaiveDate),
    Custom(DateRange),
}

impl Period {
    /// Parse a period string relative to today.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_as_of(s, chrono::Local::now().date_naive())
    }

    /// Parse a period string.
    ///
    /// Supported formats:
    /// - `7d`, `30d` - rolling, ending today
    /// - `mtd` - month to date
    /// - `last-month` - the previous calendar month
    /// - `2025-01` - month
    /// - `2025-01-01..2025-01-31` - explicit
    pub fn parse_as_of(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "mtd" => return Ok(Period::MonthToDate(today)),
            "last-month" => {
                let prev = first_day_of_month(today) - Duration::days(1);
                return Ok(Period::Month(prev.year(), prev.month() as u8));
            }
            _ => {}
        }

        if let Some(caps) = RE_ROLLING.captures(s) {
            let n: u32 = caps[1]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid day count: {s}")))?;
            if n == 0 {
                return Err(Error::PeriodParse("rolling period needs at least one day".into()));
            }
            return Ok(Period::Rolling(n, today));
        }

        if let Some(caps) = RE_EXPLICIT.captures(s) {
            let range = DateRange::new(parse_ymd(&caps[1], "start")?, parse_ymd(&caps[2], "end")?);
            range
                .validate()
                .map_err(|e| Error::PeriodParse(e.to_string()))?;
            return Ok(Period::Custom(range));
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid year: {s}")))?;
            let month: u8 = caps[2]
                .parse()
                .map_err(|_| Error::PeriodParse(format!("invalid month: {s}")))?;
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    pub fn to_key(&self) -> String {
        match self {
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Rolling(n, _) => format!("{n}d"),
            Period::MonthToDate(_) => "mtd".to_string(),
            Period::Custom(range) => range.to_string(),
        }
    }

    /// The concrete range, held to the same limits as explicit ranges.
    pub fn date_range(&self) -> Result<DateRange> {
        let ymd = |y: i32, m: u32, d: u32| {
            NaiveDate::from_ymd_opt(y, m, d)
                .ok_or_else(|| Error::PeriodParse(format!("date out of range: {y}-{m}-{d}")))
        };
        let range = match self {
            Period::Month(y, m) => {
                DateRange::new(ymd(*y, *m as u32, 1)?, last_day_of_month(*y, *m as u32))
            }
            Period::Rolling(n, as_of) => {
                DateRange::new(*as_of - Duration::days(*n as i64 - 1), *as_of)
            }
            Period::MonthToDate(as_of) => DateRange::new(first_day_of_month(*as_of), *as_of),
            Period::Custom(range) => *range,
        };
        range
            .validate()
            .map_err(|e| Error::PeriodParse(e.to_string()))?;
        Ok(range)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_previous_period_adjacent_and_same_length() {
        let range = DateRange::new(d(2024, 3, 1), d(2024, 3, 31));
        let prev = range.previous().unwrap();
        assert_eq!(prev, DateRange::new(d(2024, 1, 30), d(2024, 2, 29)));
        assert_eq!(prev.end + Duration::days(1), range.start);
        assert_eq!(prev.len_days(), range.len_days());

        // Applying twice gives the period before that, not the original.
        let prev2 = prev.previous().unwrap();
        assert_eq!(prev2.end + Duration::days(1), prev.start);
        assert_ne!(prev2, range);
    }

    #[test]
    fn test_previous_single_day() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 1));
        assert_eq!(range.previous().unwrap(), DateRange::new(d(2023, 12, 31), d(2023, 12, 31)));
    }

    #[test]
    fn test_previous_property_holds_broadly() {
        let base = d(2023, 11, 15);
        for offset in 0..120 {
            for len in 1..40 {
                let start = base + Duration::days(offset);
                let range = DateRange::new(start, start + Duration::days(len - 1));
                let prev = range.previous().unwrap();
                assert_eq!(prev.end + Duration::days(1), range.start);
                assert_eq!(prev.len_days(), range.len_days());
            }
        }
    }

    #[test]
    fn test_parse_range_rejects_inverted() {
        assert!(DateRange::parse("2024-01-01", "2024-01-31").is_ok());
        assert!(matches!(
            DateRange::parse("2024-02-01", "2024-01-31"),
            Err(Error::InvalidInput(_))
        ));
        let err = DateRange::parse("2024-02-30", "2024-03-01").unwrap_err();
        assert!(err.to_string().contains("startDate"));
    }

    #[test]
    fn test_previous_of_earliest_date_is_an_error() {
        let range = DateRange::new(NaiveDate::MIN, NaiveDate::MIN + Duration::days(4));
        assert!(matches!(range.previous(), Err(Error::InvalidInput(_))));
        let range = DateRange::new(d(0, 1, 1), d(0, 1, 5));
        assert_eq!(range.previous().unwrap().end, d(-1, 12, 31));
    }

    #[test]
    fn test_parse_rejects_malformed_years() {
        for (start, end) in [
            ("-262143-01-01", "-262143-01-05"),
            ("+2024-01-01", "2024-01-05"),
            ("12024-01-01", "12024-01-05"),
            ("2024-1-01", "2024-01-05"),
        ] {
            let err = DateRange::parse(start, end).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{start}: {err}");
        }
    }

    #[test]
    fn test_range_length_is_capped() {
        let longest = DateRange::new(d(2022, 1, 1), d(2022, 1, 1) + Duration::days(MAX_RANGE_DAYS - 1));
        assert!(longest.validate().is_ok());
        assert!(DateRange::parse("0000-01-01", "9999-12-31").is_err());
        let today = d(2024, 3, 15);
        assert!(Period::parse_as_of("9999d", today).unwrap().date_range().is_err());
        assert!(matches!(
            Period::parse_as_of("2000-01-01..2024-01-01", today),
            Err(Error::PeriodParse(_))
        ));
    }

    #[test]
    fn test_parse_presets() {
        let today = d(2024, 3, 15);
        assert_eq!(
            Period::parse_as_of("7d", today).unwrap().date_range().unwrap(),
            DateRange::new(d(2024, 3, 9), d(2024, 3, 15))
        );
        assert_eq!(
            Period::parse_as_of("mtd", today).unwrap().date_range().unwrap(),
            DateRange::new(d(2024, 3, 1), d(2024, 3, 15))
        );
        assert_eq!(
            Period::parse_as_of("last-month", today).unwrap(),
            Period::Month(2024, 2)
        );
        assert_eq!(
            Period::parse_as_of("last-month", d(2024, 1, 10)).unwrap(),
            Period::Month(2023, 12)
        );
    }

    #[test]
    fn test_parse_calendar_periods() {
        let today = d(2024, 3, 15);
        assert_eq!(
            Period::parse_as_of("2024-02", today).unwrap().date_range().unwrap(),
            DateRange::new(d(2024, 2, 1), d(2024, 2, 29))
        );
        assert_eq!(
            Period::parse_as_of("2024-01-05..2024-01-20", today).unwrap(),
            Period::Custom(DateRange::new(d(2024, 1, 5), d(2024, 1, 20)))
        );
    }

    #[test]
    fn test_parse_invalid() {
        let today = d(2024, 3, 15);
        assert!(Period::parse_as_of("garbage", today).is_err());
        assert!(Period::parse_as_of("2025", today).is_err());
        assert!(Period::parse_as_of("2025-Q1", today).is_err());
        assert!(Period::parse_as_of("2025-13", today).is_err());
        assert!(Period::parse_as_of("0d", today).is_err());
        assert!(matches!(
            Period::parse_as_of("2024-02-01..2024-01-01", today),
            Err(Error::PeriodParse(_))
        ));
    }

    #[test]
    fn test_to_key() {
        assert_eq!(Period::Month(2025, 1).to_key(), "2025-01");
        assert_eq!(Period::Rolling(30, d(2024, 1, 1)).to_key(), "30d");
    }
}

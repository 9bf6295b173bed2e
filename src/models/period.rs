use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("Month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    #[error("Year must be between 1 and 9999, got {0}")]
    InvalidYear(i32),

    #[error("Invalid period '{0}', expected YYYY-MM")]
    Malformed(String),
}

/// A calendar month, the unit of recurrence and budgeting.
///
/// A period covers the half-open UTC range
/// `[first instant of the month, first instant of the next month)`.
/// Every "one entry per period" check and every aggregate is scoped to it.
///
/// Years are limited to four digits so that stored RFC 3339 timestamps and
/// `YYYY-MM` keys sort lexicographically in SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PeriodParts")]
pub struct Period {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct PeriodParts {
    year: i32,
    month: u32,
}

impl TryFrom<PeriodParts> for Period {
    type Error = PeriodError;

    fn try_from(parts: PeriodParts) -> Result<Self, Self::Error> {
        Period::new(parts.year, parts.month)
    }
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::InvalidMonth(month));
        }
        if !(1..=9999).contains(&year) {
            return Err(PeriodError::InvalidYear(year));
        }
        Ok(Self { year, month })
    }

    /// The period containing the given instant.
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("period holds a valid month")
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .expect("period end has a predecessor")
    }

    /// Inclusive start of the range.
    pub fn start(&self) -> DateTime<Utc> {
        self.first_day().and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive end of the range: the first instant of the following month.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start() && at < self.end()
    }

    /// Number of days in the month.
    pub fn days(&self) -> u32 {
        self.last_day().day()
    }

    pub fn next(&self) -> Self {
        self.offset(1)
    }

    pub fn previous(&self) -> Self {
        self.offset(-1)
    }

    /// Shift by a signed number of months.
    pub fn offset(&self, months: i32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) + months;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// The `count` periods ending at (and including) `self`, oldest first.
    /// The window never reaches back past January of year 1.
    pub fn trailing(&self, count: usize) -> Vec<Self> {
        let available = ((self.year - 1) * 12 + self.month as i32).max(0);
        let count = i32::try_from(count).unwrap_or(i32::MAX).min(available);
        (0..count)
            .rev()
            .map(|back| self.offset(-back))
            .collect()
    }

    /// Storage key, `YYYY-MM`.
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| PeriodError::Malformed(s.to_string()))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| PeriodError::Malformed(s.to_string()))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| PeriodError::Malformed(s.to_string()))?;
        Period::new(year, month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_out_of_range_months() {
        assert_eq!(Period::new(2026, 0), Err(PeriodError::InvalidMonth(0)));
        assert_eq!(Period::new(2026, 13), Err(PeriodError::InvalidMonth(13)));
    }

    #[test]
    fn range_is_half_open() {
        let period = Period::new(2026, 2).unwrap();
        assert_eq!(period.start(), Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end(), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert!(period.contains(period.start()));
        assert!(!period.contains(period.end()));
    }

    #[test]
    fn days_handles_leap_years() {
        assert_eq!(Period::new(2024, 2).unwrap().days(), 29);
        assert_eq!(Period::new(2026, 2).unwrap().days(), 28);
        assert_eq!(Period::new(2026, 12).unwrap().days(), 31);
    }

    #[test]
    fn offset_wraps_across_years() {
        let jan = Period::new(2026, 1).unwrap();
        assert_eq!(jan.previous(), Period::new(2025, 12).unwrap());
        assert_eq!(jan.offset(-13), Period::new(2024, 12).unwrap());
        assert_eq!(Period::new(2025, 12).unwrap().next(), jan);
    }

    #[test]
    fn trailing_is_oldest_first_and_ends_at_self() {
        let current = Period::new(2026, 3).unwrap();
        let window = current.trailing(6);
        assert_eq!(window.len(), 6);
        assert_eq!(window[0], Period::new(2025, 10).unwrap());
        assert_eq!(window[5], current);
    }

    #[test]
    fn trailing_stops_at_the_first_representable_month() {
        let current = Period::new(2, 2).unwrap();
        let window = current.trailing(usize::MAX);
        assert_eq!(window.len(), 14);
        assert_eq!(window[0], Period::new(1, 1).unwrap());
        assert_eq!(window[13], current);
    }

    #[test]
    fn parses_and_formats_keys() {
        let period: Period = "2026-07".parse().unwrap();
        assert_eq!(period, Period::new(2026, 7).unwrap());
        assert_eq!(period.key(), "2026-07");
        assert_eq!(period.to_string(), "2026-07");
        assert!("2026".parse::<Period>().is_err());
        assert!("2026-13".parse::<Period>().is_err());
    }

    #[test]
    fn deserialization_validates_month() {
        let ok: Period = serde_json::from_str(r#"{"year":2026,"month":4}"#).unwrap();
        assert_eq!(ok.month(), 4);
        assert!(serde_json::from_str::<Period>(r#"{"year":2026,"month":0}"#).is_err());
    }
}

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

/// Simple "YYYY-MM-DD" UTC calendar day with ordering and epoch conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Day {
    pub year: i32,
    pub month: u8, // 1..=12
    pub day: u8,   // 1..=31
}

impl Day {
    /// `None` unless the triple names a real calendar day.
    pub fn new(year: i32, month: u8, day: u8) -> Option<Self> {
        let d = Self { year, month, day };
        d.to_date().map(|_| d)
    }

    /// UTC day containing the unix timestamp `ts`. Out-of-range values clamp to the epoch.
    pub fn from_epoch(ts: i64) -> Self {
        let dt = OffsetDateTime::from_unix_timestamp(ts).unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self::from_date(dt.date())
    }

    /// Unix timestamp of midnight UTC at the start of this day.
    pub fn start_epoch(self) -> i64 {
        self.to_date()
            .map(|d| d.midnight().assume_utc().unix_timestamp())
            .unwrap_or(0)
    }

    pub fn next(self) -> Option<Self> {
        self.to_date()?.next_day().map(Self::from_date)
    }

    /// Relative partition directory, e.g. `2021/03/15`.
    pub fn partition_path(self) -> PathBuf {
        PathBuf::from(format!("{:04}", self.year))
            .join(format!("{:02}", self.month))
            .join(format!("{:02}", self.day))
    }

    fn to_date(self) -> Option<Date> {
        let month = Month::try_from(self.month).ok()?;
        Date::from_calendar_date(self.year, month, self.day).ok()
    }

    fn from_date(date: Date) -> Self {
        Self { year: date.year(), month: date.month() as u8, day: date.day() }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for Day {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fmt = format_description!("[year]-[month]-[day]");
        let date = Date::parse(s.trim(), &fmt).map_err(|e| format!("expected YYYY-MM-DD: {e}"))?;
        Ok(Self::from_date(date))
    }
}

/// Human-readable UTC rendering of a unix timestamp for log lines.
pub fn fmt_epoch(ts: i64) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| dt.format(&fmt).ok())
        .unwrap_or_else(|| ts.to_string())
}

use crate::error::{JournalError, JournalResult};
use chrono::{Datelike, Local, NaiveDate};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Source of "today". Fixed clocks make date-dependent rules reproducible.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today_date(&self) -> NaiveDate {
        match self {
            Clock::System => Local::now().date_naive(),
            Clock::Fixed(d) => *d,
        }
    }

    pub fn today(&self) -> String {
        format_date(self.today_date())
    }
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Parses an ISO date, dropping any time-of-day or zone suffix first
/// (`2025-02-01T23:30:00+07:00`, `2025-02-01Z` and `2025-02-01+07:00` are
/// all 2025-02-01).
pub fn parse_date(raw: &str) -> JournalResult<NaiveDate> {
    let t = raw.trim();
    let head = t.get(..10).unwrap_or(t);
    let rest = t.get(10..).unwrap_or("");
    if !rest.is_empty() && !rest.starts_with(['T', 't', ' ', 'Z', 'z', '+', '-']) {
        return Err(JournalError::bad_params(format!(
            "invalid date {raw:?}, expected YYYY-MM-DD"
        )));
    }
    NaiveDate::parse_from_str(head, DATE_FORMAT).map_err(|_| {
        JournalError::bad_params(format!("invalid date {raw:?}, expected YYYY-MM-DD"))
    })
}

/// Canonical `YYYY-MM-DD` form of a date string.
pub fn normalize_date(raw: &str) -> JournalResult<String> {
    parse_date(raw).map(format_date)
}

/// Every calendar day from `start` to `end`, both inclusive, ascending.
pub fn days_between(start: &str, end: &str) -> JournalResult<Vec<String>> {
    let s = parse_date(start)?;
    let e = parse_date(end)?;
    if s > e {
        return Err(JournalError::InvalidRange {
            start: format_date(s),
            end: format_date(e),
        });
    }
    Ok(s.iter_days()
        .take_while(|d| *d <= e)
        .map(format_date)
        .collect())
}

/// Parses `YYYY-MM` into the first and last day of that month.
pub fn month_bounds(month: &str) -> JournalResult<(NaiveDate, NaiveDate)> {
    let bad = || JournalError::bad_params("month must be YYYY-MM");
    let (y, m) = month.trim().split_once('-').ok_or_else(bad)?;
    let year = y.parse::<i32>().map_err(|_| bad())?;
    let month_num = m.parse::<u32>().map_err(|_| bad())?;
    let first = NaiveDate::from_ymd_opt(year, month_num, 1).ok_or_else(bad)?;
    let next = if month_num == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month_num + 1, 1)
    }
    .ok_or_else(bad)?;
    let last = next.pred_opt().ok_or_else(bad)?;
    Ok((first, last))
}

pub fn month_key(d: NaiveDate) -> String {
    format!("{:04}-{:02}", d.year(), d.month())
}

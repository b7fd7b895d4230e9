use crate::dates;
use crate::error::JournalResult;
use crate::events;
use crate::store::{self, JournalEntry, Profile};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Rendered value for an average with nothing to average.
pub const NO_AVERAGE: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub completed_count: usize,
    pub total_count: usize,
    pub percentage: u32,
    pub completed_dates: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DayStatus {
    Completed,
    Pending,
    Future,
    OutOfScope,
}

/// `round(100 * part / whole)`, and 0 when there is nothing to divide by.
pub fn rate(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (100.0 * part as f64 / whole as f64).round() as u32
}

pub fn progress_from_dates<'a, I>(journal_dates: I, event_days: &[String]) -> Progress
where
    I: IntoIterator<Item = &'a str>,
{
    let in_scope: HashSet<&str> = event_days.iter().map(String::as_str).collect();
    let completed_dates: BTreeSet<String> = journal_dates
        .into_iter()
        .filter(|d| in_scope.contains(d))
        .map(str::to_string)
        .collect();
    let completed_count = completed_dates.len();
    let total_count = in_scope.len();
    Progress {
        completed_count,
        total_count,
        percentage: rate(completed_count, total_count),
        completed_dates,
    }
}

pub fn compute_progress(
    conn: &Connection,
    student_id: &str,
    event_days: &[String],
) -> JournalResult<Progress> {
    let dates = store::journal_dates_for_student(conn, student_id)?;
    Ok(progress_from_dates(
        dates.iter().map(String::as_str),
        event_days,
    ))
}

pub fn classify_day(
    day: &str,
    event_days: &HashSet<&str>,
    completed: &BTreeSet<String>,
    today: &str,
) -> DayStatus {
    if !event_days.contains(day) {
        DayStatus::OutOfScope
    } else if completed.contains(day) {
        DayStatus::Completed
    } else if day <= today {
        DayStatus::Pending
    } else {
        DayStatus::Future
    }
}

/// Pooled rate over several students: summed numerators over summed
/// denominators, never an average of percentages.
pub fn pooled_rate<'a, I>(items: I) -> (usize, usize, u32)
where
    I: IntoIterator<Item = &'a Progress>,
{
    let (done, total) = items
        .into_iter()
        .fold((0usize, 0usize), |(d, t), p| (d + p.completed_count, t + p.total_count));
    (done, total, rate(done, total))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloAverages {
    pub entry_count: usize,
    pub averages: [Option<f64>; 4],
    pub display: [String; 4],
}

pub fn clo_averages(entries: &[JournalEntry]) -> CloAverages {
    let count = entries.len();
    let mut sums = [0i64; 4];
    for e in entries {
        for (sum, v) in sums.iter_mut().zip(e.clos()) {
            *sum += v;
        }
    }
    let averages = sums.map(|s| {
        if count == 0 {
            None
        } else {
            Some(s as f64 / count as f64)
        }
    });
    let display = averages.map(|a| match a {
        Some(v) => format!("{:.1}", (v * 10.0).round() / 10.0),
        None => NO_AVERAGE.to_string(),
    });
    CloAverages {
        entry_count: count,
        averages,
        display,
    }
}

/// A student paired with the days of the event that scopes them.
#[derive(Debug, Clone)]
pub struct ScopedStudent {
    pub student: Profile,
    pub days: Vec<String>,
}

/// Resolves each student's own event: the assigned one when it still exists,
/// else the event current on `today`.
pub fn scope_students(
    conn: &Connection,
    students: Vec<Profile>,
    today: &str,
) -> JournalResult<Vec<ScopedStudent>> {
    students
        .into_iter()
        .map(|student| {
            let days = match events::resolve_event_for_student(conn, &student, today)? {
                Some(ev) => events::event_days(&ev)?,
                None => Vec::new(),
            };
            Ok(ScopedStudent { student, days })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub date: String,
    pub completed: usize,
    pub pending: usize,
    pub rate: u32,
}

/// Per-day submission counts. On each day the cohort is the students whose
/// own event covers that day.
pub fn daily_stats(
    conn: &Connection,
    students: &[ScopedStudent],
    days: &[String],
) -> JournalResult<Vec<DailyStat>> {
    let mut out = Vec::with_capacity(days.len());
    for day in days {
        let cohort: HashSet<&str> = students
            .iter()
            .filter(|s| s.days.iter().any(|d| d == day))
            .map(|s| s.student.id.as_str())
            .collect();
        let total = cohort.len();
        let completed = store::journal_authors_on(conn, day)?
            .iter()
            .filter(|sid| cohort.contains(sid.as_str()))
            .count();
        out.push(DailyStat {
            date: day.clone(),
            completed,
            pending: total.saturating_sub(completed),
            rate: rate(completed, total),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub student: Profile,
    pub progress: Progress,
}

pub fn progress_for_students(
    conn: &Connection,
    students: Vec<ScopedStudent>,
) -> JournalResult<Vec<StudentProgress>> {
    students
        .into_iter()
        .map(|s| {
            let progress = compute_progress(conn, &s.student.id, &s.days)?;
            Ok(StudentProgress {
                student: s.student,
                progress,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: String,
    pub status: DayStatus,
    pub is_today: bool,
    pub is_selected: bool,
}

/// Every day of `month` (`YYYY-MM`) classified for one student.
pub fn calendar_month(
    month: &str,
    event_days: &[String],
    completed: &BTreeSet<String>,
    today: &str,
    selected: Option<&str>,
) -> JournalResult<Vec<CalendarDay>> {
    let (first, last) = dates::month_bounds(month)?;
    let scope: HashSet<&str> = event_days.iter().map(String::as_str).collect();
    Ok(first
        .iter_days()
        .take_while(|d| *d <= last)
        .map(|d| {
            let date = dates::format_date(d);
            CalendarDay {
                status: classify_day(&date, &scope, completed, today),
                is_today: date == today,
                is_selected: selected == Some(date.as_str()),
                date,
            }
        })
        .collect())
}

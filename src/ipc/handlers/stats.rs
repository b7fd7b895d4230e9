use crate::error::JournalResult;
use crate::events;
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Request};
use crate::progress;
use crate::store::{self, Event, Role};
use rusqlite::Connection;
use serde_json::json;

fn active_event(conn: &Connection, today: &str) -> JournalResult<(Option<Event>, Vec<String>)> {
    let event = events::resolve_current_event(conn, today)?;
    let days = match event.as_ref() {
        Some(ev) => events::event_days(ev)?,
        None => Vec::new(),
    };
    Ok((event, days))
}

fn overview(state: &mut AppState) -> JournalResult<serde_json::Value> {
    state.require_role(&[Role::Admin])?;
    let conn = state.conn()?;
    let today = state.today();
    let (event, days) = active_event(conn, &today)?;
    let students = progress::scope_students(conn, store::list_profiles(conn, Role::Student)?, &today)?;
    let student_count = students.len();

    // No snapshot when today falls outside the active event.
    let today_stat = if days.contains(&today) {
        progress::daily_stats(conn, &students, std::slice::from_ref(&today))?
            .into_iter()
            .next()
    } else {
        None
    };
    let cohort = progress::progress_for_students(conn, students)?;
    let (completed, total, rate) = progress::pooled_rate(cohort.iter().map(|s| &s.progress));

    Ok(json!({
        "event": event,
        "counts": {
            "students": student_count,
            "teachers": store::count_profiles(conn, Role::Teacher)?,
            "groups": store::list_groups(conn)?.len(),
            "events": store::list_events(conn)?.len(),
        },
        "overall": { "completed": completed, "total": total, "rate": rate },
        "today": today_stat,
    }))
}

fn daily(state: &mut AppState) -> JournalResult<serde_json::Value> {
    state.require_role(&[Role::Admin])?;
    let conn = state.conn()?;
    let today = state.today();
    let (event, days) = active_event(conn, &today)?;
    let students = progress::scope_students(conn, store::list_profiles(conn, Role::Student)?, &today)?;
    Ok(json!({
        "event": event,
        "days": progress::daily_stats(conn, &students, &days)?,
    }))
}

fn group_rows(conn: &Connection, today: &str) -> JournalResult<Vec<serde_json::Value>> {
    let mut rows = Vec::new();
    for g in store::list_groups(conn)? {
        let members = progress::scope_students(conn, store::students_in_group(conn, &g.id)?, today)?;
        let count = members.len();
        let cohort = progress::progress_for_students(conn, members)?;
        let (completed, total, rate) = progress::pooled_rate(cohort.iter().map(|s| &s.progress));
        rows.push(json!({
            "group": g,
            "studentCount": count,
            "completed": completed,
            "total": total,
            "rate": rate,
        }));
    }
    Ok(rows)
}

fn groups(state: &mut AppState) -> JournalResult<serde_json::Value> {
    state.require_role(&[Role::Admin])?;
    let conn = state.conn()?;
    let today = state.today();
    let (event, _) = active_event(conn, &today)?;
    Ok(json!({ "event": event, "groups": group_rows(conn, &today)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "stats.overview" => overview(state),
        "stats.daily" => daily(state),
        "stats.groups" => groups(state),
        _ => return None,
    };
    Some(result.response(&req.id))
}

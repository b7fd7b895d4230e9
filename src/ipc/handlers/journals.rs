use crate::dates;
use crate::error::JournalResult;
use crate::events;
use crate::ipc::error::IntoResponse;
use crate::ipc::handlers::settings::load_clo_definitions;
use crate::ipc::types::{AppState, Params, Request};
use crate::journal::{self, JournalPayload};
use crate::progress::{self, DayStatus};
use crate::store::{self, Event, Profile, Role};
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Signed-in student with the event currently scoping them.
struct StudentScope {
    student: Profile,
    event: Option<Event>,
    days: Vec<String>,
    today: String,
}

fn student_scope(state: &mut AppState) -> JournalResult<StudentScope> {
    let today = state.today();
    let conn = state.conn()?;
    let student = state.require_role(&[Role::Student])?.account.clone();
    let event = events::resolve_event_for_student(conn, &student, &today)?;
    let days = match event.as_ref() {
        Some(ev) => events::event_days(ev)?,
        None => Vec::new(),
    };
    if let Some(s) = state.session.as_mut() {
        s.current_event = event.clone();
    }
    Ok(StudentScope {
        student,
        event,
        days,
        today,
    })
}

fn remember_date(state: &mut AppState, date: &str) {
    if let Some(s) = state.session.as_mut() {
        s.selected_date = Some(date.to_string());
    }
}

fn journals_save(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let scope = student_scope(state)?;
    let p = Params(&req.params);
    let date = dates::normalize_date(p.str("date")?)?;
    let payload = JournalPayload::from_params(&req.params)?;
    let conn = state.conn()?;
    let entry = journal::save_journal(conn, &scope.student.id, &date, payload, scope.event.as_ref())?;
    let progress = progress::compute_progress(conn, &scope.student.id, &scope.days)?;
    remember_date(state, &date);
    Ok(json!({ "entry": entry, "progress": progress }))
}

fn journals_get(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let scope = student_scope(state)?;
    let date = dates::normalize_date(Params(&req.params).str("date")?)?;
    let conn = state.conn()?;
    let entry = store::find_journal(conn, &scope.student.id, &date)?;
    let note = store::find_teacher_note(conn, &scope.student.id, &date)?.filter(|n| n.visible_to_student);
    let in_event = scope.days.iter().any(|d| *d == date);
    remember_date(state, &date);
    Ok(json!({
        "date": date,
        "inEvent": in_event,
        "entry": entry,
        "teacherNote": note,
    }))
}

fn journals_history(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let scope = student_scope(state)?;
    let conn = state.conn()?;
    let mut notes: HashMap<String, _> = store::teacher_notes_for_student(conn, &scope.student.id)?
        .into_iter()
        .filter(|n| n.visible_to_student)
        .map(|n| (n.date.clone(), n))
        .collect();
    let entries: Vec<serde_json::Value> = store::journals_for_student(conn, &scope.student.id, true)?
        .into_iter()
        .map(|e| {
            let mut v = json!(e);
            v["teacherNote"] = json!(notes.remove(&e.date));
            v
        })
        .collect();
    Ok(json!({ "entries": entries }))
}

fn journals_calendar(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let scope = student_scope(state)?;
    let selected = state.session.as_ref().and_then(|s| s.selected_date.clone());
    let month = match Params(&req.params).opt_str("month") {
        Some(m) => m.to_string(),
        None => {
            let anchor = selected.as_deref().unwrap_or(scope.today.as_str());
            dates::month_key(dates::parse_date(anchor)?)
        }
    };
    let conn = state.conn()?;
    let progress = progress::compute_progress(conn, &scope.student.id, &scope.days)?;
    let days = progress::calendar_month(
        &month,
        &scope.days,
        &progress.completed_dates,
        &scope.today,
        selected.as_deref(),
    )?;
    Ok(json!({
        "month": month,
        "event": scope.event,
        "days": days,
        "progress": progress,
    }))
}

fn journals_progress(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let scope = student_scope(state)?;
    let conn = state.conn()?;
    let progress = progress::compute_progress(conn, &scope.student.id, &scope.days)?;
    let in_scope: HashSet<&str> = scope.days.iter().map(String::as_str).collect();
    let today_status = progress::classify_day(&scope.today, &in_scope, &progress.completed_dates, &scope.today);
    Ok(json!({
        "event": scope.event,
        "today": scope.today,
        "todayStatus": today_status,
        "todayDone": today_status == DayStatus::Completed,
        "progress": progress,
    }))
}

/// Recap that opens once every day of the event has an entry.
fn journals_journey(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let scope = student_scope(state)?;
    let conn = state.conn()?;
    let progress = progress::compute_progress(conn, &scope.student.id, &scope.days)?;
    let unlocked = progress.total_count > 0 && progress.completed_count >= progress.total_count;
    if !unlocked {
        return Ok(json!({ "unlocked": false, "progress": progress }));
    }
    let journals = store::journals_for_student(conn, &scope.student.id, false)?;
    let averages = progress::clo_averages(&journals);
    let notes = store::community_notes_for_student(conn, &scope.student.id)?;
    Ok(json!({
        "unlocked": true,
        "progress": progress,
        "event": scope.event,
        "cloDefinitions": load_clo_definitions(conn)?,
        "cloAverages": averages,
        "journals": journals,
        "communityNotes": notes,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "journals.save" => journals_save(state, req),
        "journals.get" => journals_get(state, req),
        "journals.history" => journals_history(state, req),
        "journals.calendar" => journals_calendar(state, req),
        "journals.progress" => journals_progress(state, req),
        "journals.journey" => journals_journey(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

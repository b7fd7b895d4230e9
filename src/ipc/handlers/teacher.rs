use crate::dates;
use crate::error::{JournalError, JournalResult};
use crate::events;
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::journal;
use crate::progress;
use crate::store::{self, Profile, Role};
use rusqlite::Connection;
use serde_json::json;

/// Student in one of the teacher's groups, or `Forbidden`.
fn owned_student(conn: &Connection, teacher_id: &str, student_id: &str) -> JournalResult<Profile> {
    let student = store::get_profile(conn, Role::Student, student_id)?
        .ok_or(JournalError::not_found("student"))?;
    let owns = match student.group_id.as_deref() {
        Some(gid) => store::get_group(conn, gid)?
            .is_some_and(|g| g.teacher_id.as_deref() == Some(teacher_id)),
        None => false,
    };
    if !owns {
        tracing::warn!(teacher_id, student_id, "student outside teacher groups");
        return Err(JournalError::Forbidden);
    }
    Ok(student)
}

fn overview(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let today = state.today();
    let conn = state.conn()?;
    let teacher_id = state.require_role(&[Role::Teacher])?.account_id();

    let mut groups = Vec::new();
    let (mut student_total, mut fully_completed) = (0usize, 0usize);
    for g in store::groups_for_teacher(conn, teacher_id)? {
        let members = progress::scope_students(conn, store::students_in_group(conn, &g.id)?, &today)?;
        let students = progress::progress_for_students(conn, members)?;
        student_total += students.len();
        fully_completed += students
            .iter()
            .filter(|s| s.progress.total_count > 0 && s.progress.completed_count >= s.progress.total_count)
            .count();
        let (completed, total, rate) = progress::pooled_rate(students.iter().map(|s| &s.progress));
        groups.push(json!({
            "group": g,
            "students": students,
            "completed": completed,
            "total": total,
            "rate": rate,
        }));
    }
    Ok(json!({
        "event": events::resolve_current_event(conn, &today)?,
        "groups": groups,
        "studentCount": student_total,
        "fullyCompleted": fully_completed,
    }))
}

fn student_detail(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let today = state.today();
    let conn = state.conn()?;
    let teacher_id = state.require_role(&[Role::Teacher])?.account_id();
    let student = owned_student(conn, teacher_id, Params(&req.params).str("studentId")?)?;

    let event = events::resolve_event_for_student(conn, &student, &today)?;
    let journals = store::journals_for_student(conn, &student.id, true)?;
    let averages = progress::clo_averages(&journals);
    let notes = store::teacher_notes_for_student(conn, &student.id)?;
    let days = match event.as_ref() {
        Some(ev) => events::event_days(ev)?,
        None => Vec::new(),
    };
    Ok(json!({
        "progress": progress::compute_progress(conn, &student.id, &days)?,
        "entryCount": store::count_journals(conn, &student.id)?,
        "student": student,
        "event": event,
        "cloAverages": averages,
        "journals": journals,
        "teacherNotes": notes,
    }))
}

fn notes_save(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let today = state.today();
    let conn = state.conn()?;
    let teacher_id = state.require_role(&[Role::Teacher])?.account_id();
    let p = Params(&req.params);
    let student = owned_student(conn, teacher_id, p.str("studentId")?)?;
    let event = events::resolve_event_for_student(conn, &student, &today)?;
    let note = journal::save_teacher_note(
        conn,
        teacher_id,
        &student.id,
        p.str("date")?,
        p.str("content")?.trim(),
        p.opt_bool("visibleToStudent").unwrap_or(false),
        event.as_ref(),
    )?;
    Ok(json!({ "note": note }))
}

fn notes_get(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    let teacher_id = state.require_role(&[Role::Teacher])?.account_id();
    let p = Params(&req.params);
    let student = owned_student(conn, teacher_id, p.str("studentId")?)?;
    let date = dates::normalize_date(p.str("date")?)?;
    Ok(json!({ "note": store::find_teacher_note(conn, &student.id, &date)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teacher.overview" => overview(state, req),
        "teacher.studentDetail" => student_detail(state, req),
        "teacherNotes.save" => notes_save(state, req),
        "teacherNotes.get" => notes_get(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

use crate::error::{JournalError, JournalResult};
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::store::{self, Group, Role};
use rusqlite::Connection;
use serde_json::json;

fn ensure_teacher(conn: &Connection, teacher_id: Option<&str>) -> JournalResult<()> {
    if let Some(id) = teacher_id {
        store::get_profile(conn, Role::Teacher, id)?.ok_or(JournalError::not_found("teacher"))?;
    }
    Ok(())
}

fn groups_create(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let p = Params(&req.params);
    let teacher_id = p.opt_str("teacherId").filter(|s| !s.is_empty());
    ensure_teacher(conn, teacher_id)?;
    let group = Group {
        id: store::new_id(),
        name: p.text("name")?.to_string(),
        teacher_id: teacher_id.map(str::to_string),
    };
    store::insert_group(conn, &group)?;
    Ok(json!({ "group": group }))
}

fn groups_list(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin, Role::Teacher])?;
    let mut out = Vec::new();
    for g in store::list_groups(conn)? {
        let teacher_name = match g.teacher_id.as_deref() {
            Some(id) => store::get_profile(conn, Role::Teacher, id)?.map(|t| t.name),
            None => None,
        };
        let student_count = store::students_in_group(conn, &g.id)?.len();
        let mut v = json!(g);
        v["teacherName"] = json!(teacher_name);
        v["studentCount"] = json!(student_count);
        out.push(v);
    }
    Ok(json!({ "groups": out }))
}

fn groups_update(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let p = Params(&req.params);
    let existing = store::get_group(conn, p.str("id")?)?.ok_or(JournalError::not_found("group"))?;
    let name = match p.opt_str("name") {
        Some(_) => p.text("name")?.to_string(),
        None => existing.name.clone(),
    };
    let teacher_id = match p.nullable_str("teacherId")? {
        None => existing.teacher_id.clone(),
        Some(v) => v.filter(|s| !s.is_empty()).map(str::to_string),
    };
    ensure_teacher(conn, teacher_id.as_deref())?;
    let group = Group {
        name,
        teacher_id,
        ..existing
    };
    store::update_group(conn, &group)?;
    Ok(json!({ "group": group }))
}

/// Members of a deleted group stay enrolled, without a group.
fn groups_delete(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let id = Params(&req.params).str("id")?;
    store::get_group(conn, id)?.ok_or(JournalError::not_found("group"))?;

    let tx = conn.unchecked_transaction()?;
    let members = store::students_in_group(&tx, id)?;
    for s in &members {
        store::update_student_assignment(&tx, &s.id, None, s.event_id.as_deref())?;
    }
    store::delete_group(&tx, id)?;
    tx.commit()?;
    tracing::info!(group_id = id, released = members.len(), "group deleted");
    Ok(json!({ "deleted": true, "releasedStudents": members.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.create" => groups_create(state, req),
        "groups.list" => groups_list(state, req),
        "groups.update" => groups_update(state, req),
        "groups.delete" => groups_delete(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

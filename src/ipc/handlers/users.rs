use crate::error::{JournalError, JournalResult};
use crate::identity;
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::store::{self, Profile, Role};
use rusqlite::Connection;
use serde_json::json;
use std::collections::{HashMap, HashSet};

fn ensure_group(conn: &Connection, id: &str) -> JournalResult<()> {
    store::get_group(conn, id)?
        .map(|_| ())
        .ok_or(JournalError::not_found("group"))
}

fn ensure_event(conn: &Connection, id: &str) -> JournalResult<()> {
    store::get_event(conn, id)?
        .map(|_| ())
        .ok_or(JournalError::not_found("event"))
}

fn find_user(conn: &Connection, id: &str) -> JournalResult<Profile> {
    identity::resolve_role(conn, id).map_err(|e| match e {
        JournalError::NoRole => JournalError::not_found("user"),
        other => other,
    })
}

fn users_create(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let p = Params(&req.params);
    let email = p.text("email")?;
    let name = p.text("name")?;
    let role = match Role::parse(p.str("role")?) {
        Some(r @ (Role::Teacher | Role::Student)) => r,
        _ => return Err(JournalError::bad_params("role must be teacher or student")),
    };

    let mut profile = Profile {
        needs_password_setup: true,
        ..Profile::draft(role, name)
    };
    if role == Role::Student {
        if let Some(group_id) = p.opt_str("groupId").filter(|s| !s.is_empty()) {
            ensure_group(conn, group_id)?;
            profile.group_id = Some(group_id.to_string());
        }
        if let Some(event_id) = p.opt_str("eventId").filter(|s| !s.is_empty()) {
            ensure_event(conn, event_id)?;
            profile.event_id = Some(event_id.to_string());
        }
    }

    let (password, generated) = match p.opt_str("password") {
        Some(pw) => (pw.to_string(), false),
        None => (identity::temporary_password(), true),
    };
    let user = identity::create_user(conn, email, &password, profile)?;
    tracing::info!(user_id = %user.id, role = role.as_str(), "user created");
    Ok(json!({
        "user": user,
        "temporaryPassword": generated.then_some(password),
    }))
}

fn users_list(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;

    let groups = store::list_groups(conn)?;
    let group_names: HashMap<&str, &str> = groups
        .iter()
        .map(|g| (g.id.as_str(), g.name.as_str()))
        .collect();
    let events = store::list_events(conn)?;
    let event_names: HashMap<&str, &str> = events
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .collect();

    let teachers: Vec<serde_json::Value> = store::list_profiles(conn, Role::Teacher)?
        .into_iter()
        .map(|t| {
            let owned: Vec<serde_json::Value> = groups
                .iter()
                .filter(|g| g.teacher_id.as_deref() == Some(t.id.as_str()))
                .map(|g| json!({ "id": g.id, "name": g.name }))
                .collect();
            let mut v = json!(t);
            v["groups"] = json!(owned);
            v
        })
        .collect();

    let students: Vec<serde_json::Value> = store::list_profiles(conn, Role::Student)?
        .into_iter()
        .map(|s| {
            let mut v = json!(s);
            v["groupName"] = json!(s.group_id.as_deref().and_then(|id| group_names.get(id)));
            v["eventName"] = json!(s.event_id.as_deref().and_then(|id| event_names.get(id)));
            v
        })
        .collect();

    Ok(json!({ "teachers": teachers, "students": students }))
}

fn users_update(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let p = Params(&req.params);
    let user = find_user(conn, p.str("id")?)?;

    let tx = conn.unchecked_transaction()?;
    if p.opt_str("name").is_some() {
        store::update_profile_name(&tx, user.role, &user.id, p.text("name")?)?;
    }
    if user.role == Role::Student {
        let group_id = match p.nullable_str("groupId")? {
            None => user.group_id.clone(),
            Some(v) => v.filter(|s| !s.is_empty()).map(str::to_string),
        };
        let event_id = match p.nullable_str("eventId")? {
            None => user.event_id.clone(),
            Some(v) => v.filter(|s| !s.is_empty()).map(str::to_string),
        };
        if let Some(g) = group_id.as_deref() {
            ensure_group(&tx, g)?;
        }
        if let Some(e) = event_id.as_deref() {
            ensure_event(&tx, e)?;
        }
        store::update_student_assignment(&tx, &user.id, group_id.as_deref(), event_id.as_deref())?;
    }
    tx.commit()?;

    let updated = store::get_profile(conn, user.role, &user.id)?.ok_or(JournalError::not_found("user"))?;
    Ok(json!({ "user": updated }))
}

fn users_delete(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    let session = state.require_role(&[Role::Admin])?;
    let id = Params(&req.params).str("id")?;
    if id == session.account_id() {
        return Err(JournalError::Conflict("you cannot delete your own account".into()));
    }
    let user = find_user(conn, id)?;

    let tx = conn.unchecked_transaction()?;
    if user.role == Role::Teacher {
        for g in store::groups_for_teacher(&tx, &user.id)? {
            store::set_group_teacher(&tx, &g.id, None)?;
        }
    }
    store::delete_profile(&tx, user.role, &user.id)?;
    identity::delete_account(&tx, &user.id)?;
    tx.commit()?;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user deleted");
    Ok(json!({ "deleted": true }))
}

/// Selected groups move to the teacher; the teacher's other groups are released.
fn teachers_assign_groups(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let p = Params(&req.params);
    let teacher_id = p.str("teacherId")?;
    store::get_profile(conn, Role::Teacher, teacher_id)?.ok_or(JournalError::not_found("teacher"))?;
    let selected: HashSet<&str> = p.str_list("groupIds")?.into_iter().collect();
    for g in &selected {
        ensure_group(conn, g)?;
    }

    let tx = conn.unchecked_transaction()?;
    for g in store::groups_for_teacher(&tx, teacher_id)? {
        if !selected.contains(g.id.as_str()) {
            store::set_group_teacher(&tx, &g.id, None)?;
        }
    }
    for g in &selected {
        store::set_group_teacher(&tx, g, Some(teacher_id))?;
    }
    tx.commit()?;

    let groups = store::groups_for_teacher(conn, teacher_id)?;
    tracing::info!(teacher_id, count = groups.len(), "teacher groups reassigned");
    Ok(json!({ "teacherId": teacher_id, "groups": groups }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => users_create(state, req),
        "users.list" => users_list(state, req),
        "users.update" => users_update(state, req),
        "users.delete" => users_delete(state, req),
        "teachers.assignGroups" => teachers_assign_groups(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

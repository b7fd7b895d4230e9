use crate::error::{JournalError, JournalResult};
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::journal;
use crate::store::{self, FileRef, Role};
use serde_json::json;

fn notes_add(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    let student_id = state.require_role(&[Role::Student])?.account_id();
    let p = Params(&req.params);
    let files = match req.params.get("files") {
        Some(v) if !v.is_null() => serde_json::from_value::<Vec<FileRef>>(v.clone())
            .map_err(|e| JournalError::bad_params(format!("invalid files: {e}")))?,
        _ => Vec::new(),
    };
    let note = journal::add_community_note(
        conn,
        student_id,
        p.opt_str("title").unwrap_or(""),
        p.opt_str("content").unwrap_or(""),
        files,
    )?;
    Ok(json!({ "note": note }))
}

fn notes_list(state: &mut AppState) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    let student_id = state.require_role(&[Role::Student])?.account_id();
    Ok(json!({ "notes": store::community_notes_for_student(conn, student_id)? }))
}

fn notes_delete(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    let student_id = state.require_role(&[Role::Student])?.account_id();
    journal::delete_community_note(conn, student_id, Params(&req.params).str("id")?)?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "communityNotes.add" => notes_add(state, req),
        "communityNotes.list" => notes_list(state),
        "communityNotes.delete" => notes_delete(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

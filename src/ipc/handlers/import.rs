use crate::error::{JournalError, JournalResult};
use crate::import::{self, ImportReport};
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::store::Role;
use rusqlite::Connection;
use serde_json::json;

const PREVIEW_ROWS: usize = 5;

/// CSV body from `csv` text or a file at `csvPath`.
fn csv_source(params: &serde_json::Value) -> JournalResult<String> {
    let p = Params(params);
    if let Some(text) = p.opt_str("csv") {
        return Ok(text.to_string());
    }
    let path = p
        .opt_str("csvPath")
        .ok_or_else(|| JournalError::bad_params("missing csv or csvPath"))?;
    std::fs::read_to_string(path)
        .map_err(|e| JournalError::bad_params(format!("cannot read {path}: {e}")))
}

fn run(
    state: &mut AppState,
    req: &Request,
    import_fn: fn(&Connection, &str) -> ImportReport,
) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let text = csv_source(&req.params)?;
    Ok(json!(import_fn(conn, &text)))
}

fn template(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    state.require_role(&[Role::Admin])?;
    let kind = Params(&req.params).str("kind")?;
    Ok(json!({ "kind": kind, "csv": import::template(kind)? }))
}

fn preview(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    state.require_role(&[Role::Admin])?;
    let text = csv_source(&req.params)?;
    Ok(json!(import::preview(&text, PREVIEW_ROWS)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "import.users" => run(state, req, import::import_users),
        "import.events" => run(state, req, import::import_events),
        "import.template" => template(state, req),
        "import.preview" => preview(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

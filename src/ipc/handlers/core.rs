use crate::db;
use crate::error::{JournalError, JournalResult};
use crate::ipc::error::{err, ok, IntoResponse};
use crate::ipc::types::{AppState, Params, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let account = state.session.as_ref().map(|s| {
        json!({
            "id": s.account_id(),
            "email": s.account.email,
            "role": s.role(),
        })
    });
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "today": state.today(),
            "account": account,
        }),
    )
}

/// Opens (creating if needed) the workspace and drops any previous session.
pub fn open_workspace(state: &mut AppState, path: &Path) -> JournalResult<()> {
    let conn = db::open_db(path).map_err(|e| JournalError::StoreUnavailable(format!("{e:#}")))?;
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.session = None;
    tracing::info!(path = %path.to_string_lossy(), "workspace opened");
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = Params(&req.params).opt_str("path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    open_workspace(state, &path)
        .map(|_| json!({ "workspacePath": path.to_string_lossy() }))
        .response(&req.id)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}

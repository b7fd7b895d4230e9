use crate::blobs;
use crate::dates;
use crate::error::{JournalError, JournalResult};
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::store::{FileRef, Role};
use chrono::Utc;
use serde_json::json;
use std::path::Path;

/// Copies a local file into the workspace blob store for the signed-in student.
fn upload(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let workspace = state.workspace.as_deref().ok_or(JournalError::NoWorkspace)?;
    let student_id = state.require_role(&[Role::Student])?.account_id();
    let p = Params(&req.params);
    let source = Path::new(p.str("sourcePath")?);
    if !source.is_file() {
        return Err(JournalError::bad_params(format!(
            "file not found: {}",
            source.to_string_lossy()
        )));
    }
    let name = match p.opt_str("name").map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => n.to_string(),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| JournalError::bad_params("sourcePath has no file name"))?,
    };
    let blob_path = match p.str("kind")? {
        "journal" => {
            let date = dates::normalize_date(p.str("date")?)?;
            blobs::journal_blob_path(student_id, &date, &name)
        }
        "community" => blobs::community_blob_path(student_id, Utc::now().timestamp_millis(), &name),
        other => {
            return Err(JournalError::bad_params(format!(
                "kind must be journal or community, got {other:?}"
            )))
        }
    };
    let url = blobs::upload(workspace, &blob_path, source)
        .map_err(|e| JournalError::StoreUnavailable(format!("{e:#}")))?;
    tracing::info!(student_id, path = %blob_path, "file uploaded");
    let file = FileRef {
        mime_type: blobs::mime_type_for(&name).to_string(),
        name,
        url,
    };
    Ok(json!({ "file": file }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "files.upload" => upload(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

use crate::db;
use crate::error::{JournalError, JournalResult};
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Request};
use crate::journal::CLO_FIELDS;
use crate::store::Role;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

const CLO_SETTINGS_KEY: &str = "clo.definitions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloDefinition {
    pub name: String,
    pub short_name: String,
    pub description: String,
}

fn clo(name: &str, short_name: &str, description: &str) -> CloDefinition {
    CloDefinition {
        name: name.to_string(),
        short_name: short_name.to_string(),
        description: description.to_string(),
    }
}

fn default_clo_definitions() -> Vec<CloDefinition> {
    vec![
        clo(
            "Understanding and creatively solving community problems",
            "Community problems",
            "Understands and analyses the problems of a community in depth.",
        ),
        clo(
            "Co-creating and prototyping innovations",
            "Innovation",
            "Co-creates with the community to prototype sustainable, adaptable solutions.",
        ),
        clo(
            "Communicating and collaborating effectively",
            "Collaboration",
            "Communicates and works with diverse teams.",
        ),
        clo(
            "Personal growth and social responsibility",
            "Social responsibility",
            "Manages oneself, acts responsibly toward society and adapts to change.",
        ),
    ]
}

/// Stored definitions, or the built-in set when none are stored or they are unreadable.
pub fn load_clo_definitions(conn: &Connection) -> JournalResult<Vec<CloDefinition>> {
    let stored = db::settings_get_json(conn, CLO_SETTINGS_KEY)?
        .and_then(|v| serde_json::from_value::<Vec<CloDefinition>>(v).ok())
        .filter(|defs| defs.len() == CLO_FIELDS.len());
    Ok(stored.unwrap_or_else(default_clo_definitions))
}

fn clo_get(state: &mut AppState) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    Ok(json!({ "definitions": load_clo_definitions(conn)? }))
}

fn clo_set(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let raw = req
        .params
        .get("definitions")
        .cloned()
        .ok_or_else(|| JournalError::bad_params("missing definitions"))?;
    let defs: Vec<CloDefinition> = serde_json::from_value(raw).map_err(|e| {
        JournalError::bad_params(format!("definitions must be {{name, shortName, description}} objects: {e}"))
    })?;
    if defs.len() != CLO_FIELDS.len() {
        return Err(JournalError::bad_params(format!(
            "exactly {} definitions are required",
            CLO_FIELDS.len()
        )));
    }
    if defs.iter().any(|d| d.name.trim().is_empty() || d.short_name.trim().is_empty()) {
        return Err(JournalError::bad_params("name and shortName must not be empty"));
    }
    db::settings_set_json(conn, CLO_SETTINGS_KEY, &json!(defs))?;
    Ok(json!({ "definitions": defs }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.clo.get" => clo_get(state),
        "settings.clo.set" => clo_set(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

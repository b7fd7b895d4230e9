use crate::error::{JournalError, JournalResult};
use crate::events;
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::store::{self, Event, Role};
use serde_json::json;

fn events_create(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let p = Params(&req.params);
    let (start_date, end_date) = events::normalize_range(p.str("startDate")?, p.str("endDate")?)?;
    let event = Event {
        id: store::new_id(),
        name: p.text("name")?.to_string(),
        start_date,
        end_date,
        description: p.opt_str("description").unwrap_or("").trim().to_string(),
    };
    store::insert_event(conn, &event)?;
    tracing::info!(event_id = %event.id, start = %event.start_date, end = %event.end_date, "event created");
    Ok(json!({ "event": event }))
}

fn events_list(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    Ok(json!({ "events": store::list_events(conn)? }))
}

fn events_update(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let p = Params(&req.params);
    let existing = store::get_event(conn, p.str("id")?)?.ok_or(JournalError::not_found("event"))?;
    let (start_date, end_date) = events::normalize_range(
        p.opt_str("startDate").unwrap_or(existing.start_date.as_str()),
        p.opt_str("endDate").unwrap_or(existing.end_date.as_str()),
    )?;
    let name = match p.opt_str("name") {
        Some(_) => p.text("name")?.to_string(),
        None => existing.name.clone(),
    };
    let description = p
        .opt_str("description")
        .map(|d| d.trim().to_string())
        .unwrap_or_else(|| existing.description.clone());
    let event = Event {
        id: existing.id,
        name,
        start_date,
        end_date,
        description,
    };
    store::update_event(conn, &event)?;
    Ok(json!({ "event": event }))
}

fn events_delete(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    state.require_role(&[Role::Admin])?;
    let id = Params(&req.params).str("id")?;
    if !store::delete_event(conn, id)? {
        return Err(JournalError::not_found("event"));
    }
    tracing::info!(event_id = id, "event deleted");
    Ok(json!({ "deleted": true }))
}

/// Event in force for the signed-in account, with its day list.
fn events_current(state: &mut AppState, _req: &Request) -> JournalResult<serde_json::Value> {
    let today = state.today();
    let conn = state.conn()?;
    let account = state.session()?.account.clone();
    let current = events::resolve_event_for(conn, &account, &today)?;
    let days = match current.as_ref() {
        Some(ev) => events::event_days(ev)?,
        None => Vec::new(),
    };
    let result = json!({ "event": current, "days": days, "today": today });
    if let Some(s) = state.session.as_mut() {
        s.current_event = current;
    }
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "events.create" => events_create(state, req),
        "events.list" => events_list(state, req),
        "events.update" => events_update(state, req),
        "events.delete" => events_delete(state, req),
        "events.current" => events_current(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}

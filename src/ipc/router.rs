use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const FAMILIES: &[Handler] = &[
    handlers::core::try_handle,
    handlers::auth::try_handle,
    handlers::users::try_handle,
    handlers::groups::try_handle,
    handlers::events::try_handle,
    handlers::journals::try_handle,
    handlers::teacher::try_handle,
    handlers::community::try_handle,
    handlers::stats::try_handle,
    handlers::import::try_handle,
    handlers::files::try_handle,
    handlers::settings::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    for family in FAMILIES {
        if let Some(resp) = family(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

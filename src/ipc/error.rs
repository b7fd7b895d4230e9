use crate::error::{JournalError, JournalResult};
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn journal_err(id: &str, e: &JournalError) -> serde_json::Value {
    if let JournalError::StoreUnavailable(cause) = e {
        tracing::error!(request_id = id, %cause, "store failure");
        return err(id, e.code(), "the data store is unavailable", None);
    }
    err(id, e.code(), e.to_string(), e.details())
}

/// Turns a handler result into a wire response.
pub trait IntoResponse {
    fn response(self, id: &str) -> serde_json::Value;
}

impl IntoResponse for JournalResult<serde_json::Value> {
    fn response(self, id: &str) -> serde_json::Value {
        match self {
            Ok(v) => ok(id, v),
            Err(e) => journal_err(id, &e),
        }
    }
}

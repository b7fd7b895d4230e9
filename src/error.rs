use serde_json::json;
use thiserror::Error;

/// Errors surfaced to the UI shell. Each variant maps to one wire code.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: String, end: String },
    #[error("{date} is outside the active event")]
    OutOfScope { date: String },
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("concurrent write on {entity}")]
    DuplicateWrite { entity: &'static str },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{0}")]
    BadParams(String),
    #[error("{field} must be an integer between 0 and 5")]
    InvalidClo { field: &'static str },
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("sign in first")]
    Unauthenticated,
    #[error("not allowed for this role")]
    Forbidden,
    #[error("email or password is incorrect")]
    InvalidCredentials,
    #[error("no user profile found for this account")]
    NoRole,
    #[error("account {account_id} has profiles in several role tables")]
    IntegrityViolation { account_id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("password hashing failed")]
    PasswordHash(argon2::Error),
}

pub type JournalResult<T> = Result<T, JournalError>;

impl JournalError {
    pub fn code(&self) -> &'static str {
        match self {
            JournalError::InvalidRange { .. } => "invalid_range",
            JournalError::OutOfScope { .. } => "out_of_scope",
            JournalError::NotFound { .. } => "not_found",
            JournalError::DuplicateWrite { .. } => "duplicate_write",
            JournalError::StoreUnavailable(_) => "store_unavailable",
            JournalError::BadParams(_) => "bad_params",
            JournalError::InvalidClo { .. } => "invalid_clo",
            JournalError::NoWorkspace => "no_workspace",
            JournalError::Unauthenticated => "unauthenticated",
            JournalError::Forbidden => "forbidden",
            JournalError::InvalidCredentials => "invalid_credentials",
            JournalError::NoRole => "no_role",
            JournalError::IntegrityViolation { .. } => "integrity_violation",
            JournalError::Conflict(_) => "conflict",
            JournalError::PasswordHash(_) => "internal",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            JournalError::InvalidRange { start, end } => {
                Some(json!({ "startDate": start, "endDate": end }))
            }
            JournalError::OutOfScope { date } => Some(json!({ "date": date })),
            JournalError::NotFound { entity } | JournalError::DuplicateWrite { entity } => {
                Some(json!({ "entity": entity }))
            }
            JournalError::InvalidClo { field } => Some(json!({ "field": field })),
            _ => None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        JournalError::BadParams(message.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        JournalError::NotFound { entity }
    }
}

impl From<rusqlite::Error> for JournalError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref f, _) = e {
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return JournalError::DuplicateWrite { entity: "record" };
            }
        }
        JournalError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(e: serde_json::Error) -> Self {
        JournalError::StoreUnavailable(format!("corrupt json column: {e}"))
    }
}

use std::path::PathBuf;

use crate::config::Config;
use crate::error::{JournalError, JournalResult};
use crate::identity::Session;
use crate::store::Role;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            session: None,
        }
    }

    pub fn today(&self) -> String {
        self.config.clock.today()
    }

    pub fn conn(&self) -> JournalResult<&Connection> {
        self.db.as_ref().ok_or(JournalError::NoWorkspace)
    }

    pub fn session(&self) -> JournalResult<&Session> {
        self.session.as_ref().ok_or(JournalError::Unauthenticated)
    }

    /// Session of a signed-in account holding one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> JournalResult<&Session> {
        let session = self.session()?;
        if !roles.contains(&session.role()) {
            return Err(JournalError::Forbidden);
        }
        Ok(session)
    }
}

/// Typed accessors over `params`.
pub struct Params<'a>(pub &'a serde_json::Value);

impl<'a> Params<'a> {
    pub fn opt_str(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn str(&self, key: &str) -> JournalResult<&'a str> {
        self.opt_str(key)
            .ok_or_else(|| JournalError::bad_params(format!("missing {key}")))
    }

    /// Required string that must not be blank after trimming.
    pub fn text(&self, key: &str) -> JournalResult<&'a str> {
        let v = self.str(key)?.trim();
        if v.is_empty() {
            return Err(JournalError::bad_params(format!("{key} must not be empty")));
        }
        Ok(v)
    }

    pub fn opt_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    /// `None` when the key is absent, `Some(None)` when it is explicitly null.
    pub fn nullable_str(&self, key: &str) -> JournalResult<Option<Option<&'a str>>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) if v.is_null() => Ok(Some(None)),
            Some(v) => v
                .as_str()
                .map(|s| Some(Some(s)))
                .ok_or_else(|| JournalError::bad_params(format!("{key} must be a string or null"))),
        }
    }

    pub fn str_list(&self, key: &str) -> JournalResult<Vec<&'a str>> {
        let Some(arr) = self.0.get(key).and_then(|v| v.as_array()) else {
            return Err(JournalError::bad_params(format!("{key} must be an array")));
        };
        arr.iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| JournalError::bad_params(format!("{key} must hold strings")))
            })
            .collect()
    }
}

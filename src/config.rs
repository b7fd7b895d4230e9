use crate::dates::{self, Clock};
use anyhow::Context;
use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "ELJOURNAL_WORKSPACE";
pub const ENV_TODAY: &str = "ELJOURNAL_TODAY";
pub const ENV_LOG: &str = "ELJOURNAL_LOG";

const DEFAULT_LOG_FILTER: &str = "info";

/// Process-level settings read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub clock: Clock,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            clock: Clock::System,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let workspace = non_empty(ENV_WORKSPACE).map(PathBuf::from);
        let clock = match non_empty(ENV_TODAY) {
            Some(raw) => {
                let date = dates::parse_date(&raw)
                    .with_context(|| format!("{ENV_TODAY} must be YYYY-MM-DD, got {raw:?}"))?;
                Clock::Fixed(date)
            }
            None => Clock::System,
        };
        let log_filter = non_empty(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            workspace,
            clock,
            log_filter,
        })
    }
}

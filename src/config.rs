use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "bowlpool.sqlite3";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_USER_HEADER: &str = "x-forwarded-email";

/// Settings read from `BOWLPOOL_*` environment variables (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub bind_address: String,
    /// When everyone's picks become visible; defaults to the first kickoff of the year
    pub reveal_at: Option<DateTime<Utc>>,
    /// Header carrying the authenticated user's email, set by the auth proxy
    pub user_header: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_address: DEFAULT_BIND.to_string(),
            reveal_at: None,
            user_header: DEFAULT_USER_HEADER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let reveal_at = match get("BOWLPOOL_REVEAL_AT") {
            Some(value) => Some(
                DateTime::parse_from_rfc3339(&value)
                    .map_err(|e| Error::Config(format!("BOWLPOOL_REVEAL_AT {:?}: {}", value, e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Config {
            database_path: get("BOWLPOOL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            bind_address: get("BOWLPOOL_BIND").unwrap_or(defaults.bind_address),
            reveal_at,
            user_header: get("BOWLPOOL_USER_HEADER")
                .map(|h| h.to_lowercase())
                .unwrap_or(defaults.user_header),
        })
    }
}

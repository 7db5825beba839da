//! Adapter Configuration
//!
//! Backend selection is read from the environment once at process start:
//!
//! | variable              | meaning                                        |
//! |-----------------------|------------------------------------------------|
//! | `YEARBOOK_DB_BACKEND` | `local` (default), `remote` or `memory`        |
//! | `YEARBOOK_DB_PATH`    | local database file (default `./data/yearbook.db`) |
//! | `TURSO_DATABASE_URL`  | remote endpoint, required for `remote`         |
//! | `TURSO_AUTH_TOKEN`    | remote auth token, required for `remote`       |
//!
//! Missing remote settings are a startup error; there is no silent fallback
//! to another backend.

use crate::db::error::{Result, StoreError};
use std::path::PathBuf;

pub const BACKEND_VAR: &str = "YEARBOOK_DB_BACKEND";
pub const PATH_VAR: &str = "YEARBOOK_DB_PATH";
pub const URL_VAR: &str = "TURSO_DATABASE_URL";
pub const TOKEN_VAR: &str = "TURSO_AUTH_TOKEN";

const DEFAULT_DB_PATH: &str = "./data/yearbook.db";

/// Which backend to construct, with its settings
#[derive(Clone, PartialEq, Eq)]
pub enum AdapterConfig {
    Memory,
    Local { path: PathBuf },
    Remote { url: String, auth_token: String },
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterConfig::Memory => f.write_str("Memory"),
            AdapterConfig::Local { path } => f.debug_struct("Local").field("path", path).finish(),
            AdapterConfig::Remote { url, .. } => f
                .debug_struct("Remote")
                .field("url", url)
                .field("auth_token", &"<redacted>")
                .finish(),
        }
    }
}

impl AdapterConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend = var(BACKEND_VAR).unwrap_or_else(|| "local".to_string());
        match backend.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(AdapterConfig::Memory),
            "local" => Ok(AdapterConfig::Local {
                path: var(PATH_VAR)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            }),
            "remote" => {
                let url = var(URL_VAR).ok_or_else(|| missing(URL_VAR))?;
                let auth_token = var(TOKEN_VAR).ok_or_else(|| missing(TOKEN_VAR))?;
                Ok(AdapterConfig::Remote { url, auth_token })
            }
            other => Err(StoreError::config(format!(
                "unknown {} '{}' (expected local, remote or memory)",
                BACKEND_VAR, other
            ))),
        }
    }

    /// Short backend name for logs
    pub fn backend_name(&self) -> &'static str {
        match self {
            AdapterConfig::Memory => "memory",
            AdapterConfig::Local { .. } => "local",
            AdapterConfig::Remote { .. } => "remote",
        }
    }
}

fn missing(name: &str) -> StoreError {
    StoreError::config(format!("{} must be set for the remote backend", name))
}

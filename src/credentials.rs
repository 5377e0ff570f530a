//! # Credential Store
//!
//! Reads the bearer token persisted by the sign-in flow.
//!
//! The store is a small JSON key-value file. The token lives under the
//! `user` key together with its expiry:
//!
//! ```json
//! { "user": { "value": "<token>", "expires_at": "2027-10-16T08:00:00Z" } }
//! ```
//!
//! The file is read on every lookup so a token written (or removed) by
//! another process is picked up without a restart.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CrashtrackError, Result};

/// Key under which the auth flow stores the bearer token
pub const TOKEN_KEY: &str = "user";

/// Lifetime given to newly stored tokens
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 365;

/// Read access to the bearer token.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialAccessor: Send + Sync {
    /// Returns the current token, or `None` when signed out or expired.
    fn token(&self) -> Option<String>;

    /// Forget the stored token.
    fn sign_out(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `token` under [`TOKEN_KEY`] with the default lifetime.
    pub fn store(&self, token: &str) -> Result<()> {
        self.store_with_ttl(token, Duration::days(DEFAULT_TOKEN_TTL_DAYS))
    }

    /// Persists `token` with an explicit lifetime, keeping other keys intact.
    pub fn store_with_ttl(&self, token: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.read_entries()?;
        entries.insert(
            TOKEN_KEY.to_string(),
            StoredEntry {
                value: token.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        self.write_entries(&entries)
    }

    /// Removes the token (sign-out). Missing files are fine.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.read_entries()?;
        if entries.remove(TOKEN_KEY).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }

    fn read_entries(&self) -> Result<BTreeMap<String, StoredEntry>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                CrashtrackError::Credentials(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, StoredEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| CrashtrackError::Credentials(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl CredentialAccessor for FileCredentialStore {
    fn token(&self) -> Option<String> {
        let entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable credential store: {}", e);
                return None;
            }
        };

        let entry = entries.get(TOKEN_KEY)?;
        if entry.expires_at <= Utc::now() {
            debug!(expired_at = %entry.expires_at, "Stored token has expired");
            return None;
        }
        if entry.value.is_empty() {
            return None;
        }
        Some(entry.value.clone())
    }

    fn sign_out(&self) -> Result<()> {
        self.clear()
    }
}

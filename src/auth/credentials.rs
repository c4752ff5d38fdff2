//! Durable bearer-credential storage.

use std::fs;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Credential file name in the data directory
const CREDENTIAL_FILE: &str = "credential.json";

/// An opaque bearer token. Expiry is known only to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            created_at: Utc::now(),
        }
    }

    /// Shorthand for the common `bearer` token type.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::new(access_token, "bearer")
    }
}

/// The sole long-lived owner of the current credential.
///
/// Other components read the credential on demand and never cache it, so a
/// refresh takes effect for every subsequent dispatch immediately.
pub struct CredentialStore {
    path: PathBuf,
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Open the store rooted at `dir`, loading any persisted credential.
    pub fn open(dir: PathBuf) -> Self {
        let path = dir.join(CREDENTIAL_FILE);
        let current = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable credential file");
                    None
                }
            },
            Err(_) => None,
        };
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    /// The current credential, if any.
    pub fn get(&self) -> Option<Credential> {
        self.read_lock().clone()
    }

    /// Replace the credential and persist it.
    pub fn set(&self, credential: Credential) -> Result<()> {
        *self.write_lock() = Some(credential.clone());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create credential directory")?;
        }
        let contents = serde_json::to_string_pretty(&credential)?;
        fs::write(&self.path, contents).context("Failed to write credential file")?;
        Ok(())
    }

    /// Drop the credential and remove the persisted copy.
    pub fn clear(&self) -> Result<()> {
        *self.write_lock() = None;

        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove credential file")?;
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_lock().is_some()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Option<Credential>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Option<Credential>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}

//! Durable credential storage.
//!
//! The identity survives process restarts as one versioned JSON document,
//! so the username/token pair can never be observed half-written: a save
//! replaces the whole document and a clear removes it.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const CREDENTIAL_SCHEMA_VERSION: u32 = 1;
const CREDENTIAL_FILE_NAME: &str = "credentials.v1.json";

/// Authenticated identity: username plus the opaque token issued at login.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub token: String,
}

impl Session {
    #[must_use]
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

// The token is a live credential; keep it out of Debug output.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Credential store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential encode failed: {0}")]
    Encode(String),

    #[error("credential write failed: {0}")]
    Write(String),

    #[error("credential clear failed: {0}")]
    Clear(String),
}

/// Storage seam for the authenticated identity. `save` must overwrite the
/// previous pair as a unit and `clear` must remove both fields together.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<Session>, StoreError>;
    fn save(&self, session: &Session) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CredentialDocument {
    version: u32,
    username: String,
    token: String,
    saved_at: String,
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the platform-default location.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(default_credentials_path())
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    /// A missing, unreadable, or unparsable document means logged out; a
    /// corrupt store must never wedge startup.
    fn load(&self) -> Result<Option<Session>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) => {
                if error.kind() != ErrorKind::NotFound {
                    warn!("credential read failed, treating as logged out: {error}");
                }
                return Ok(None);
            }
        };
        match serde_json::from_str::<CredentialDocument>(raw.as_str()) {
            Ok(document) if document.version == CREDENTIAL_SCHEMA_VERSION => {
                Ok(Some(Session::new(document.username, document.token)))
            }
            Ok(document) => {
                warn!(
                    "credential document has unknown version {}, treating as logged out",
                    document.version
                );
                Ok(None)
            }
            Err(error) => {
                warn!("credential document is corrupt, treating as logged out: {error}");
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| StoreError::Write(format!("credential mkdir failed: {error}")))?;
        }
        let encoded = serde_json::to_string_pretty(&CredentialDocument {
            version: CREDENTIAL_SCHEMA_VERSION,
            username: session.username.clone(),
            token: session.token.clone(),
            saved_at: Utc::now().to_rfc3339(),
        })
        .map_err(|error| StoreError::Encode(error.to_string()))?;
        fs::write(&self.path, encoded).map_err(|error| StoreError::Write(error.to_string()))
    }

    /// Removing the document drops both fields at once; an already-absent
    /// document counts as cleared.
    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::Clear(error.to_string())),
        }
    }
}

fn default_credentials_path() -> PathBuf {
    if let Some(mut data_dir) = dirs::data_local_dir() {
        data_dir.push("wirechat");
        data_dir.push(CREDENTIAL_FILE_NAME);
        return data_dir;
    }

    if let Some(mut home_dir) = dirs::home_dir() {
        home_dir.push(".wirechat");
        home_dir.push(CREDENTIAL_FILE_NAME);
        return home_dir;
    }

    PathBuf::from(CREDENTIAL_FILE_NAME)
}

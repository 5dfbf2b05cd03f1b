//! Session error types.

use thiserror::Error;
use wirechat_client::ClientError;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Session error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session already exists; log out before logging in again.
    #[error("a session is already active")]
    AlreadyActive,

    /// The operation needs a logged-in session.
    #[error("not logged in")]
    NotLoggedIn,

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias using `SessionError`.
pub type Result<T> = std::result::Result<T, SessionError>;

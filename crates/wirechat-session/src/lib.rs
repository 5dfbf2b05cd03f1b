//! Session layer for the wirechat client.
//!
//! Sits on top of `wirechat-client` and owns everything stateful: the
//! persisted identity, the observable snapshot frontends render from, and
//! the login-to-logout lifecycle including forced logout on rejected
//! tokens and channel closure. Frontends call the `SessionController`
//! operations and subscribe to snapshots; they never talk to the HTTP API
//! or the channel directly.

pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod store;

pub use config::{ConfigError, DEFAULT_BASE_URL, SessionConfig};
pub use error::{Result, SessionError};
pub use session::SessionController;
pub use state::{SessionPhase, SessionSnapshot, SessionState};
pub use store::{CredentialStore, FileCredentialStore, Session, StoreError};

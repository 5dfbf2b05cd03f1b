//! Wire types for the chat service's HTTP boundary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One element of the `GET /messages` response, in server order.
///
/// The server also stamps each entry with a timestamp; it is decoded
/// leniently and unused for display.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryEntry {
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    /// Render the entry the way the server formats live chat frames, so
    /// hydrated history and live lines are indistinguishable downstream.
    #[must_use]
    pub fn display_line(&self) -> String {
        format!("💬 {}: {}", self.username, self.message)
    }
}

/// Request body shared by `POST /login` and `POST /register`.
#[derive(Debug, Serialize)]
pub(crate) struct CredentialsBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Success body of `POST /login`. The server also sends `token_type`;
/// unknown fields are ignored. A missing token is an auth failure, not a
/// decode failure.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Error body the server attaches to auth rejections.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<String>,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

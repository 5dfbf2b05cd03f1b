//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Transport error type shared by the HTTP and realtime clients.
///
/// `AuthFailure` is user-correctable and must never end a session.
/// `Unauthorized` means the server rejected the session token; callers are
/// expected to end the session on it. Everything else is transport noise
/// to surface or log, with session state left alone.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("unauthorized: session token rejected")]
    Unauthorized,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("malformed response body: {0}")]
    Decode(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;

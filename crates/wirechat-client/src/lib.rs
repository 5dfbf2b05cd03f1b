//! Transport layer for the wirechat service.
//!
//! This crate intentionally exposes a small surface:
//! - login/register and history fetch/clear over HTTP
//! - one realtime channel per session over WebSocket
//! - the error taxonomy the session layer's policy decisions key on
//!
//! Nothing here persists state or decides session policy; that lives in
//! `wirechat-session`.

pub mod channel;
pub mod error;
pub mod http;
pub mod types;

pub use channel::{
    ChannelConfig, ChannelEvent, ChatChannel, ConnectionState, channel_url, derive_ws_base,
    outbound_payload, validate_ws_base,
};
pub use error::{ClientError, Result};
pub use http::{ApiClient, ApiConfig, normalize_base_url};
pub use types::HistoryEntry;

//! Session configuration.
//!
//! Everything is overridable through `WIRECHAT_*` environment variables and
//! falls back to defaults that point at a local dev server.

use std::path::PathBuf;

use thiserror::Error;
use url::Url;
use wirechat_client::{ApiConfig, derive_ws_base, normalize_base_url, validate_ws_base};

use crate::store::FileCredentialStore;

/// Base URL of the chat HTTP API.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

const BASE_URL_ENV: &str = "WIRECHAT_BASE_URL";
const WS_URL_ENV: &str = "WIRECHAT_WS_URL";
const CREDENTIALS_PATH_ENV: &str = "WIRECHAT_CREDENTIALS_PATH";

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL: {0}")]
    BaseUrl(String),

    #[error("invalid realtime URL: {0}")]
    WsUrl(String),
}

/// Tunable session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP API base, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Explicit realtime base (`ws://` or `wss://`). When unset, the base is
    /// derived from `base_url` so the channel inherits its transport
    /// security.
    pub ws_url: Option<String>,
    /// Per-request HTTP timeout.
    pub timeout_ms: u64,
    /// Credential file override; platform default when unset.
    pub credentials_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            ws_url: None,
            timeout_ms: wirechat_client::http::DEFAULT_TIMEOUT_MS,
            credentials_path: None,
        }
    }
}

impl SessionConfig {
    /// Configuration from the process environment. Unset or blank variables
    /// keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base_url) = env_value(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        config.ws_url = env_value(WS_URL_ENV);
        config.credentials_path = env_value(CREDENTIALS_PATH_ENV).map(PathBuf::from);
        config
    }

    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            timeout_ms: self.timeout_ms,
        }
    }

    /// Resolved realtime base URL. An explicit override must already carry a
    /// `ws`/`wss` scheme; otherwise the base URL's scheme decides.
    pub fn ws_base(&self) -> Result<Url, ConfigError> {
        if let Some(ws_url) = self.ws_url.as_deref() {
            return validate_ws_base(ws_url).map_err(|error| ConfigError::WsUrl(error.to_string()));
        }
        let base = normalize_base_url(&self.base_url)
            .map_err(|error| ConfigError::BaseUrl(error.to_string()))?;
        derive_ws_base(&base).map_err(|error| ConfigError::BaseUrl(error.to_string()))
    }

    #[must_use]
    pub fn credential_store(&self) -> FileCredentialStore {
        match &self.credentials_path {
            Some(path) => FileCredentialStore::new(path.clone()),
            None => FileCredentialStore::default_location(),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock, PoisonError};

    use super::*;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn with_env<T>(pairs: &[(&str, Option<&str>)], run: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let saved: Vec<(String, Option<String>)> = pairs
            .iter()
            .map(|(name, _)| ((*name).to_owned(), std::env::var(name).ok()))
            .collect();
        for (name, value) in pairs {
            match value {
                Some(value) => unsafe { std::env::set_var(name, value) },
                None => unsafe { std::env::remove_var(name) },
            }
        }
        let outcome = run();
        for (name, value) in saved {
            match value {
                Some(value) => unsafe { std::env::set_var(&name, value) },
                None => unsafe { std::env::remove_var(&name) },
            }
        }
        outcome
    }

    #[test]
    fn defaults_point_at_the_local_dev_server() -> Result<(), ConfigError> {
        with_env(
            &[
                (BASE_URL_ENV, None),
                (WS_URL_ENV, None),
                (CREDENTIALS_PATH_ENV, None),
            ],
            || {
                let config = SessionConfig::from_env();
                assert_eq!(config.base_url, DEFAULT_BASE_URL);
                assert!(config.ws_url.is_none());
                assert!(config.credentials_path.is_none());
                assert_eq!(config.ws_base()?.as_str(), "ws://127.0.0.1:8000/");
                Ok(())
            },
        )
    }

    #[test]
    fn environment_overrides_every_field() {
        with_env(
            &[
                (BASE_URL_ENV, Some("https://chat.example.com")),
                (WS_URL_ENV, Some("wss://chat.example.com")),
                (CREDENTIALS_PATH_ENV, Some("/tmp/wirechat-creds.json")),
            ],
            || {
                let config = SessionConfig::from_env();
                assert_eq!(config.base_url, "https://chat.example.com");
                assert_eq!(config.ws_url.as_deref(), Some("wss://chat.example.com"));
                assert_eq!(
                    config.credentials_path,
                    Some(PathBuf::from("/tmp/wirechat-creds.json"))
                );
            },
        );
    }

    #[test]
    fn blank_environment_values_keep_defaults() {
        with_env(
            &[
                (BASE_URL_ENV, Some("   ")),
                (WS_URL_ENV, Some("")),
                (CREDENTIALS_PATH_ENV, Some("  ")),
            ],
            || {
                let config = SessionConfig::from_env();
                assert_eq!(config.base_url, DEFAULT_BASE_URL);
                assert!(config.ws_url.is_none());
                assert!(config.credentials_path.is_none());
            },
        );
    }

    #[test]
    fn derived_realtime_base_mirrors_the_http_scheme() -> Result<(), ConfigError> {
        let mut config = SessionConfig {
            base_url: "https://chat.example.com".to_owned(),
            ..SessionConfig::default()
        };
        assert_eq!(config.ws_base()?.scheme(), "wss");

        config.base_url = "http://chat.example.com".to_owned();
        assert_eq!(config.ws_base()?.scheme(), "ws");
        Ok(())
    }

    #[test]
    fn explicit_realtime_override_must_use_a_websocket_scheme() {
        let mut config = SessionConfig {
            ws_url: Some("http://chat.example.com".to_owned()),
            ..SessionConfig::default()
        };
        assert!(matches!(config.ws_base(), Err(ConfigError::WsUrl(_))));

        config.ws_url = Some("wss://chat.example.com".to_owned());
        assert!(config.ws_base().is_ok());
    }

    #[test]
    fn credential_store_honors_the_path_override() {
        let config = SessionConfig {
            credentials_path: Some(PathBuf::from("/tmp/creds.json")),
            ..SessionConfig::default()
        };
        let store = config.credential_store();
        assert_eq!(store.path(), &PathBuf::from("/tmp/creds.json"));
    }
}

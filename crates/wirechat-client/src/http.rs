//! HTTP client for the auth and history endpoints.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::types::{CredentialsBody, ErrorDetail, HistoryEntry, LoginResponse};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const LOGIN_PATH: &str = "/login";
const REGISTER_PATH: &str = "/register";
const MESSAGES_PATH: &str = "/messages";

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Client for the chat service's HTTP boundary: login, registration, and
/// persisted history. Holds no session state; callers pass the token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            http: reqwest::Client::new(),
        })
    }

    /// Normalized base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange credentials for an opaque session token.
    ///
    /// Every rejection the server can express (bad credentials, missing
    /// token field) maps to `AuthFailure`; only transport problems and
    /// unparseable bodies surface as `Transport`/`Decode`.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .post_json(LOGIN_PATH, &CredentialsBody { username, password })
            .await?;
        let (status, body) = split_response(response).await?;
        if !status.is_success() {
            return Err(ClientError::AuthFailure(failure_detail(status, &body)));
        }
        let decoded: LoginResponse = decode_json(&body)?;
        match decoded.access_token {
            Some(token) if !token.is_empty() => {
                debug!("login accepted for {username}");
                Ok(token)
            }
            _ => Err(ClientError::AuthFailure(
                "login response carried no access token".to_string(),
            )),
        }
    }

    /// Create an account. 2xx is success; anything else is a reported
    /// failure (e.g. a duplicate username), never a fatal error.
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .post_json(REGISTER_PATH, &CredentialsBody { username, password })
            .await?;
        let (status, body) = split_response(response).await?;
        if !status.is_success() {
            return Err(ClientError::AuthFailure(failure_detail(status, &body)));
        }
        debug!("registration accepted for {username}");
        Ok(())
    }

    /// Fetch persisted history in server order.
    ///
    /// 401 maps to `Unauthorized` so the caller can end the session;
    /// any other failure is transient from the caller's point of view.
    pub async fn fetch_history(&self, token: &str) -> Result<Vec<HistoryEntry>> {
        let response = self
            .request(reqwest::Method::GET, MESSAGES_PATH)
            .header("token", token)
            .send()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))?;
        let (status, body) = split_response(response).await?;
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        decode_json(&body)
    }

    /// Delete all persisted history for this token's identity. The caller
    /// must not drop its local view until this returns success.
    pub async fn clear_history(&self, token: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, MESSAGES_PATH)
            .header("token", token)
            .send()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))?;
        let (status, body) = split_response(response).await?;
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(())
    }

    async fn post_json<B>(&self, path: &str, body: &B) -> Result<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        self.request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|error| ClientError::Transport(error.to_string()))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("x-request-id", request_id())
            .timeout(self.timeout)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Validate and normalize an HTTP base URL: trim whitespace and trailing
/// slashes, require an http(s) scheme and a host.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::InvalidUrl("base URL is empty".to_string()));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientError::InvalidUrl(format!(
            "base URL must use http:// or https://, got: {trimmed}"
        )));
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(ClientError::InvalidUrl(format!("base URL is malformed: {trimmed}")));
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(ClientError::InvalidUrl("base URL is missing a host".to_string()));
    }
    Ok(trimmed.to_string())
}

fn request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

async fn split_response(response: reqwest::Response) -> Result<(StatusCode, Vec<u8>)> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|error| ClientError::Transport(error.to_string()))?;
    Ok((status, body.to_vec()))
}

fn decode_json<T>(body: &[u8]) -> Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    serde_json::from_slice(body).map_err(|error| ClientError::Decode(error.to_string()))
}

fn http_error(status: StatusCode, body: &[u8]) -> ClientError {
    let body = String::from_utf8_lossy(body).trim().to_string();
    let body = if body.is_empty() {
        "<empty>".to_string()
    } else {
        body
    };
    ClientError::Http { status, body }
}

/// Prefer the server's `detail` field for auth rejections; fall back to
/// the bare status so the user always sees something actionable.
fn failure_detail(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorDetail>(body)
        .ok()
        .and_then(|payload| payload.detail)
        .unwrap_or_else(|| format!("status {status}"))
}

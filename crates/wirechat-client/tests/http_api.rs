//! ApiClient tests against an in-process stub of the chat backend.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::{Result, anyhow};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use wirechat_client::{ApiClient, ApiConfig, ClientError};

#[derive(Clone)]
struct ChatApiState {
    username: String,
    password: String,
    token: String,
    history: Arc<Vec<Value>>,
    omit_token_field: bool,
    fail_delete: bool,
    delete_calls: Arc<AtomicU64>,
}

struct ChatApiStub {
    base_url: String,
    delete_calls: Arc<AtomicU64>,
    _shutdown: oneshot::Sender<()>,
}

#[derive(Default)]
struct StubOptions {
    omit_token_field: bool,
    fail_delete: bool,
    history: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

async fn spawn_chat_api_stub(options: StubOptions) -> Result<ChatApiStub> {
    let state = ChatApiState {
        username: "alice".to_string(),
        password: "pw".to_string(),
        token: "T1".to_string(),
        history: Arc::new(options.history),
        omit_token_field: options.omit_token_field,
        fail_delete: options.fail_delete,
        delete_calls: Arc::new(AtomicU64::new(0)),
    };

    let app = Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/messages", get(list_messages).delete(delete_messages))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });

    Ok(ChatApiStub {
        base_url: format!("http://{addr}"),
        delete_calls: state.delete_calls.clone(),
        _shutdown: shutdown_tx,
    })
}

fn token_ok(headers: &HeaderMap, expected: &str) -> bool {
    headers.get("token").and_then(|value| value.to_str().ok()) == Some(expected)
}

async fn login(
    State(state): State<ChatApiState>,
    Json(body): Json<Credentials>,
) -> (StatusCode, Json<Value>) {
    if state.omit_token_field {
        return (StatusCode::OK, Json(json!({ "token_type": "bearer" })));
    }
    if body.username == state.username && body.password == state.password {
        (
            StatusCode::OK,
            Json(json!({ "access_token": state.token, "token_type": "bearer" })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid credentials" })),
        )
    }
}

async fn register(
    State(state): State<ChatApiState>,
    Json(body): Json<Credentials>,
) -> (StatusCode, Json<Value>) {
    if body.username == state.username {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Username already registered" })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "msg": "User registered" })))
    }
}

async fn list_messages(
    State(state): State<ChatApiState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !token_ok(&headers, &state.token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid token" })),
        );
    }
    (StatusCode::OK, Json(Value::Array(state.history.as_ref().clone())))
}

async fn delete_messages(
    State(state): State<ChatApiState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.delete_calls.fetch_add(1, Ordering::Relaxed);
    if !token_ok(&headers, &state.token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid token" })),
        );
    }
    if state.fail_delete {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "storage offline" })),
        );
    }
    (StatusCode::OK, Json(json!({ "msg": "All messages deleted" })))
}

fn client_for(stub: &ChatApiStub) -> Result<ApiClient> {
    Ok(ApiClient::new(ApiConfig::new(stub.base_url.as_str()))?)
}

#[tokio::test]
async fn login_exchanges_credentials_for_a_token() -> Result<()> {
    let stub = spawn_chat_api_stub(StubOptions::default()).await?;
    let client = client_for(&stub)?;

    let token = client.login("alice", "pw").await?;
    assert_eq!(token, "T1");

    match client.login("alice", "wrong").await {
        Err(ClientError::AuthFailure(detail)) => assert_eq!(detail, "Invalid credentials"),
        other => return Err(anyhow!("expected auth failure, got {other:?}")),
    }
    Ok(())
}

#[tokio::test]
async fn login_without_a_token_field_is_an_auth_failure_not_a_crash() -> Result<()> {
    let stub = spawn_chat_api_stub(StubOptions {
        omit_token_field: true,
        ..StubOptions::default()
    })
    .await?;
    let client = client_for(&stub)?;

    match client.login("alice", "pw").await {
        Err(ClientError::AuthFailure(_)) => Ok(()),
        other => Err(anyhow!("expected auth failure, got {other:?}")),
    }
}

#[tokio::test]
async fn register_reports_conflicts_with_the_server_detail() -> Result<()> {
    let stub = spawn_chat_api_stub(StubOptions::default()).await?;
    let client = client_for(&stub)?;

    client.register("carol", "pw").await?;

    match client.register("alice", "pw").await {
        Err(ClientError::AuthFailure(detail)) => {
            assert_eq!(detail, "Username already registered");
        }
        other => return Err(anyhow!("expected auth failure, got {other:?}")),
    }
    Ok(())
}

#[tokio::test]
async fn history_preserves_server_order_and_distinguishes_unauthorized() -> Result<()> {
    let stub = spawn_chat_api_stub(StubOptions {
        history: vec![
            json!({ "username": "bob", "message": "hey", "timestamp": "2026-08-21T10:00:00Z" }),
            json!({ "username": "alice", "message": "yo" }),
        ],
        ..StubOptions::default()
    })
    .await?;
    let client = client_for(&stub)?;

    let entries = client.fetch_history("T1").await?;
    let lines: Vec<String> = entries.iter().map(|entry| entry.display_line()).collect();
    assert_eq!(lines, vec!["💬 bob: hey", "💬 alice: yo"]);

    match client.fetch_history("stale").await {
        Err(ClientError::Unauthorized) => Ok(()),
        other => Err(anyhow!("expected unauthorized, got {other:?}")),
    }
}

#[tokio::test]
async fn clear_history_maps_unauthorized_and_server_failures_distinctly() -> Result<()> {
    let stub = spawn_chat_api_stub(StubOptions {
        fail_delete: true,
        ..StubOptions::default()
    })
    .await?;
    let client = client_for(&stub)?;

    match client.clear_history("stale").await {
        Err(ClientError::Unauthorized) => {}
        other => return Err(anyhow!("expected unauthorized, got {other:?}")),
    }

    match client.clear_history("T1").await {
        Err(ClientError::Http { status, .. }) => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        other => return Err(anyhow!("expected http error, got {other:?}")),
    }
    assert_eq!(stub.delete_calls.load(Ordering::Relaxed), 2);
    Ok(())
}

#[tokio::test]
async fn clear_history_succeeds_only_after_server_confirms() -> Result<()> {
    let stub = spawn_chat_api_stub(StubOptions::default()).await?;
    let client = client_for(&stub)?;

    client.clear_history("T1").await?;
    assert_eq!(stub.delete_calls.load(Ordering::Relaxed), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_surfaces_as_transport_failure() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = ApiClient::new(ApiConfig::new(format!("http://{addr}")))?;
    match client.login("alice", "pw").await {
        Err(ClientError::Transport(_)) => Ok(()),
        other => Err(anyhow!("expected transport failure, got {other:?}")),
    }
}

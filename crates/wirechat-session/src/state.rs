//! Observable session state.
//!
//! Every externally visible fact about the session lives in one snapshot
//! published through a watch channel. Frontends subscribe and re-render on
//! change; they never mutate the snapshot directly.

use std::sync::Arc;

use tokio::sync::watch;
use wirechat_client::ConnectionState;

use crate::store::Session;

/// Lifecycle phase of the session as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No identity; nothing persisted.
    LoggedOut,
    /// Login in flight.
    Authenticating,
    /// Logged in, realtime channel down.
    Idle,
    /// Logged in, realtime channel up.
    Live,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::Authenticating => "authenticating",
            Self::Idle => "idle",
            Self::Live => "live",
        }
    }
}

/// One coherent view of the session at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub connection: ConnectionState,
    /// Display lines in arrival order: hydrated history first, then live
    /// messages appended at the end.
    pub messages: Vec<String>,
    pub last_error: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::LoggedOut,
            session: None,
            connection: ConnectionState::Disconnected,
            messages: Vec::new(),
            last_error: None,
        }
    }
}

impl SessionSnapshot {
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.username.as_str())
    }
}

/// Shared handle to the published snapshot.
#[derive(Debug, Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot by value.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// New subscription; the receiver immediately observes the current value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Apply one mutation and publish the result to all subscribers.
    pub fn update(&self, apply: impl FnOnce(&mut SessionSnapshot)) {
        self.tx.send_modify(apply);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_logged_out_and_empty() {
        let state = SessionState::new();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::LoggedOut);
        assert!(snapshot.session.is_none());
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn subscribers_observe_each_published_update() -> anyhow::Result<()> {
        let state = SessionState::new();
        let mut updates = state.subscribe();

        state.update(|snapshot| {
            snapshot.phase = SessionPhase::Idle;
            snapshot.session = Some(Session::new("alice", "T1"));
        });

        updates.changed().await?;
        let observed = updates.borrow_and_update().clone();
        assert_eq!(observed.phase, SessionPhase::Idle);
        assert_eq!(observed.username(), Some("alice"));
        Ok(())
    }

    #[test]
    fn updates_are_visible_through_every_handle() {
        let state = SessionState::new();
        let other = state.clone();

        state.update(|snapshot| snapshot.messages.push("💬 bob: hey".to_owned()));

        assert_eq!(other.snapshot().messages, vec!["💬 bob: hey".to_owned()]);
    }

    #[test]
    fn phase_labels_are_stable() {
        assert_eq!(SessionPhase::LoggedOut.as_str(), "logged_out");
        assert_eq!(SessionPhase::Authenticating.as_str(), "authenticating");
        assert_eq!(SessionPhase::Idle.as_str(), "idle");
        assert_eq!(SessionPhase::Live.as_str(), "live");
    }
}

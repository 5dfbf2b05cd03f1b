//! Session lifecycle orchestration.
//!
//! `SessionController` owns the whole login-to-logout span: it exchanges
//! credentials for a token, persists the identity, hydrates history, opens
//! the realtime channel, and funnels every session-ending path (explicit
//! logout, rejected token, channel closure) through one teardown chokepoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;
use wirechat_client::{
    ApiClient, ChannelConfig, ChannelEvent, ChatChannel, ClientError, ConnectionState,
    HistoryEntry, channel_url,
};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::state::{SessionPhase, SessionSnapshot, SessionState};
use crate::store::{CredentialStore, Session, StoreError};

/// The session currently holding the state, fenced by its epoch. Stale
/// channel events compare their epoch against this entry and drop out.
struct ActiveSession {
    session: Session,
    epoch: u64,
    channel: Arc<ChatChannel>,
}

/// Cheaply cloneable handle driving one chat session at a time.
#[derive(Clone)]
pub struct SessionController {
    api: ApiClient,
    store: Arc<dyn CredentialStore + Send + Sync>,
    state: SessionState,
    ws_base: Url,
    channel_config: ChannelConfig,
    active: Arc<Mutex<Option<ActiveSession>>>,
    epochs: Arc<AtomicU64>,
}

impl SessionController {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let api = ApiClient::new(config.api_config())?;
        let ws_base = config.ws_base()?;
        let store: Arc<dyn CredentialStore + Send + Sync> = Arc::new(config.credential_store());
        Ok(Self::with_parts(api, store, ws_base))
    }

    /// Assemble a controller from pre-built parts. Lets callers substitute
    /// the credential store or point the channel somewhere specific.
    #[must_use]
    pub fn with_parts(
        api: ApiClient,
        store: Arc<dyn CredentialStore + Send + Sync>,
        ws_base: Url,
    ) -> Self {
        Self {
            api,
            store,
            state: SessionState::new(),
            ws_base,
            channel_config: ChannelConfig::default(),
            active: Arc::new(Mutex::new(None)),
            epochs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current snapshot by value.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Exchange credentials for a token, persist the identity, then hydrate
    /// and connect. Fails with `AlreadyActive` when a session exists.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.state.update(|snapshot| {
            snapshot.phase = SessionPhase::Authenticating;
            snapshot.last_error = None;
        });
        let token = match self.api.login(username, password).await {
            Ok(token) => token,
            Err(error) => {
                self.state.update(|snapshot| {
                    snapshot.phase = SessionPhase::LoggedOut;
                    snapshot.last_error = Some(error.to_string());
                });
                return Err(error.into());
            }
        };
        let session = Session::new(username, token);
        if let Err(error) = self.store.save(&session) {
            self.state.update(|snapshot| {
                snapshot.phase = SessionPhase::LoggedOut;
                snapshot.last_error = Some(error.to_string());
            });
            return Err(error.into());
        }
        self.establish(&mut active, session).await
    }

    /// Create an account. Pure proxy to the HTTP API; never touches session
    /// state, so a fresh registration still requires an explicit login.
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        self.api.register(username, password).await?;
        Ok(())
    }

    /// Re-enter the logged-in flow from persisted credentials, skipping the
    /// login round-trip. Returns `false` when nothing is stored.
    pub async fn resume(&self) -> Result<bool> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        let Some(session) = self.store.load()? else {
            return Ok(false);
        };
        info!(username = %session.username, "resuming stored session");
        self.establish(&mut active, session).await?;
        Ok(true)
    }

    /// Send one chat message. A no-op unless the channel is connected;
    /// blank input never produces a frame.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let channel = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(entry) => Arc::clone(&entry.channel),
                None => {
                    debug!("send ignored: no active session");
                    return Ok(());
                }
            }
        };
        match channel.send(text).await {
            Ok(()) => Ok(()),
            Err(ClientError::NotConnected) => {
                debug!("send ignored: channel not connected");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Delete the persisted history server-side, and only then clear the
    /// local message sequence. On failure the sequence stays as it is.
    pub async fn clear_history(&self) -> Result<()> {
        let (token, epoch) = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(entry) => (entry.session.token.clone(), entry.epoch),
                None => return Err(SessionError::NotLoggedIn),
            }
        };
        match self.api.clear_history(&token).await {
            Ok(()) => {
                let active = self.active.lock().await;
                if active.as_ref().map(|entry| entry.epoch) == Some(epoch) {
                    self.state.update(|snapshot| snapshot.messages.clear());
                }
                Ok(())
            }
            Err(ClientError::Unauthorized) => {
                self.force_logout(epoch, &ClientError::Unauthorized.to_string())
                    .await;
                Err(ClientError::Unauthorized.into())
            }
            Err(error) => {
                self.state
                    .update(|snapshot| snapshot.last_error = Some(error.to_string()));
                Err(error.into())
            }
        }
    }

    /// Tear the session down: close the channel, clear the credential
    /// store, drop the message sequence, publish LoggedOut. Idempotent.
    pub async fn logout(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_none() && self.state.snapshot().phase == SessionPhase::LoggedOut {
            return Ok(());
        }
        self.teardown_locked(&mut active, None).await?;
        Ok(())
    }

    /// Hydrate history and open the channel for `session`. Caller holds the
    /// active-session lock; the slot is filled before any await so failures
    /// can route through the teardown chokepoint.
    async fn establish(&self, slot: &mut Option<ActiveSession>, session: Session) -> Result<()> {
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        let channel = Arc::new(ChatChannel::new(self.channel_config.clone()));
        *slot = Some(ActiveSession {
            session: session.clone(),
            epoch,
            channel: Arc::clone(&channel),
        });
        self.state.update(|snapshot| {
            snapshot.phase = SessionPhase::Idle;
            snapshot.session = Some(session.clone());
            snapshot.connection = ConnectionState::Disconnected;
            snapshot.messages.clear();
            snapshot.last_error = None;
        });

        // Hydrate before connecting so history always precedes live lines.
        match self.api.fetch_history(&session.token).await {
            Ok(entries) => {
                let lines: Vec<String> = entries.iter().map(HistoryEntry::display_line).collect();
                debug!(count = lines.len(), "hydrated message history");
                self.state.update(|snapshot| snapshot.messages = lines);
            }
            Err(ClientError::Unauthorized) => {
                if let Err(store_error) = self
                    .teardown_locked(slot, Some(ClientError::Unauthorized.to_string()))
                    .await
                {
                    warn!("credential clear during forced logout failed: {store_error}");
                }
                return Err(ClientError::Unauthorized.into());
            }
            Err(error) => {
                warn!("history hydration failed, starting with an empty log: {error}");
                self.state
                    .update(|snapshot| snapshot.last_error = Some(error.to_string()));
            }
        }

        self.state
            .update(|snapshot| snapshot.connection = ConnectionState::Connecting);
        let events = match self.open_channel(&channel, &session.token).await {
            Ok(events) => events,
            Err(error) => {
                if let Err(store_error) =
                    self.teardown_locked(slot, Some(error.to_string())).await
                {
                    warn!("credential clear during forced logout failed: {store_error}");
                }
                return Err(error.into());
            }
        };
        self.state.update(|snapshot| {
            snapshot.phase = SessionPhase::Live;
            snapshot.connection = ConnectionState::Connected;
        });
        self.spawn_event_pump(epoch, events);
        Ok(())
    }

    async fn open_channel(
        &self,
        channel: &ChatChannel,
        token: &str,
    ) -> wirechat_client::Result<mpsc::UnboundedReceiver<ChannelEvent>> {
        let url = channel_url(&self.ws_base, token)?;
        channel.connect(&url).await
    }

    /// Drain one connect attempt's events. The epoch fences both appends
    /// and the closure-triggered teardown against newer sessions.
    fn spawn_event_pump(&self, epoch: u64, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ChannelEvent::Line(line) => controller.append_line(epoch, line).await,
                    ChannelEvent::Closed => {
                        controller
                            .force_logout(epoch, "realtime connection closed")
                            .await;
                        break;
                    }
                }
            }
        });
    }

    async fn append_line(&self, epoch: u64, line: String) {
        let active = self.active.lock().await;
        if active.as_ref().map(|entry| entry.epoch) != Some(epoch) {
            debug!("dropping line from a stale channel");
            return;
        }
        self.state.update(|snapshot| snapshot.messages.push(line));
    }

    /// Forced-logout chokepoint for async failure paths. No-ops unless
    /// `epoch` still owns the active session, so concurrent unauthorized
    /// responses and channel closures tear down exactly once.
    async fn force_logout(&self, epoch: u64, reason: &str) {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|entry| entry.epoch) != Some(epoch) {
            return;
        }
        info!("forcing logout: {reason}");
        if let Err(error) = self
            .teardown_locked(&mut active, Some(reason.to_owned()))
            .await
        {
            warn!("credential clear during forced logout failed: {error}");
        }
    }

    /// The single teardown path. All three effects happen together and the
    /// result is published as one snapshot, so observers never see a
    /// half-logged-out session.
    async fn teardown_locked(
        &self,
        slot: &mut Option<ActiveSession>,
        reason: Option<String>,
    ) -> std::result::Result<(), StoreError> {
        if let Some(entry) = slot.take() {
            if let Err(error) = entry.channel.close().await {
                debug!("channel close during teardown: {error}");
            }
        }
        let cleared = self.store.clear();
        self.state.update(|snapshot| {
            snapshot.phase = SessionPhase::LoggedOut;
            snapshot.session = None;
            snapshot.connection = ConnectionState::Disconnected;
            snapshot.messages.clear();
            snapshot.last_error = reason;
        });
        cleared
    }
}

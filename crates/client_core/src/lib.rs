//! Synchronization core for the direct-messaging client.
//!
//! Owns the authenticated session, the cached view state (friend list,
//! selected conversation, thread, pending-request badge) and the
//! reconciliation rules that decide, for every inbound push event, between
//! an incremental thread append and a full server reload. The view state is
//! only ever a cache of server truth: after any mutation it is refreshed by
//! a full reload rather than patched, so unread counts cannot drift.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use shared::{
    domain::{RequestId, UserId},
    protocol::{Friend, FriendRequest, Message, PushEvent, Session, UserMatch},
};

mod api;
pub mod push;
mod session_store;

pub use api::Api;
pub use push::{ChannelState, RECONNECT_DELAY};
pub use session_store::{DurableSessionStore, SessionStore};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const PASSWORD_MIN_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure; the caller should tell the user to retry.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The server answered but reported `success: false`; the reason string
    /// is meant for inline display.
    #[error("{0}")]
    Domain(String),
    /// Rejected client-side before any network attempt.
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not logged in")]
    NoSession,
}

/// Notifications for the UI layer. Rendering is entirely the subscriber's
/// concern; the core never touches presentation.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    FriendsUpdated(Vec<Friend>),
    RequestBadgeUpdated(usize),
    /// The displayed thread was replaced wholesale (conversation switch,
    /// or cleared when the open conversation disappears).
    ThreadReplaced(Vec<Message>),
    /// One live message appended to the open thread.
    ThreadAppended(Message),
    ChannelState(ChannelState),
    Error(String),
}

#[derive(Default)]
struct ViewState {
    session: Option<Session>,
    session_active: bool,
    friends: Vec<Friend>,
    selected: Option<Friend>,
    thread: Vec<Message>,
    pending_requests: usize,
    channel_state: Option<ChannelState>,
}

pub struct ChatClient {
    api: Api,
    session_store: Arc<dyn SessionStore>,
    inner: Mutex<ViewState>,
    events: broadcast::Sender<ClientEvent>,
    push_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_delay: Duration,
}

impl ChatClient {
    pub fn new(server_url: impl Into<String>, session_store: Arc<dyn SessionStore>) -> Arc<Self> {
        Self::new_with_reconnect_delay(server_url, session_store, RECONNECT_DELAY)
    }

    /// Same as [`ChatClient::new`] with the reconnect delay overridden;
    /// production code keeps the default fixed delay.
    pub fn new_with_reconnect_delay(
        server_url: impl Into<String>,
        session_store: Arc<dyn SessionStore>,
        reconnect_delay: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api: Api::new(server_url),
            session_store,
            inner: Mutex::new(ViewState::default()),
            events,
            push_task: Mutex::new(None),
            reconnect_delay,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    // --- session lifecycle -------------------------------------------------

    /// Picks up a persisted session, if any, and brings the client online
    /// with it: initial friend/request loads plus the push channel. The
    /// record is trusted without validation; a stale session surfaces as
    /// ordinary request failures later.
    pub async fn restore_session(self: &Arc<Self>) -> Result<Option<Session>, ClientError> {
        let restored = self
            .session_store
            .restore()
            .await
            .map_err(|err| ClientError::Storage(err.to_string()))?;
        let Some(session) = restored else {
            return Ok(None);
        };

        info!(user_id = %session.user_id, "restored persisted session");
        self.establish(session.clone()).await;
        Ok(Some(session))
    }

    pub async fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<Session, ClientError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "username and password are required".into(),
            ));
        }

        let session = self.api.login(username, password).await?;
        self.persist_and_establish(session.clone()).await?;
        Ok(session)
    }

    pub async fn register(
        self: &Arc<Self>,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Session, ClientError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() || confirm_password.is_empty() {
            return Err(ClientError::Validation("all fields are required".into()));
        }
        if password != confirm_password {
            return Err(ClientError::Validation("passwords do not match".into()));
        }
        if password.len() < PASSWORD_MIN_LEN {
            return Err(ClientError::Validation(format!(
                "password must be at least {PASSWORD_MIN_LEN} characters"
            )));
        }

        // The register response carries no identity; sign in with the fresh
        // credentials to establish the session.
        self.api.register(username, password).await?;
        let session = self.api.login(username, password).await?;
        self.persist_and_establish(session.clone()).await?;
        Ok(session)
    }

    /// Tears down the session: erases the persisted record, cancels the
    /// push channel task (including any pending reconnect timer) and drops
    /// all cached view state.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session_store
            .clear()
            .await
            .map_err(|err| ClientError::Storage(err.to_string()))?;

        {
            let mut guard = self.inner.lock().await;
            guard.session = None;
            guard.session_active = false;
            guard.friends.clear();
            guard.selected = None;
            guard.thread.clear();
            guard.pending_requests = 0;
            guard.channel_state = Some(ChannelState::Disconnected);
        }

        if let Some(task) = self.push_task.lock().await.take() {
            task.abort();
        }
        let _ = self.events.send(ClientEvent::ChannelState(ChannelState::Disconnected));
        Ok(())
    }

    async fn persist_and_establish(self: &Arc<Self>, session: Session) -> Result<(), ClientError> {
        self.session_store
            .save(&session)
            .await
            .map_err(|err| ClientError::Storage(err.to_string()))?;
        self.establish(session).await;
        Ok(())
    }

    /// Brings a fresh session online: resets view state, runs the initial
    /// friend and request loads, then opens the push channel. Failures of
    /// the initial loads degrade to [`ClientEvent::Error`] — the session
    /// itself stays established.
    async fn establish(self: &Arc<Self>, session: Session) {
        let user_id = session.user_id;
        {
            let mut guard = self.inner.lock().await;
            guard.session = Some(session);
            guard.session_active = true;
            guard.friends.clear();
            guard.selected = None;
            guard.thread.clear();
            guard.pending_requests = 0;
        }

        if let Err(err) = self.refresh_friends().await {
            self.report(format!("failed to load friends: {err}"));
        }
        if let Err(err) = self.refresh_request_badge().await {
            self.report(format!("failed to load friend requests: {err}"));
        }

        self.spawn_push_channel(user_id).await;
    }

    async fn spawn_push_channel(self: &Arc<Self>, user_id: UserId) {
        let ws_url = match push::push_channel_url(self.api.base_url(), user_id) {
            Ok(url) => url,
            Err(err) => {
                self.report(format!("push channel unavailable: {err}"));
                return;
            }
        };

        let mut guard = self.push_task.lock().await;
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        let client = Arc::clone(self);
        *guard = Some(tokio::spawn(push::run_push_channel(client, ws_url)));
    }

    pub async fn session(&self) -> Result<Session, ClientError> {
        self.inner
            .lock()
            .await
            .session
            .clone()
            .ok_or(ClientError::NoSession)
    }

    pub(crate) async fn session_active(&self) -> bool {
        self.inner.lock().await.session_active
    }

    pub(crate) async fn set_channel_state(&self, state: ChannelState) {
        {
            let mut guard = self.inner.lock().await;
            if guard.channel_state == Some(state) {
                return;
            }
            guard.channel_state = Some(state);
        }
        let _ = self.events.send(ClientEvent::ChannelState(state));
    }

    // --- view state snapshots ---------------------------------------------

    pub async fn friends(&self) -> Vec<Friend> {
        self.inner.lock().await.friends.clone()
    }

    pub async fn selected_friend(&self) -> Option<Friend> {
        self.inner.lock().await.selected.clone()
    }

    pub async fn thread(&self) -> Vec<Message> {
        self.inner.lock().await.thread.clone()
    }

    pub async fn pending_request_count(&self) -> usize {
        self.inner.lock().await.pending_requests
    }

    // --- data access + reconciliation -------------------------------------

    /// Full friend-list reload. Concurrent reloads are not sequenced; the
    /// response that lands last wins, which callers must tolerate.
    pub async fn refresh_friends(&self) -> Result<Vec<Friend>, ClientError> {
        let session = self.session().await?;
        let friends = self.api.list_friends(session.user_id).await?;
        {
            let mut guard = self.inner.lock().await;
            guard.friends = friends.clone();
        }
        let _ = self.events.send(ClientEvent::FriendsUpdated(friends.clone()));
        Ok(friends)
    }

    /// Refreshes only the pending-request count backing the badge.
    pub async fn refresh_request_badge(&self) -> Result<usize, ClientError> {
        let session = self.session().await?;
        let requests = self.api.list_friend_requests(session.user_id).await?;
        let count = requests.len();
        {
            let mut guard = self.inner.lock().await;
            guard.pending_requests = count;
        }
        let _ = self.events.send(ClientEvent::RequestBadgeUpdated(count));
        Ok(count)
    }

    /// Switches the open conversation: reloads the full history for
    /// `friend` (replacing the thread — nothing from the previous friend
    /// survives), then reloads the friend list, because loading the thread
    /// marks it read server-side and the unread count just dropped.
    pub async fn select_conversation(&self, friend: Friend) -> Result<(), ClientError> {
        let session = self.session().await?;
        {
            let mut guard = self.inner.lock().await;
            guard.selected = Some(friend.clone());
        }

        let messages = self.api.list_messages(friend.id, session.user_id).await?;
        {
            let mut guard = self.inner.lock().await;
            guard.thread = messages.clone();
        }
        let _ = self.events.send(ClientEvent::ThreadReplaced(messages));

        self.refresh_friends().await?;
        Ok(())
    }

    /// Sends `text` to the currently selected friend and appends the
    /// server's echo to the thread. Empty text is rejected before any
    /// network attempt.
    pub async fn send_message(&self, text: &str) -> Result<Message, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::Validation("message must not be empty".into()));
        }
        let session = self.session().await?;
        let recipient = self
            .selected_friend()
            .await
            .ok_or_else(|| ClientError::Validation("no conversation selected".into()))?;

        let message = self
            .api
            .send_message(session.user_id, recipient.id, text)
            .await?;
        {
            let mut guard = self.inner.lock().await;
            guard.thread.push(message.clone());
        }
        let _ = self.events.send(ClientEvent::ThreadAppended(message.clone()));
        Ok(message)
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserMatch>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.session().await?;
        self.api.search_users(query, session.user_id).await
    }

    pub async fn send_friend_request(&self, username: &str) -> Result<(), ClientError> {
        let session = self.session().await?;
        self.api
            .send_friend_request(session.user_id, username)
            .await
    }

    pub async fn list_friend_requests(&self) -> Result<Vec<FriendRequest>, ClientError> {
        let session = self.session().await?;
        self.api.list_friend_requests(session.user_id).await
    }

    /// Accepting is idempotent from this side: the server is the authority
    /// on the request's state. On success both the badge and the friend
    /// list are reloaded (a new friend just appeared).
    pub async fn accept_friend_request(&self, request_id: RequestId) -> Result<(), ClientError> {
        self.api.accept_friend_request(request_id).await?;
        self.refresh_request_badge().await?;
        self.refresh_friends().await?;
        Ok(())
    }

    pub async fn reject_friend_request(&self, request_id: RequestId) -> Result<(), ClientError> {
        self.api.reject_friend_request(request_id).await?;
        self.refresh_request_badge().await?;
        Ok(())
    }

    pub async fn remove_friend(&self, friend_id: UserId) -> Result<(), ClientError> {
        let session = self.session().await?;
        self.api.remove_friend(friend_id, session.user_id).await?;
        self.clear_selection_if(friend_id).await;
        self.refresh_friends().await?;
        Ok(())
    }

    /// Routes one inbound push event. Never returns an error: reload
    /// failures degrade to [`ClientEvent::Error`] so the channel task
    /// stays alive.
    pub async fn handle_push_event(&self, event: PushEvent) {
        match event {
            PushEvent::Message(message) => {
                let appended = {
                    let mut guard = self.inner.lock().await;
                    match &guard.selected {
                        Some(selected) if selected.id == message.sender_id => {
                            guard.thread.push(message.clone());
                            true
                        }
                        _ => false,
                    }
                };
                if appended {
                    let _ = self.events.send(ClientEvent::ThreadAppended(message));
                }
                // Unread counts are server truth; reload the list whether or
                // not the message hit the open conversation.
                if let Err(err) = self.refresh_friends().await {
                    self.report(format!("friend list refresh failed: {err}"));
                }
            }
            PushEvent::FriendRequest(_) => {
                if let Err(err) = self.refresh_request_badge().await {
                    self.report(format!("request badge refresh failed: {err}"));
                }
            }
            PushEvent::FriendAccepted(_) => {
                if let Err(err) = self.refresh_friends().await {
                    self.report(format!("friend list refresh failed: {err}"));
                }
            }
            PushEvent::FriendRemoved(notice) => {
                self.clear_selection_if(notice.user_id).await;
                if let Err(err) = self.refresh_friends().await {
                    self.report(format!("friend list refresh failed: {err}"));
                }
            }
        }
    }

    async fn clear_selection_if(&self, friend_id: UserId) {
        let cleared = {
            let mut guard = self.inner.lock().await;
            match &guard.selected {
                Some(selected) if selected.id == friend_id => {
                    guard.selected = None;
                    guard.thread.clear();
                    true
                }
                _ => false,
            }
        };
        if cleared {
            let _ = self.events.send(ClientEvent::ThreadReplaced(Vec::new()));
        }
    }

    fn report(&self, message: String) {
        warn!("{message}");
        let _ = self.events.send(ClientEvent::Error(message));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

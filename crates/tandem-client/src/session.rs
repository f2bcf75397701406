//! What a signed-in user sees, and how server events change it.
//!
//! [`SessionState`] is plain data plus the reconciliation rules; it never
//! touches the network. [`Session`] wires it to the HTTP client and the
//! socket.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use tandem_shared::models::{Message, UserProfile, UserSummary};
use tandem_shared::protocol::ServerEvent;
use tandem_shared::types::{MessageId, UserId};

use crate::api::ApiClient;
use crate::error::{ClientError, Result};
use crate::realtime::RealtimeConnection;

/// Something worth showing the user once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    FriendRequest(UserSummary),
    FriendRequestAccepted(UserSummary),
}

impl Notification {
    pub fn text(&self) -> String {
        match self {
            Notification::FriendRequest(from) => {
                format!("{} sent you a friend request!", from.full_name)
            }
            Notification::FriendRequestAccepted(from) => {
                format!("{} accepted your friend request!", from.full_name)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub me: Option<UserProfile>,
    pub online_users: Vec<UserId>,
    pub friends: Vec<UserProfile>,
    /// Sparse: friends with nothing unseen are absent.
    pub unseen: HashMap<UserId, u32>,
    pub pending_request_count: usize,
    pub open_conversation: Option<UserId>,
    /// Messages of the open conversation, oldest first.
    pub messages: Vec<Message>,
    pub notifications: VecDeque<Notification>,
    /// Set when the friend list is known to be out of date.
    pub sidebar_stale: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `event` into the state. Returns the id of a message that
    /// arrived from the open friend and is now on screen, which the server
    /// should be told was seen.
    pub fn apply_event(&mut self, event: ServerEvent) -> Option<MessageId> {
        match event {
            ServerEvent::OnlineUsers(users) => self.online_users = users,
            ServerEvent::NewMessage(message) => {
                if !self.belongs_to_open(&message) {
                    *self.unseen.entry(message.sender_id).or_insert(0) += 1;
                    return None;
                }
                let id = message.id;
                let incoming = self.open_conversation == Some(message.sender_id);
                if self.push_unique(message) && incoming {
                    return Some(id);
                }
            }
            ServerEvent::FriendRequest { from } => {
                self.pending_request_count += 1;
                self.notifications.push_back(Notification::FriendRequest(from));
            }
            ServerEvent::FriendRequestAccepted { from } => {
                self.notifications
                    .push_back(Notification::FriendRequestAccepted(from));
                self.sidebar_stale = true;
            }
        }
        None
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.online_users.contains(&user)
    }

    pub fn load_sidebar(&mut self, friends: Vec<UserProfile>, unseen: HashMap<UserId, u32>) {
        self.friends = friends;
        self.unseen = unseen;
        self.unseen.retain(|_, count| *count > 0);
        self.sidebar_stale = false;
    }

    /// Switch to `friend`'s conversation. History entries that are not
    /// between the two of us are dropped.
    pub fn open_conversation(&mut self, friend: UserId, history: Vec<Message>) {
        self.open_conversation = Some(friend);
        self.unseen.remove(&friend);
        let me = self.me.as_ref().map(|p| p.id);
        let total = history.len();
        self.messages = history
            .into_iter()
            .filter(|m| match me {
                Some(me) => m.is_between(me, friend),
                None => m.sender_id == friend || m.receiver_id == friend,
            })
            .collect();
        if self.messages.len() != total {
            debug!(
                dropped = total - self.messages.len(),
                "Dropped history entries outside the conversation"
            );
        }
    }

    /// Record a message the server accepted from us.
    pub fn confirm_sent(&mut self, message: Message) {
        if self.belongs_to_open(&message) {
            self.push_unique(message);
        }
    }

    pub fn close_conversation(&mut self) {
        self.open_conversation = None;
        self.messages.clear();
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn belongs_to_open(&self, message: &Message) -> bool {
        match self.open_conversation {
            Some(friend) => message.sender_id == friend || message.receiver_id == friend,
            None => false,
        }
    }

    fn push_unique(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// A signed-in user: HTTP client, optional live socket, and local state.
pub struct Session {
    api: ApiClient,
    socket: Option<RealtimeConnection>,
    state: SessionState,
}

impl Session {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiClient::new(base_url),
            socket: None,
            state: SessionState::new(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub async fn log_in(&mut self, email: &str, password: &str) -> Result<UserProfile> {
        let profile = self.api.log_in(email, password).await?;
        self.state.me = Some(profile.clone());
        self.state.pending_request_count = self.api.pending_requests().await?.len();
        Ok(profile)
    }

    /// Open the realtime socket. Replaces any earlier one.
    pub async fn connect(&mut self) -> Result<()> {
        let url = self.api.socket_url()?;
        let socket = RealtimeConnection::connect(&url).await?;
        if let Some(old) = self.socket.replace(socket) {
            old.close().await;
        }
        Ok(())
    }

    pub async fn refresh_sidebar(&mut self) -> Result<()> {
        let (friends, unseen) = self.api.sidebar().await?;
        self.state.load_sidebar(friends, unseen);
        Ok(())
    }

    pub async fn open_conversation(&mut self, friend: UserId) -> Result<()> {
        let history = self.api.conversation(friend).await?;
        self.state.open_conversation(friend, history);
        Ok(())
    }

    /// Send `text` to the open conversation.
    pub async fn send_text(&mut self, text: &str) -> Result<Message> {
        let friend = self
            .state
            .open_conversation
            .ok_or_else(|| ClientError::Rejected("No conversation is open".to_string()))?;
        let message = self
            .api
            .send_message(friend, Some(text.to_string()), None)
            .await?;
        self.state.confirm_sent(message.clone());
        Ok(message)
    }

    /// Wait for the next server event and apply it. `None` when there is
    /// no socket or it has closed.
    ///
    /// A message shown in the open conversation is marked seen on the
    /// server right away, so the next sidebar refresh agrees with the
    /// screen.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        let event = self.socket.as_mut()?.next_event().await?;
        if let Some(id) = self.state.apply_event(event.clone()) {
            if let Err(e) = self.api.mark_seen(id).await {
                warn!(message = %id, error = %e, "Failed to mark message seen");
            }
        }
        Some(event)
    }

    pub async fn log_out(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close().await;
        }
        self.api.clear_token();
        self.state.reset();
    }
}

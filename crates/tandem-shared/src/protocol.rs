use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{Message, UserSummary};
use crate::types::UserId;

/// Every event the server pushes over the realtime channel.
///
/// Encoded as a JSON text frame `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full set of currently connected users, sent to everyone.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<UserId>),

    /// Someone sent the recipient a friend request.
    #[serde(rename = "friendRequest")]
    FriendRequest { from: UserSummary },

    /// The recipient's earlier request was accepted by `from`.
    #[serde(rename = "friendRequestAccepted")]
    FriendRequestAccepted { from: UserSummary },

    /// A direct message addressed to the recipient.
    #[serde(rename = "newMessage")]
    NewMessage(Message),
}

impl ServerEvent {
    /// Wire name of the event, also used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OnlineUsers(_) => "getOnlineUsers",
            Self::FriendRequest { .. } => "friendRequest",
            Self::FriendRequestAccepted { .. } => "friendRequestAccepted",
            Self::NewMessage(_) => "newMessage",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

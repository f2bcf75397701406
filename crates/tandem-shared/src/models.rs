//! Domain records exchanged between server and client.
//!
//! Field names are camelCase on the wire so web clients can consume them
//! unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{MessageId, RequestId, RequestStatus, UserId};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Public view of an account. The password credential never leaves the
/// store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub bio: String,
    /// Opaque avatar reference (usually a URL).
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// The minimal identity carried inside friend-request notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub full_name: String,
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Friend requests
// ---------------------------------------------------------------------------

/// An entry in a user's `friendRequests` collection (requests received).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedRequest {
    pub id: RequestId,
    pub from: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// An entry in a user's `sentRequests` collection. Shares its id with the
/// mirrored [`ReceivedRequest`] held by the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SentRequest {
    pub id: RequestId,
    pub to: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Body of a direct message. At least one part is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawContent", into = "RawContent")]
pub enum MessageContent {
    Text(String),
    Image(String),
    TextWithImage { text: String, image: String },
}

impl MessageContent {
    /// Build content from optional parts. Blank text counts as absent.
    pub fn new(text: Option<String>, image: Option<String>) -> Result<Self, ProtocolError> {
        let text = text.filter(|t| !t.trim().is_empty());
        let image = image.filter(|i| !i.trim().is_empty());
        match (text, image) {
            (Some(text), Some(image)) => Ok(Self::TextWithImage { text, image }),
            (Some(text), None) => Ok(Self::Text(text)),
            (None, Some(image)) => Ok(Self::Image(image)),
            (None, None) => Err(ProtocolError::EmptyContent),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::TextWithImage { text, .. } => Some(text),
            Self::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            Self::Image(image) | Self::TextWithImage { image, .. } => Some(image),
            Self::Text(_) => None,
        }
    }
}

/// Flat `{text, image}` shape used on the wire and in storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

impl TryFrom<RawContent> for MessageContent {
    type Error = ProtocolError;

    fn try_from(raw: RawContent) -> Result<Self, Self::Error> {
        MessageContent::new(raw.text, raw.image)
    }
}

impl From<MessageContent> for RawContent {
    fn from(content: MessageContent) -> Self {
        match content {
            MessageContent::Text(text) => RawContent {
                text: Some(text),
                image: None,
            },
            MessageContent::Image(image) => RawContent {
                text: None,
                image: Some(image),
            },
            MessageContent::TextWithImage { text, image } => RawContent {
                text: Some(text),
                image: Some(image),
            },
        }
    }
}

/// A persisted direct message. Only `seen` ever changes after creation,
/// and only from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(flatten)]
    pub content: MessageContent,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this message was exchanged between `a` and `b`, either way.
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_counts_as_absent() {
        assert!(matches!(
            MessageContent::new(Some("   ".into()), None),
            Err(ProtocolError::EmptyContent)
        ));
        assert_eq!(
            MessageContent::new(Some(" ".into()), Some("https://img/1.png".into())).unwrap(),
            MessageContent::Image("https://img/1.png".into())
        );
    }

    #[test]
    fn test_message_wire_shape_is_flat() {
        let msg = Message {
            id: MessageId::new(),
            sender_id: UserId::new(),
            receiver_id: UserId::new(),
            content: MessageContent::Text("hi".into()),
            seen: false,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["text"], "hi");
        assert!(value.get("image").is_none());
        assert_eq!(value["seen"], false);
        assert!(value.get("senderId").is_some());

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_message_without_content_is_rejected() {
        let json = serde_json::json!({
            "id": MessageId::new(),
            "senderId": UserId::new(),
            "receiverId": UserId::new(),
            "seen": false,
            "createdAt": Utc::now(),
        });
        assert!(serde_json::from_value::<Message>(json).is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public profile of a user, without the graph sets.
/// This is what gets expanded into messages and connection listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub username: String,
    pub bio: String,
    pub profile_picture: String,
    pub cover_photo: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

/// A user document together with its follow/connection sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A direct message as stored. Only `seen` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub text: Option<String>,
    pub message_type: MessageType,
    /// Present iff `message_type` is `Image`.
    pub media_url: Option<String>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

/// A user reference that is either a bare id or the expanded profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Profile(Box<UserProfile>),
    Id(String),
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Profile(profile) => &profile.id,
            Self::Id(id) => id,
        }
    }

    fn resolve(id: String, profile: Option<UserProfile>) -> Self {
        match profile {
            Some(profile) => Self::Profile(Box::new(profile)),
            None => Self::Id(id),
        }
    }
}

/// A message with its sender and/or recipient ids expanded into profiles.
/// Field names match [`Message`] so clients can treat both the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMessage {
    pub id: String,
    pub from_user_id: UserRef,
    pub to_user_id: UserRef,
    pub text: Option<String>,
    pub message_type: MessageType,
    pub media_url: Option<String>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

impl EnrichedMessage {
    /// Expand whichever profiles are given; a missing profile leaves the bare id.
    pub fn new(message: Message, from: Option<UserProfile>, to: Option<UserProfile>) -> Self {
        Self {
            id: message.id,
            from_user_id: UserRef::resolve(message.from_user_id, from),
            to_user_id: UserRef::resolve(message.to_user_id, to),
            text: message.text,
            message_type: message.message_type,
            media_url: message.media_url,
            seen: message.seen,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
}

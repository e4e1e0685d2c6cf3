use serde::{Deserialize, Serialize};

use crate::models::{EnrichedMessage, Message, User, UserProfile};

// -- Identity --

/// Claims carried by bearer tokens from the identity provider.
/// `sub` is the stable user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Envelope --

/// Every response is `{success, message?, ...data}`. Failures travel inside the
/// envelope rather than as HTTP status codes.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

/// Placeholder payload for envelopes with no data fields.
#[derive(Debug, Default, Serialize)]
pub struct Empty {}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<Empty> {
    pub fn done(message: impl Into<String>) -> Self {
        Self::ok(Empty {}).with_message(message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: Empty {},
        }
    }
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub to_user_id: String,
}

/// Payload of a successful send: the stored message under `message`.
#[derive(Debug, Serialize)]
pub struct SentMessage {
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct ChatMessages {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct RecentMessages {
    pub messages: Vec<EnrichedMessage>,
}

// -- Users --

/// Body of follow/unfollow/connect/accept: the other user's id.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetRequest {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoverRequest {
    pub input: String,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct DiscoveredUsers {
    pub users: Vec<UserProfile>,
}

#[derive(Debug, Serialize)]
pub struct UserConnections {
    pub connections: Vec<UserProfile>,
    pub followers: Vec<UserProfile>,
    pub following: Vec<UserProfile>,
    pub pending_connections: Vec<UserProfile>,
}

// -- Identity sync --

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

/// User record as delivered by the identity provider's webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl IdentityUser {
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses.first().map(|e| e.email_address.as_str())
    }

    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedIdentity {
    pub id: String,
}

/// Lifecycle events pushed by the identity provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IdentityEvent {
    #[serde(rename = "user.created")]
    UserCreated(IdentityUser),
    #[serde(rename = "user.updated")]
    UserUpdated(IdentityUser),
    #[serde(rename = "user.deleted")]
    UserDeleted(DeletedIdentity),
}

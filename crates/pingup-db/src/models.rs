//! Database row types. These map directly to SQLite rows and stay distinct from
//! the pingup-types API models; the `into_*` conversions bridge the two.

use pingup_types::models::{ConnectionRequest, ConnectionStatus, Message, MessageType, UserProfile};
use rusqlite::Row;
use tracing::warn;

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub username: String,
    pub bio: String,
    pub profile_picture: String,
    pub cover_photo: String,
    pub location: String,
    pub created_at: String,
}

pub(crate) const USER_COLUMNS: &str =
    "id, email, full_name, username, bio, profile_picture, cover_photo, location, created_at";

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            username: row.get(3)?,
            bio: row.get(4)?,
            profile_picture: row.get(5)?,
            cover_photo: row.get(6)?,
            location: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub fn into_profile(self) -> UserProfile {
        let created_at = parse_timestamp(&self.created_at, &self.id);
        UserProfile {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            username: self.username,
            bio: self.bio,
            profile_picture: self.profile_picture,
            cover_photo: self.cover_photo,
            location: self.location,
            created_at,
        }
    }
}

pub struct MessageRow {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub text: Option<String>,
    pub message_type: String,
    pub media_url: Option<String>,
    pub seen: bool,
    pub created_at: String,
}

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, from_user_id, to_user_id, text, message_type, media_url, seen, created_at";

impl MessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_user_id: row.get(1)?,
            to_user_id: row.get(2)?,
            text: row.get(3)?,
            message_type: row.get(4)?,
            media_url: row.get(5)?,
            seen: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    pub fn into_message(self) -> Message {
        let message_type = MessageType::parse(&self.message_type).unwrap_or_else(|| {
            warn!("Corrupt message_type '{}' on message '{}'", self.message_type, self.id);
            MessageType::Text
        });
        let created_at = parse_timestamp(&self.created_at, &self.id);
        Message {
            id: self.id,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            text: self.text,
            message_type,
            media_url: self.media_url,
            seen: self.seen,
            created_at,
        }
    }
}

pub struct ConnectionRow {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: String,
    pub created_at: String,
}

pub(crate) const CONNECTION_COLUMNS: &str = "id, from_user_id, to_user_id, status, created_at";

impl ConnectionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_user_id: row.get(1)?,
            to_user_id: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn into_request(self) -> ConnectionRequest {
        let status = ConnectionStatus::parse(&self.status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on connection request '{}'", self.status, self.id);
            ConnectionStatus::Pending
        });
        let created_at = parse_timestamp(&self.created_at, &self.id);
        ConnectionRequest {
            id: self.id,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            status,
            created_at,
        }
    }
}

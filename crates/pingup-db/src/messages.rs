use crate::models::{MESSAGE_COLUMNS, MessageRow};
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pingup_types::models::MessageType;
use rusqlite::OptionalExtension;

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub from_user_id: &'a str,
    pub to_user_id: &'a str,
    pub text: Option<&'a str>,
    pub message_type: MessageType,
    pub media_url: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl Database {
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, from_user_id, to_user_id, text, message_type, media_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.from_user_id,
                    msg.to_user_id,
                    msg.text,
                    msg.message_type.as_str(),
                    msg.media_url,
                    format_timestamp(msg.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    [id],
                    MessageRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// All messages exchanged between two users, most recent first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (from_user_id = ?1 AND to_user_id = ?2)
                    OR (from_user_id = ?2 AND to_user_id = ?1)
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_a, user_b], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages addressed to a user, most recent first.
    pub fn get_messages_to(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE to_user_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark every message from `from_user_id` to `to_user_id` as seen.
    /// Returns the number of messages that flipped.
    pub fn mark_seen(&self, from_user_id: &str, to_user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET seen = 1
                 WHERE from_user_id = ?1 AND to_user_id = ?2 AND seen = 0",
                [from_user_id, to_user_id],
            )?;
            Ok(changed)
        })
    }
}

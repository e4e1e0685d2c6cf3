use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pingup_db::messages::NewMessage;
use pingup_db::models::UserRow;
use pingup_gateway::{Frame, Publisher};
use pingup_types::models::{EnrichedMessage, Message, MessageType, UserProfile};

use crate::assets::{AssetStore, MESSAGE_IMAGE_WIDTH};
use crate::error::{ApiError, ApiResult};
use crate::store::Store;

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub filename: String,
}

/// What the sender supplied. At least one of the two must be present.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub text: Option<String>,
    pub image: Option<ImageUpload>,
}

/// Persists direct messages and forwards them to recipients' live streams.
#[derive(Clone)]
pub struct DeliveryService {
    store: Store,
    assets: Arc<AssetStore>,
    publisher: Arc<dyn Publisher>,
}

impl DeliveryService {
    pub fn new(store: Store, assets: Arc<AssetStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            store,
            assets,
            publisher,
        }
    }

    /// Store the message and return it. The live push to the recipient runs as
    /// a detached task and never affects the result.
    pub async fn send_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        outgoing: OutgoingMessage,
    ) -> ApiResult<Message> {
        let text = outgoing.text.filter(|t| !t.trim().is_empty());
        if text.is_none() && outgoing.image.is_none() {
            return Err(ApiError::validation("Message Must Contain Text Or An Image"));
        }

        let rid = recipient_id.to_string();
        if self.store.call(move |db| db.get_user_by_id(&rid)).await?.is_none() {
            return Err(ApiError::not_found("Recipient Not Found"));
        }

        // Upload first: a failed upload must leave nothing persisted.
        let (message_type, media_url) = match outgoing.image {
            Some(image) => {
                let url = self
                    .assets
                    .store_image(&image.bytes, &image.filename, MESSAGE_IMAGE_WIDTH)
                    .await?;
                (MessageType::Image, Some(url))
            }
            None => (MessageType::Text, None),
        };

        let message = Message {
            id: Uuid::new_v4().to_string(),
            from_user_id: sender_id.to_string(),
            to_user_id: recipient_id.to_string(),
            text,
            message_type,
            media_url,
            seen: false,
            created_at: Utc::now(),
        };

        let stored = message.clone();
        self.store
            .call(move |db| {
                db.insert_message(&NewMessage {
                    id: &stored.id,
                    from_user_id: &stored.from_user_id,
                    to_user_id: &stored.to_user_id,
                    text: stored.text.as_deref(),
                    message_type: stored.message_type,
                    media_url: stored.media_url.as_deref(),
                    created_at: stored.created_at,
                })
            })
            .await?;

        info!(
            "{} -> {}: {} message {}",
            sender_id,
            recipient_id,
            message.message_type.as_str(),
            message.id
        );

        self.spawn_live_push(message.id.clone(), message.to_user_id.clone());
        Ok(message)
    }

    fn spawn_live_push(&self, message_id: String, recipient_id: String) {
        let store = self.store.clone();
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            match push_to_recipient(&store, publisher.as_ref(), &message_id, &recipient_id).await {
                Ok(true) => debug!("Delivered {} live to {}", message_id, recipient_id),
                Ok(false) => debug!("{} has no live stream, {} left for later", recipient_id, message_id),
                Err(e) => warn!("Live push of {} to {} failed: {}", message_id, recipient_id, e),
            }
        });
    }

    /// Conversation between two users, most recent first. Reading marks every
    /// message from `other_id` to `user_id` as seen.
    pub async fn get_chat_messages(&self, user_id: &str, other_id: &str) -> ApiResult<Vec<Message>> {
        let (me, other) = (user_id.to_string(), other_id.to_string());
        let rows = self
            .store
            .call(move |db| {
                let rows = db.get_conversation(&me, &other)?;
                db.mark_seen(&other, &me)?;
                Ok(rows)
            })
            .await?;

        Ok(rows.into_iter().map(|row| row.into_message()).collect())
    }

    /// Messages addressed to `user_id`, most recent first, with both parties expanded.
    pub async fn get_recent_messages(&self, user_id: &str) -> ApiResult<Vec<EnrichedMessage>> {
        let me = user_id.to_string();
        let (rows, users) = self
            .store
            .call(move |db| {
                let rows = db.get_messages_to(&me)?;
                let ids: HashSet<&str> = rows
                    .iter()
                    .flat_map(|r| [r.from_user_id.as_str(), r.to_user_id.as_str()])
                    .collect();
                let ids: Vec<String> = ids.into_iter().map(str::to_string).collect();
                let users = db.get_users_by_ids(&ids)?;
                Ok((rows, users))
            })
            .await?;

        let profiles: HashMap<String, UserProfile> = users
            .into_iter()
            .map(UserRow::into_profile)
            .map(|p| (p.id.clone(), p))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let message = row.into_message();
                let from = profiles.get(&message.from_user_id).cloned();
                let to = profiles.get(&message.to_user_id).cloned();
                EnrichedMessage::new(message, from, to)
            })
            .collect())
    }
}

/// Re-read the message with its sender expanded and hand it to the
/// recipient's stream, if one is open.
async fn push_to_recipient(
    store: &Store,
    publisher: &dyn Publisher,
    message_id: &str,
    recipient_id: &str,
) -> ApiResult<bool> {
    let id = message_id.to_string();
    let enriched = store
        .call(move |db| {
            let message = db
                .get_message(&id)?
                .ok_or_else(|| anyhow!("Message {} vanished before delivery", id))?
                .into_message();
            let sender = db.get_user_by_id(&message.from_user_id)?.map(UserRow::into_profile);
            Ok(EnrichedMessage::new(message, sender, None))
        })
        .await?;

    let frame = Frame::data(&enriched).map_err(|e| ApiError::Upstream(e.into()))?;
    Ok(publisher.publish(recipient_id, frame))
}

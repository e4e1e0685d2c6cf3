use axum::{
    Extension, Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use pingup_gateway::stream;
use pingup_types::api::{ApiResponse, ChatMessages, ChatRequest, RecentMessages, SentMessage};

use crate::auth::AppState;
use crate::delivery::{ImageUpload, OutgoingMessage};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{CurrentUser, bearer_token};

/// Per-file upload limit.
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Browsers' EventSource cannot set headers, so the token may come here.
    pub token: Option<String>,
}

/// GET /api/message/{user_id}: the caller's live event stream.
pub async fn stream_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = bearer_token(&headers)
        .or(query.token.as_deref())
        .ok_or(ApiError::Unauthenticated)?;
    if state.identity.resolve(token)? != user_id {
        return Err(ApiError::Unauthenticated);
    }

    let body = Body::from_stream(stream::open(&state.registry, &user_id, state.keep_alive));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response())
}

/// POST /api/message/send (multipart: `to_user_id`, `text`, optional `image`).
pub async fn send_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let mut multipart = multipart?;
    let mut to_user_id = None;
    let mut outgoing = OutgoingMessage::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "to_user_id" => to_user_id = Some(field.text().await?),
            "text" => outgoing.text = Some(field.text().await?),
            "image" => {
                let filename = field.file_name().unwrap_or("image").to_string();
                let bytes = field.bytes().await?;
                if bytes.len() > MAX_IMAGE_SIZE {
                    return Err(ApiError::validation("Image Exceeds The 5 MB Limit"));
                }
                if !bytes.is_empty() {
                    outgoing.image = Some(ImageUpload { bytes, filename });
                }
            }
            _ => {}
        }
    }

    let to_user_id = to_user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("Recipient Is Required"))?;

    let message = state.delivery.send_message(&user_id, &to_user_id, outgoing).await?;
    Ok(Json(ApiResponse::ok(SentMessage { message })))
}

/// POST /api/message/get: the conversation with `to_user_id`.
pub async fn get_chat_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let messages = state.delivery.get_chat_messages(&user_id, &req.to_user_id).await?;
    Ok(Json(ApiResponse::ok(ChatMessages { messages })))
}

/// GET /api/user/recent-messages
pub async fn get_recent_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let messages = state.delivery.get_recent_messages(&user_id).await?;
    Ok(Json(ApiResponse::ok(RecentMessages { messages })))
}

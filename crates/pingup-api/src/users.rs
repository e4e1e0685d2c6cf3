use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartRejection, rejection::JsonRejection},
    response::IntoResponse,
};
use tracing::info;

use pingup_db::Database;
use pingup_db::models::UserRow;
use pingup_db::queries::{ProfileUpdate, UserSet};
use pingup_types::api::{
    ApiResponse, DiscoverRequest, DiscoveredUsers, TargetRequest, UserConnections, UserData,
};
use pingup_types::models::{User, UserProfile};

use crate::assets::{COVER_IMAGE_WIDTH, PROFILE_IMAGE_WIDTH};
use crate::auth::AppState;
use crate::delivery::ImageUpload;
use crate::error::{ApiError, ApiResult};
use crate::messages::MAX_IMAGE_SIZE;
use crate::middleware::CurrentUser;

/// Load a user together with its three id sets.
pub fn load_user(db: &Database, id: &str) -> anyhow::Result<Option<User>> {
    let Some(row) = db.get_user_by_id(id)? else {
        return Ok(None);
    };
    Ok(Some(User {
        profile: row.into_profile(),
        followers: db.get_user_set(id, UserSet::Followers)?,
        following: db.get_user_set(id, UserSet::Following)?,
        connections: db.get_user_set(id, UserSet::Connections)?,
    }))
}

/// Expand ids into profiles, keeping the order of `ids` and skipping unknowns.
fn expand(db: &Database, ids: &[String]) -> anyhow::Result<Vec<UserProfile>> {
    let mut by_id: HashMap<String, UserProfile> = db
        .get_users_by_ids(ids)?
        .into_iter()
        .map(UserRow::into_profile)
        .map(|p| (p.id.clone(), p))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// GET /api/user/data
pub async fn get_user_data(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .store
        .call(move |db| load_user(db, &user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User Not Found"))?;
    Ok(Json(ApiResponse::ok(UserData { user })))
}

/// POST /api/user/update (multipart: `username`, `bio`, `location`,
/// `full_name`, optional `profile` and `cover` images).
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let mut multipart = multipart?;
    let mut update = ProfileUpdate::default();
    let mut profile_image = None;
    let mut cover_image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "username" => update.username = non_empty(field.text().await?),
            "bio" => update.bio = Some(field.text().await?),
            "location" => update.location = Some(field.text().await?),
            "full_name" => update.full_name = non_empty(field.text().await?),
            "profile" | "cover" => {
                let filename = field.file_name().unwrap_or("image").to_string();
                let bytes = field.bytes().await?;
                if bytes.len() > MAX_IMAGE_SIZE {
                    return Err(ApiError::validation("Image Exceeds The 5 MB Limit"));
                }
                if !bytes.is_empty() {
                    let upload = Some(ImageUpload { bytes, filename });
                    if name == "profile" {
                        profile_image = upload;
                    } else {
                        cover_image = upload;
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(image) = profile_image {
        let url = state
            .assets
            .store_image(&image.bytes, &image.filename, PROFILE_IMAGE_WIDTH)
            .await?;
        update.profile_picture = Some(url);
    }
    if let Some(image) = cover_image {
        let url = state
            .assets
            .store_image(&image.bytes, &image.filename, COVER_IMAGE_WIDTH)
            .await?;
        update.cover_photo = Some(url);
    }

    // A username someone else holds is quietly left unchanged.
    let user = state
        .store
        .call(move |db| {
            db.update_profile(&user_id, &update)?;
            load_user(db, &user_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User Not Found"))?;

    info!("{} updated their profile", user.profile.id);
    Ok(Json(ApiResponse::ok(UserData { user }).with_message("Profile Updated Successfully")))
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// POST /api/user/discover
pub async fn discover_users(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<DiscoverRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let input = req.input.trim().to_string();
    let users = state
        .store
        .call(move |db| db.search_users(&input, &user_id))
        .await?
        .into_iter()
        .map(UserRow::into_profile)
        .collect();
    Ok(Json(ApiResponse::ok(DiscoveredUsers { users })))
}

/// POST /api/user/follow
pub async fn follow_user(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    state.connections.follow(&user_id, &req.id).await?;
    Ok(Json(ApiResponse::done("Now You Are Following This User")))
}

/// POST /api/user/unfollow
pub async fn unfollow_user(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    state.connections.unfollow(&user_id, &req.id).await?;
    Ok(Json(ApiResponse::done("You Are No Longer Following This User")))
}

/// POST /api/user/connect
pub async fn send_connection_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    state.connections.send_request(&user_id, &req.id).await?;
    Ok(Json(ApiResponse::done("Connection Request Sent Successfully")))
}

/// POST /api/user/accept
pub async fn accept_connection_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    state.connections.accept_request(&user_id, &req.id).await?;
    Ok(Json(ApiResponse::done("Connection Accepted Successfully")))
}

/// GET /api/user/connections
pub async fn get_user_connections(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let listing = state
        .store
        .call(move |db| {
            let Some(user) = load_user(db, &user_id)? else {
                return Ok(None);
            };
            let pending: Vec<String> = db
                .pending_requests_to(&user_id)?
                .into_iter()
                .map(|r| r.from_user_id)
                .collect();
            Ok(Some(UserConnections {
                connections: expand(db, &user.connections)?,
                followers: expand(db, &user.followers)?,
                following: expand(db, &user.following)?,
                pending_connections: expand(db, &pending)?,
            }))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User Not Found"))?;

    Ok(Json(ApiResponse::ok(listing)))
}

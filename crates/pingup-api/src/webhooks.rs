use anyhow::bail;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
};
use tracing::{info, warn};

use pingup_db::Database;
use pingup_db::queries::NewUser;
use pingup_types::api::{ApiResponse, IdentityEvent, IdentityUser};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::bearer_token;

/// POST /api/webhooks/identity: user lifecycle events from the identity
/// provider, authenticated with the shared webhook secret.
pub async fn identity_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<IdentityEvent>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    match bearer_token(&headers) {
        Some(token) if !state.webhook_secret.is_empty() && token == state.webhook_secret => {}
        _ => {
            warn!("Rejected identity webhook with a bad secret");
            return Err(ApiError::Unauthenticated);
        }
    }
    let Json(event) = body?;

    match event {
        IdentityEvent::UserCreated(user) => {
            let id = user.id.clone();
            state.store.call(move |db| sync_created(db, &user)).await?;
            info!("Identity sync: created {}", id);
            Ok(Json(ApiResponse::done("User Created")))
        }
        IdentityEvent::UserUpdated(user) => {
            let id = user.id.clone();
            let found = state.store.call(move |db| sync_updated(db, &user)).await?;
            if !found {
                return Err(ApiError::not_found("User Not Found"));
            }
            info!("Identity sync: updated {}", id);
            Ok(Json(ApiResponse::done("User Updated")))
        }
        IdentityEvent::UserDeleted(deleted) => {
            let id = deleted.id.clone();
            let removed = state.store.call(move |db| db.delete_user(&deleted.id)).await?;
            if removed {
                info!("Identity sync: deleted {}", id);
            }
            Ok(Json(ApiResponse::done("User Deleted")))
        }
    }
}

/// Insert a new user, or refresh the identity fields if the provider
/// redelivers the creation of one we already have.
fn sync_created(db: &Database, user: &IdentityUser) -> anyhow::Result<()> {
    if db.get_user_by_id(&user.id)?.is_some() {
        sync_updated(db, user)?;
        return Ok(());
    }

    let email = user.primary_email().unwrap_or_default().to_string();
    let username = unique_username(db, username_seed(&email, &user.id), &user.id)?;
    db.create_user(&NewUser {
        id: user.id.clone(),
        email,
        full_name: user.full_name(),
        username,
        profile_picture: user.image_url.clone().unwrap_or_default(),
    })
}

fn sync_updated(db: &Database, user: &IdentityUser) -> anyhow::Result<bool> {
    db.update_identity(
        &user.id,
        user.primary_email().unwrap_or_default(),
        &user.full_name(),
        user.image_url.as_deref().unwrap_or_default(),
    )
}

/// Local part of the email address, or the user id when there is none.
fn username_seed(email: &str, id: &str) -> String {
    match email.split('@').next() {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => id.to_string(),
    }
}

/// Random suffixes tried before falling back to the user id.
const SUFFIX_ATTEMPTS: usize = 32;

fn unique_username(db: &Database, seed: String, user_id: &str) -> anyhow::Result<String> {
    unique_username_with(db, seed, user_id, || rand::random_range(0..10000u32))
}

fn unique_username_with(
    db: &Database,
    seed: String,
    user_id: &str,
    mut suffix: impl FnMut() -> u32,
) -> anyhow::Result<String> {
    if db.get_user_by_username(&seed)?.is_none() {
        return Ok(seed);
    }
    for _ in 0..SUFFIX_ATTEMPTS {
        let candidate = format!("{}{}", seed, suffix());
        if db.get_user_by_username(&candidate)?.is_none() {
            return Ok(candidate);
        }
    }

    let fallback = format!("{}_{}", seed, user_id);
    if db.get_user_by_username(&fallback)?.is_some() {
        bail!("No free username for {}", user_id);
    }
    warn!("Username suffixes for '{}' exhausted, using {}", seed, fallback);
    Ok(fallback)
}

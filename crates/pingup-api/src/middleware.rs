use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::AppState;
use crate::error::ApiError;

/// Id of the authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the caller from the Authorization header.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let user_id = match bearer_token(req.headers()) {
        Some(token) => state.identity.resolve(token),
        None => Err(ApiError::Unauthenticated),
    };

    match user_id {
        Ok(user_id) => {
            req.extensions_mut().insert(CurrentUser(user_id));
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

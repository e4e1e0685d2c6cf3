use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use pingup_types::api::ApiResponse;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every way an operation can fail. All of them render as a
/// `{success: false, message}` envelope with HTTP 200.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not Authenticated")]
    Unauthenticated,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Connection Request Pending")]
    RequestPending,

    #[error("You Have Sent More Than 20 Connection Requests In The Last 24 Hours")]
    RateLimited,

    #[error("{0}")]
    Validation(String),

    #[error("Invalid JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error("Invalid multipart body: {0}")]
    MultipartRejected(#[from] MultipartRejection),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    /// Store or asset service failure.
    #[error("{0}")]
    Upstream(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::Validation(what.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Upstream(e) => error!("Upstream failure: {:#}", e),
            other => debug!("Request rejected: {}", other),
        }
        Json(ApiResponse::failure(self.to_string())).into_response()
    }
}

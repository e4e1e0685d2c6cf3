pub mod assets;
pub mod auth;
pub mod connections;
pub mod delivery;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod router;
pub mod store;
pub mod users;
pub mod webhooks;

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, ApiResult};

#[cfg(test)]
mod tests;

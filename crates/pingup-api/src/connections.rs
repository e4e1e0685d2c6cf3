use chrono::{TimeDelta, Utc};
use tracing::info;
use uuid::Uuid;

use pingup_db::connections::{NewRequest, RequestOutcome, RequestQuota};
use pingup_db::queries::UserSet;
use pingup_types::models::ConnectionStatus;

use crate::error::{ApiError, ApiResult};
use crate::store::Store;

/// Requests a user may create within any rolling [`REQUEST_WINDOW_HOURS`].
pub const MAX_REQUESTS_PER_WINDOW: u32 = 20;
pub const REQUEST_WINDOW_HOURS: i64 = 24;

/// Follow graph and the connection request lifecycle.
///
/// A request moves `pending -> accepted` exactly once and is never removed.
/// There is at most one request per unordered pair of users.
#[derive(Clone)]
pub struct ConnectionService {
    store: Store,
}

impl ConnectionService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn send_request(&self, from_id: &str, to_id: &str) -> ApiResult<()> {
        if from_id == to_id {
            return Err(ApiError::validation("You Cannot Connect With Yourself"));
        }

        self.ensure_user_exists(to_id).await?;

        let now = Utc::now();
        let quota = RequestQuota {
            max: MAX_REQUESTS_PER_WINDOW,
            since: now - TimeDelta::hours(REQUEST_WINDOW_HOURS),
        };
        let id = Uuid::new_v4().to_string();
        let (from, to) = (from_id.to_string(), to_id.to_string());
        let outcome = self
            .store
            .call(move |db| {
                let req = NewRequest {
                    id: &id,
                    from_user_id: &from,
                    to_user_id: &to,
                    created_at: now,
                };
                db.create_request(&req, quota)
            })
            .await?;

        match outcome {
            RequestOutcome::Inserted => {}
            RequestOutcome::RateLimited => return Err(ApiError::RateLimited),
            RequestOutcome::Duplicate => {
                let (from, to) = (from_id.to_string(), to_id.to_string());
                let existing = self.store.call(move |db| db.find_request_between(&from, &to)).await?;
                return Err(match existing.map(|row| row.into_request().status) {
                    Some(ConnectionStatus::Accepted) => {
                        ApiError::conflict("You Are Already Connected With This User")
                    }
                    _ => ApiError::RequestPending,
                });
            }
        }

        info!("{} sent a connection request to {}", from_id, to_id);
        Ok(())
    }

    /// Accept the pending request `requester_id` sent to `accepter_id`.
    pub async fn accept_request(&self, accepter_id: &str, requester_id: &str) -> ApiResult<()> {
        let (from, to) = (requester_id.to_string(), accepter_id.to_string());
        let request = self
            .store
            .call(move |db| db.find_request(&from, &to))
            .await?
            .ok_or_else(|| ApiError::not_found("Connection Not Found"))?
            .into_request();

        if request.status == ConnectionStatus::Accepted {
            return Err(ApiError::conflict("You Are Already Connected With This User"));
        }

        let (accepter, requester) = (accepter_id.to_string(), requester_id.to_string());
        self.store
            .call(move |db| db.accept_request(&request.id, &accepter, &requester))
            .await?;

        info!("{} accepted the connection request from {}", accepter_id, requester_id);
        Ok(())
    }

    pub async fn follow(&self, follower_id: &str, target_id: &str) -> ApiResult<()> {
        if follower_id == target_id {
            return Err(ApiError::validation("You Cannot Follow Yourself"));
        }
        self.ensure_user_exists(target_id).await?;

        let (follower, target) = (follower_id.to_string(), target_id.to_string());
        let already = self
            .store
            .call(move |db| db.set_contains(&follower, UserSet::Following, &target))
            .await?;
        if already {
            return Err(ApiError::conflict("You Are Already Following This User"));
        }

        let (follower, target) = (follower_id.to_string(), target_id.to_string());
        self.store.call(move |db| db.follow(&follower, &target)).await?;

        info!("{} followed {}", follower_id, target_id);
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: &str, target_id: &str) -> ApiResult<()> {
        self.ensure_user_exists(target_id).await?;

        let (follower, target) = (follower_id.to_string(), target_id.to_string());
        self.store.call(move |db| db.unfollow(&follower, &target)).await?;

        info!("{} unfollowed {}", follower_id, target_id);
        Ok(())
    }

    async fn ensure_user_exists(&self, user_id: &str) -> ApiResult<()> {
        let id = user_id.to_string();
        match self.store.call(move |db| db.get_user_by_id(&id)).await? {
            Some(_) => Ok(()),
            None => Err(ApiError::not_found("User Not Found")),
        }
    }
}

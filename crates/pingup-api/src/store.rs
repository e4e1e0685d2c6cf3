use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use pingup_db::Database;

use crate::error::{ApiError, ApiResult};

/// Shared handle to the database that runs every query on the blocking pool,
/// keeping rusqlite off the async worker threads.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Direct synchronous access, for setup code and tests.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn call<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Upstream(anyhow!("Store task failed: {}", e))
            })?
            .map_err(ApiError::Upstream)
    }
}

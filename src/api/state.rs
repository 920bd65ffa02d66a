use diesel::PgConnection;

use crate::api::error::{ApiError, ApiResult};
use crate::db::pool::{PgPool, StoreError};
use crate::services::jobs::JobQueue;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jobs: JobQueue,
    pub version: String,
}

impl AppState {
    pub fn new(pool: PgPool, jobs: JobQueue) -> Self {
        AppState {
            pool,
            jobs,
            version: format!("{} ({})", env!("CARGO_PKG_VERSION"), env!("BUILD_TIME_GIT_HASH")),
        }
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub async fn run_db<T, F>(&self, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("database task failed: {}", e)))?
        .map_err(ApiError::from)
    }
}

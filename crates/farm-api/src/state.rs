use std::sync::Arc;

use tracing::{error, warn};

use farm_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>) -> AppState {
        Arc::new(Self { db })
    }

    /// Run a store call off the async runtime. Any failure is logged and
    /// answered as `on_error`.
    pub async fn with_db<F, T>(&self, on_error: ApiError, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal("Internal server error")
            })?
            .map_err(|e| {
                match &on_error {
                    ApiError::Internal(_) => error!("{}: {:#}", on_error, e),
                    _ => warn!("{}: {:#}", on_error, e),
                }
                on_error
            })
    }
}

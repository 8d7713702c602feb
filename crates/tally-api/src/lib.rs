pub mod chats;
pub mod error;
pub mod groups;
pub mod unseen;

use std::sync::Arc;

use tally_db::Database;
use tally_gateway::rooms::RoomRegistry;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub registry: RoomRegistry,
}

/// Run a blocking DB closure off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task join error: {}", e)))?
        .map_err(ApiError::Internal)
}

use std::sync::Arc;

use tracing::error;

use capsule_db::{
    CapsuleStore, Database, FileContentStore, QuestionAnswerStore, SongStore, UserStore,
    WritingStore,
};
use capsule_storage::ObjectStore;

use crate::config::Config;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub users: Arc<dyn UserStore>,
    pub capsules: Arc<dyn CapsuleStore>,
    pub songs: Arc<dyn SongStore>,
    pub question_answers: Arc<dyn QuestionAnswerStore>,
    pub writings: Arc<dyn WritingStore>,
    pub files: Arc<dyn FileContentStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub config: Config,
}

impl AppStateInner {
    /// Wires every store trait to the same SQLite database.
    pub fn new(db: Arc<Database>, objects: Arc<dyn ObjectStore>, config: Config) -> AppState {
        Arc::new(Self {
            users: db.clone(),
            capsules: db.clone(),
            songs: db.clone(),
            question_answers: db.clone(),
            writings: db.clone(),
            files: db,
            objects,
            config,
        })
    }
}

/// Runs a store call on the blocking pool.
pub async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> capsule_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("background task failed".into())
        })?
        .map_err(ApiError::from)
}

use std::sync::Arc;

use crate::analysis::worker::AnalysisQueue;
use crate::config::ServerConfig;
use crate::db::VideoDb;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: ServerConfig,
    pub db: Arc<VideoDb>,
    pub queue: AnalysisQueue,
}

impl AppState {
    pub fn new(config: ServerConfig, db: Arc<VideoDb>, queue: AnalysisQueue) -> Self {
        Self { config, db, queue }
    }
}

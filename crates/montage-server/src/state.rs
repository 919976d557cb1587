use std::path::PathBuf;
use std::sync::Arc;

use montage::{Config, Orchestrator};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, config: Config) -> Self {
        Self {
            orchestrator,
            config: Arc::new(config),
        }
    }

    /// Uploads are spooled here before they move into the artifact store,
    /// so the final move stays on one filesystem.
    pub fn upload_directory(&self) -> PathBuf {
        self.config.data_directory.clone()
    }
}

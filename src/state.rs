use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::modules::catalog::MediaCatalog;
use crate::modules::transcode::{JobRegistry, TranscodeSupervisor};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<dyn MediaCatalog>,
    pub jobs: JobRegistry,
    pub supervisor: TranscodeSupervisor,
}

impl AppState {
    pub fn new(config: AppConfig, catalog: Arc<dyn MediaCatalog>) -> Self {
        let jobs = JobRegistry::new();
        let supervisor = TranscodeSupervisor::new(jobs.clone(), config.transcode.clone());
        Self {
            config: Arc::new(config),
            catalog,
            jobs,
            supervisor,
        }
    }
}

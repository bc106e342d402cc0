use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::jobs::JobRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jobs: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let ttl = chrono::Duration::seconds(config.export.job_ttl_secs);
        Self {
            config: Arc::new(config),
            jobs: Arc::new(JobRegistry::with_ttl(ttl)),
        }
    }
}

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::gemini::ExtractionClient;
use crate::services::storage::ReportStore;
use crate::session::{SaveTarget, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub extractor: Arc<dyn ExtractionClient>,
    pub reports: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        extractor: Arc<dyn ExtractionClient>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionStore::new()),
            extractor,
            reports,
        }
    }

    pub fn save_target(&self) -> SaveTarget {
        SaveTarget {
            bucket: self.config.storage.bucket_name.clone(),
            folder: self.config.storage.reports_folder.clone(),
        }
    }
}

use crate::config::ServerConfig;
use crate::scan::ScanTrigger;
use chrono::{DateTime, Utc};
use safemon_storage::{DomainRegistry, ScanResultStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn DomainRegistry>,
    pub results: Arc<dyn ScanResultStore>,
    pub trigger: ScanTrigger,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

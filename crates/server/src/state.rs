use std::sync::Arc;

use kasane_core::Config;
use kasane_fetch::SourceClient;
use kasane_store::CatalogStore;
use kasane_sync::SyncService;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CatalogStore>,
    pub client: Arc<SourceClient>,
    pub service: Arc<SyncService>,
}

//! Server startup: shared state initialization and background task spawning.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

use kasane_core::Config;
use kasane_detect::{DetectorConfig, DuplicateDetector};
use kasane_fetch::SourceClient;
use kasane_notify::{Dispatcher, Notifier, WebhookNotifier};
use kasane_store::{postgres::init_pg_pool, CatalogStore, MemStore, PgStore};
use kasane_sync::{Orchestrator, SyncService};

use crate::state::AppState;

/// Build `AppState` and the sync service. Selects PostgreSQL when
/// configured, degrading to the in-memory store otherwise.
pub async fn build_app_state(
    config: &Config,
) -> anyhow::Result<(Arc<AppState>, Arc<SyncService>, Arc<Notify>)> {
    let store: Arc<dyn CatalogStore> = match init_pg_pool(&config.postgres).await {
        Some(pool) => Arc::new(PgStore::new(pool)),
        None => Arc::new(MemStore::new()),
    };

    let client = Arc::new(SourceClient::new(config.sync.fetch_timeout_secs)?);
    let shutdown = Arc::new(Notify::new());

    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    match &config.notify.webhook_url {
        Some(url) => match WebhookNotifier::new(url.clone(), Default::default()) {
            Ok(notifier) => {
                info!("webhook notification channel configured");
                channels.push(Box::new(notifier));
            }
            Err(e) => {
                warn!(error = %e, "invalid webhook config — notifications disabled");
            }
        },
        None => {
            info!("no notification channel configured — review alerts disabled");
        }
    }

    let detector = DuplicateDetector::new(store.clone(), DetectorConfig::from_sync(&config.sync));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        detector,
        client.clone(),
        Arc::new(Dispatcher::new(channels)),
        config.sync.clone(),
        shutdown.clone(),
    ));
    let service = SyncService::new(
        store.clone(),
        orchestrator,
        config.sync.clone(),
        shutdown.clone(),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        client,
        service: service.clone(),
    });

    Ok((state, service, shutdown))
}

/// Spawn the worker, schedule trigger loop, and staleness sweeper.
pub fn spawn_background(service: Arc<SyncService>) {
    tokio::spawn(service.clone().run_worker());
    tokio::spawn(service.clone().run_scheduler());
    tokio::spawn(service.run_sweeper());
}

//! End-to-end pipeline flow against the in-memory store: configure
//! sources, trigger a sync, drain the worker, inspect the review queue
//! and job history.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use kasane_core::config::SyncConfig;
use kasane_core::model::{
    CatalogEntry, ChapterEntry, FetchKind, JobStatus, Source, SourceSettings,
};
use kasane_detect::{DetectorConfig, DuplicateDetector};
use kasane_fetch::CatalogFetcher;
use kasane_notify::Dispatcher;
use kasane_store::{CatalogStore, CreateSource, MemStore};
use kasane_sync::{Orchestrator, SyncService};

struct ScriptedFetcher {
    catalogs: Mutex<HashMap<String, Vec<CatalogEntry>>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self {
            catalogs: Mutex::new(HashMap::new()),
        }
    }

    fn script(&self, source_name: &str, entries: Vec<CatalogEntry>) {
        self.catalogs
            .lock()
            .unwrap()
            .insert(source_name.to_string(), entries);
    }
}

#[async_trait]
impl CatalogFetcher for ScriptedFetcher {
    async fn fetch_catalog(&self, source: &Source) -> Vec<CatalogEntry> {
        self.catalogs
            .lock()
            .unwrap()
            .get(&source.name)
            .cloned()
            .unwrap_or_default()
    }
}

fn build_service(
    store: Arc<MemStore>,
    fetcher: Arc<ScriptedFetcher>,
) -> Arc<SyncService> {
    let config = SyncConfig {
        default_source_delay_ms: 0,
        ..Default::default()
    };
    let shutdown = Arc::new(Notify::new());
    let detector = DuplicateDetector::new(store.clone(), DetectorConfig::default());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        detector,
        fetcher,
        Arc::new(Dispatcher::empty()),
        config.clone(),
        shutdown.clone(),
    ));
    SyncService::new(store, orchestrator, config, shutdown)
}

async fn add_source(store: &MemStore, name: &str) -> Source {
    store
        .create_source(CreateSource {
            name: name.to_string(),
            base_url: "https://api.example.org/catalog".to_string(),
            fetch_kind: FetchKind::Api,
            active: None,
            config: SourceSettings::default(),
        })
        .await
        .unwrap()
}

fn work(source: &Source, title: &str, key: &str, chapter_numbers: &[f64]) -> CatalogEntry {
    CatalogEntry {
        title: title.to_string(),
        description: Some(format!("{} synopsis", title)),
        author: Some("Author".to_string()),
        artist: None,
        genres: vec!["action".to_string(), "fantasy".to_string()],
        status: Default::default(),
        cover_url: Some("https://cdn.example.org/cover.jpg".to_string()),
        kind: Default::default(),
        source_id: source.id,
        source_key: key.to_string(),
        chapters: chapter_numbers
            .iter()
            .map(|n| ChapterEntry {
                number: *n,
                title: Some(format!("Chapter {}", n)),
                description: None,
                pages: vec!["1.jpg".to_string(), "2.jpg".to_string()],
                source_key: format!("{}-c{}", key, n),
            })
            .collect(),
    }
}

#[tokio::test]
async fn full_sync_cycle_across_two_sources() {
    let store = Arc::new(MemStore::new());
    let alpha = add_source(&store, "alpha").await;
    let beta = add_source(&store, "beta").await;

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script("alpha", vec![work(&alpha, "Solo Leveling", "a-sl", &[1.0, 2.0])]);
    fetcher.script("beta", vec![work(&beta, "Tower of God", "b-tog", &[1.0])]);

    let service = build_service(store.clone(), fetcher.clone());

    // First run: everything is new.
    let job = service.request_manual_sync(None).await.unwrap();
    service.process_pending_jobs().await;

    let job = service.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let summary = job.result.unwrap();
    assert_eq!(summary.new_works, 2);
    assert_eq!(summary.new_chapters, 3);
    assert_eq!(summary.duplicates_skipped, 0);

    let stats = store.queue_stats().await.unwrap();
    assert_eq!(stats.pending_works, 2);
    assert_eq!(stats.pending_chapters, 3);

    // Upstream adds one chapter to an existing work; next run merges only
    // the delta.
    fetcher.script(
        "alpha",
        vec![work(&alpha, "Solo Leveling", "a-sl", &[1.0, 2.0, 3.0])],
    );
    let job = service.request_manual_sync(None).await.unwrap();
    service.process_pending_jobs().await;

    let summary = service
        .get_job(job.id)
        .await
        .unwrap()
        .unwrap()
        .result
        .unwrap();
    assert_eq!(summary.new_works, 0);
    assert_eq!(summary.new_chapters, 1);
    assert_eq!(summary.duplicates_skipped, 2);

    // Job history shows both runs, newest first.
    let history = service.list_recent_jobs(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, job.id);
}

#[tokio::test]
async fn scoped_sync_touches_only_selected_source() {
    let store = Arc::new(MemStore::new());
    let alpha = add_source(&store, "alpha").await;
    let beta = add_source(&store, "beta").await;

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.script("alpha", vec![work(&alpha, "Work A", "a-1", &[])]);
    fetcher.script("beta", vec![work(&beta, "Work B", "b-1", &[])]);

    let service = build_service(store.clone(), fetcher);

    let job = service
        .request_manual_sync(Some(vec![beta.id]))
        .await
        .unwrap();
    service.process_pending_jobs().await;

    let summary = service
        .get_job(job.id)
        .await
        .unwrap()
        .unwrap()
        .result
        .unwrap();
    assert_eq!(summary.new_works, 1);

    assert!(store
        .find_work_by_source(beta.id, "b-1")
        .await
        .unwrap()
        .is_some());
    assert!(store
        .find_work_by_source(alpha.id, "a-1")
        .await
        .unwrap()
        .is_none());
}

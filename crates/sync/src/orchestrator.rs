//! One pass of the ingestion pipeline over all active sources.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use kasane_core::config::SyncConfig;
use kasane_core::instrument::timed;
use kasane_core::model::{CatalogEntry, JobProgress, Source, SyncSummary};
use kasane_detect::{DuplicateDetector, WorkQuery};
use kasane_fetch::{cancellable_sleep, CatalogFetcher};
use kasane_notify::{render_sync_summary, Dispatcher, Notification, SummaryContext};
use kasane_store::{CatalogStore, StoreError};

use crate::error::SyncError;

/// Executes sync runs. Holds the single-run gate: a second concurrent
/// [`sync_all`](Orchestrator::sync_all) call fails with [`SyncError::Busy`]
/// instead of queuing.
pub struct Orchestrator {
    store: Arc<dyn CatalogStore>,
    detector: DuplicateDetector,
    fetcher: Arc<dyn CatalogFetcher>,
    dispatcher: Arc<Dispatcher>,
    config: SyncConfig,
    shutdown: Arc<Notify>,
    run_gate: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        detector: DuplicateDetector,
        fetcher: Arc<dyn CatalogFetcher>,
        dispatcher: Arc<Dispatcher>,
        config: SyncConfig,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            detector,
            fetcher,
            dispatcher,
            config,
            shutdown,
            run_gate: Mutex::new(()),
        }
    }

    /// Run the pipeline over every active source (optionally restricted to
    /// `scope`), in stable registry order.
    ///
    /// Per-source and per-entry failures are recovered locally; the only
    /// terminal errors are an empty active-source set and a concurrent-run
    /// attempt. When `job_id` is set, progress is persisted on that job row
    /// as the run advances.
    pub async fn sync_all(
        &self,
        scope: Option<&[Uuid]>,
        job_id: Option<Uuid>,
    ) -> Result<SyncSummary, SyncError> {
        let _guard = self.run_gate.try_lock().map_err(|_| SyncError::Busy)?;

        let sources: Vec<Source> = self
            .store
            .list_sources()
            .await?
            .into_iter()
            .filter(|s| s.active)
            .filter(|s| match scope {
                Some(ids) => ids.contains(&s.id),
                None => true,
            })
            .collect();

        if sources.is_empty() {
            return Err(SyncError::NoActiveSources);
        }

        info!(sources = sources.len(), "sync run started");
        let mut total = SyncSummary::default();
        let mut progress = JobProgress::default();
        let source_count = sources.len();

        for (index, source) in sources.iter().enumerate() {
            progress.step = format!("syncing {}", source.name);
            self.persist_progress(job_id, &progress).await;

            let summary = timed(
                "sync_source",
                self.sync_source(source, &mut progress, job_id),
            )
            .await;

            if summary.errors.is_empty() {
                info!(
                    source = %source.name,
                    new_works = summary.new_works,
                    new_chapters = summary.new_chapters,
                    duplicates = summary.duplicates_skipped,
                    "source synced"
                );
            } else {
                warn!(
                    source = %source.name,
                    errors = summary.errors.len(),
                    "source synced with item errors"
                );
            }
            total.absorb(summary);

            if let Err(e) = self
                .store
                .update_source_last_sync(source.id, Utc::now())
                .await
            {
                warn!(source_id = %source.id, error = %e, "failed to record last sync time");
            }

            // Pace before the next source so the whole run cannot burst.
            if index + 1 < source_count {
                let delay = source.pacing_delay_ms(self.config.default_source_delay_ms);
                if !cancellable_sleep(Duration::from_millis(delay), &self.shutdown).await {
                    warn!("shutdown requested — aborting remaining sources");
                    break;
                }
            }
        }

        if total.pending_review() > 0 {
            self.notify_reviewers(&total).await;
        }

        info!(
            new_works = total.new_works,
            new_chapters = total.new_chapters,
            duplicates = total.duplicates_skipped,
            errors = total.errors.len(),
            "sync run finished"
        );
        Ok(total)
    }

    /// Sync a single source. Fetch failures contribute zero entries; one
    /// bad entry never aborts the rest.
    async fn sync_source(
        &self,
        source: &Source,
        progress: &mut JobProgress,
        job_id: Option<Uuid>,
    ) -> SyncSummary {
        let entries = self.fetcher.fetch_catalog(source).await;
        let mut summary = SyncSummary::default();

        for entry in &entries {
            if let Err(e) = self.process_entry(entry, &mut summary).await {
                summary
                    .errors
                    .push(format!("{}: '{}': {}", source.name, entry.title, e));
                progress.errors += 1;
            }
            progress.works_processed += 1;
            progress.chapters_processed += entry.chapters.len() as u64;
            self.persist_progress(job_id, progress).await;
        }

        summary
    }

    /// Classify one canonical entry and persist what is genuinely new.
    async fn process_entry(
        &self,
        entry: &CatalogEntry,
        summary: &mut SyncSummary,
    ) -> Result<(), StoreError> {
        let query = WorkQuery {
            title: entry.title.clone(),
            author: entry.author.clone(),
            description: entry.description.clone(),
            source_id: Some(entry.source_id),
            source_key: Some(entry.source_key.clone()),
        };
        let result = self.detector.check_work(&query).await?;

        if result.is_duplicate {
            summary.duplicates_skipped += 1;
            debug!(
                title = %entry.title,
                confidence = result.confidence,
                reasons = ?result.reasons,
                "duplicate work skipped"
            );
            // Known work: diff its chapters and queue only the new ones.
            if let Some(matched) = result.matched {
                for chapter in &entry.chapters {
                    let check = self
                        .detector
                        .check_chapter(matched.id, chapter.number, chapter.title.as_deref())
                        .await?;
                    if !check.is_duplicate {
                        self.store
                            .insert_pending_chapter(matched.id, chapter)
                            .await?;
                        summary.new_chapters += 1;
                    }
                }
            }
        } else {
            let work_id = self.store.insert_pending_work(entry).await?;
            summary.new_works += 1;
            for chapter in &entry.chapters {
                self.store.insert_pending_chapter(work_id, chapter).await?;
                summary.new_chapters += 1;
            }
            debug!(title = %entry.title, work_id = %work_id, "new work queued for review");
        }
        Ok(())
    }

    /// One aggregate notification per run, sent only when something new
    /// reached the review queue. Delivery failures are logged, never
    /// surfaced into the run result.
    async fn notify_reviewers(&self, summary: &SyncSummary) {
        let recipients = match self.store.review_operator_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to resolve notification recipients");
                return;
            }
        };

        let context = SummaryContext {
            new_works: summary.new_works,
            new_chapters: summary.new_chapters,
            duplicates_skipped: summary.duplicates_skipped,
            pending_review: summary.pending_review(),
            now: Utc::now().to_rfc3339(),
        };
        let (subject, body) = match render_sync_summary(&context) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, "failed to render sync summary notification");
                return;
            }
        };

        let notification = Notification {
            subject,
            body,
            recipient_ids: recipients,
            payload: serde_json::json!({
                "new_works": summary.new_works,
                "new_chapters": summary.new_chapters,
                "duplicates_skipped": summary.duplicates_skipped,
            }),
            metadata: std::collections::HashMap::new(),
        };
        self.dispatcher.dispatch(&notification).await;
    }

    async fn persist_progress(&self, job_id: Option<Uuid>, progress: &JobProgress) {
        if let Some(id) = job_id {
            if let Err(e) = self.store.update_job_progress(id, progress).await {
                warn!(job_id = %id, error = %e, "failed to persist job progress");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kasane_core::model::{ChapterEntry, FetchKind, SourceSettings};
    use kasane_detect::DetectorConfig;
    use kasane_store::{CreateSource, MemStore};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Scripted fetcher: returns a fixed catalog per source name.
    struct ScriptedFetcher {
        catalogs: StdMutex<HashMap<String, Vec<CatalogEntry>>>,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self {
                catalogs: StdMutex::new(HashMap::new()),
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

    fn test_config() -> SyncConfig {
        SyncConfig {
            // No pacing in tests.
            default_source_delay_ms: 0,
            ..Default::default()
        }
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

    fn entry(source: &Source, title: &str, key: &str, chapters: &[f64]) -> CatalogEntry {
        CatalogEntry {
            title: title.to_string(),
            description: None,
            author: Some("Chugong".to_string()),
            artist: None,
            genres: vec!["action".to_string()],
            status: Default::default(),
            cover_url: None,
            kind: Default::default(),
            source_id: source.id,
            source_key: key.to_string(),
            chapters: chapters
                .iter()
                .map(|n| ChapterEntry {
                    number: *n,
                    title: None,
                    description: None,
                    pages: vec!["p1.jpg".to_string()],
                    source_key: format!("{}-ch{}", key, n),
                })
                .collect(),
        }
    }

    fn orchestrator(
        store: Arc<MemStore>,
        fetcher: Arc<ScriptedFetcher>,
    ) -> Orchestrator {
        let detector = DuplicateDetector::new(store.clone(), DetectorConfig::default());
        Orchestrator::new(
            store,
            detector,
            fetcher,
            Arc::new(Dispatcher::empty()),
            test_config(),
            Arc::new(Notify::new()),
        )
    }

    // ── fresh content ───────────────────────────────────────────────

    #[tokio::test]
    async fn new_work_is_queued_for_review() {
        let store = Arc::new(MemStore::new());
        let source = add_source(&store, "mangadex").await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script("mangadex", vec![entry(&source, "Solo Leveling", "sl-1", &[])]);

        let orch = orchestrator(store.clone(), fetcher);
        let summary = orch.sync_all(None, None).await.unwrap();

        assert_eq!(summary.new_works, 1);
        assert_eq!(summary.duplicates_skipped, 0);
        assert_eq!(store.queue_len(), 1);

        // last_sync_at was recorded for the source.
        let source = store.get_source(source.id).await.unwrap().unwrap();
        assert!(source.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let store = Arc::new(MemStore::new());
        let source = add_source(&store, "mangadex").await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            "mangadex",
            vec![entry(&source, "Solo Leveling", "sl-1", &[1.0, 2.0])],
        );

        let orch = orchestrator(store.clone(), fetcher);
        let first = orch.sync_all(None, None).await.unwrap();
        assert_eq!(first.new_works, 1);
        assert_eq!(first.new_chapters, 2);

        let second = orch.sync_all(None, None).await.unwrap();
        assert_eq!(second.new_works, 0);
        assert_eq!(second.new_chapters, 0);
        assert_eq!(second.duplicates_skipped, 1);
    }

    // ── chapter merging ─────────────────────────────────────────────

    #[tokio::test]
    async fn new_chapters_merge_into_known_work() {
        let store = Arc::new(MemStore::new());
        let source = add_source(&store, "mangadex").await;
        let fetcher = Arc::new(ScriptedFetcher::new());

        // First pass: chapters 1-10.
        let chapters: Vec<f64> = (1..=10).map(|n| n as f64).collect();
        fetcher.script(
            "mangadex",
            vec![entry(&source, "Tower of God", "tog-1", &chapters)],
        );
        let orch = orchestrator(store.clone(), fetcher.clone());
        orch.sync_all(None, None).await.unwrap();

        // Second pass: the source now reports chapters 1-12.
        let chapters: Vec<f64> = (1..=12).map(|n| n as f64).collect();
        fetcher.script(
            "mangadex",
            vec![entry(&source, "Tower of God", "tog-1", &chapters)],
        );
        let summary = orch.sync_all(None, None).await.unwrap();

        assert_eq!(summary.new_works, 0);
        assert_eq!(summary.new_chapters, 2);
        assert_eq!(summary.duplicates_skipped, 1);

        // 1 work row + 12 chapter rows in the queue overall.
        assert_eq!(store.queue_len(), 13);
    }

    // ── scope / inactive sources ────────────────────────────────────

    #[tokio::test]
    async fn inactive_sources_are_skipped() {
        let store = Arc::new(MemStore::new());
        let source = add_source(&store, "mangadex").await;
        store
            .update_source(
                source.id,
                kasane_store::UpdateSource {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script("mangadex", vec![entry(&source, "Solo Leveling", "sl-1", &[])]);

        let orch = orchestrator(store, fetcher);
        let result = orch.sync_all(None, None).await;
        assert!(matches!(result, Err(SyncError::NoActiveSources)));
    }

    #[tokio::test]
    async fn scope_restricts_sources() {
        let store = Arc::new(MemStore::new());
        let a = add_source(&store, "alpha").await;
        let b = add_source(&store, "beta").await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script("alpha", vec![entry(&a, "Work A", "a-1", &[])]);
        fetcher.script("beta", vec![entry(&b, "Work B", "b-1", &[])]);

        let orch = orchestrator(store.clone(), fetcher);
        let summary = orch.sync_all(Some(&[a.id]), None).await.unwrap();

        assert_eq!(summary.new_works, 1);
        let beta = store.get_source(b.id).await.unwrap().unwrap();
        assert!(beta.last_sync_at.is_none());
    }

    // ── cross-source behavior ───────────────────────────────────────

    #[tokio::test]
    async fn same_work_from_second_source_matches_by_similarity() {
        let store = Arc::new(MemStore::new());
        let a = add_source(&store, "alpha").await;
        let b = add_source(&store, "beta").await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script("alpha", vec![entry(&a, "Solo Leveling", "a-1", &[])]);
        // Same title/author on a different source with a different native id.
        fetcher.script("beta", vec![entry(&b, "Solo Leveling", "b-9", &[])]);

        let orch = orchestrator(store, fetcher);
        let summary = orch.sync_all(None, None).await.unwrap();

        assert_eq!(summary.new_works, 1);
        assert_eq!(summary.duplicates_skipped, 1);
    }

    // ── error isolation ─────────────────────────────────────────────

    #[tokio::test]
    async fn failing_source_does_not_abort_run() {
        let store = Arc::new(MemStore::new());
        let _dead = add_source(&store, "dead").await; // fetcher has no script → empty
        let live = add_source(&store, "live").await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script("live", vec![entry(&live, "Berserk", "bk-1", &[])]);

        let orch = orchestrator(store, fetcher);
        let summary = orch.sync_all(None, None).await.unwrap();
        assert_eq!(summary.new_works, 1);
    }

    // ── busy gate ───────────────────────────────────────────────────

    #[tokio::test]
    async fn concurrent_run_is_rejected_not_queued() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let orch = Arc::new(orchestrator(store, fetcher));

        let guard = orch.run_gate.try_lock().unwrap();
        let result = orch.sync_all(None, None).await;
        assert!(matches!(result, Err(SyncError::Busy)));
        drop(guard);
    }

    // ── notification ────────────────────────────────────────────────

    #[tokio::test]
    async fn one_aggregate_notification_per_run() {
        use kasane_notify::{Notifier, NotifyError};
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Recorder {
            sends: Arc<AtomicUsize>,
            last_recipients: Arc<StdMutex<Vec<Uuid>>>,
        }

        #[async_trait]
        impl Notifier for Recorder {
            async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
                self.sends.fetch_add(1, Ordering::SeqCst);
                *self.last_recipients.lock().unwrap() = notification.recipient_ids.clone();
                Ok(())
            }

            fn channel_name(&self) -> &str {
                "recorder"
            }
        }

        let store = Arc::new(MemStore::new());
        let operator = Uuid::new_v4();
        store.add_operator(operator);
        let source = add_source(&store, "mangadex").await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            "mangadex",
            vec![
                entry(&source, "Solo Leveling", "sl-1", &[1.0]),
                entry(&source, "Tower of God", "tog-1", &[1.0]),
            ],
        );

        let sends = Arc::new(AtomicUsize::new(0));
        let last_recipients = Arc::new(StdMutex::new(Vec::new()));
        let dispatcher = Arc::new(Dispatcher::new(vec![Box::new(Recorder {
            sends: sends.clone(),
            last_recipients: last_recipients.clone(),
        })]));

        let detector = DuplicateDetector::new(store.clone(), DetectorConfig::default());
        let orch = Orchestrator::new(
            store.clone(),
            detector,
            fetcher.clone(),
            dispatcher,
            test_config(),
            Arc::new(Notify::new()),
        );

        orch.sync_all(None, None).await.unwrap();
        // Two new works, one notification.
        assert_eq!(sends.load(Ordering::SeqCst), 1);
        assert_eq!(*last_recipients.lock().unwrap(), vec![operator]);

        // Second run finds nothing new: no notification.
        orch.sync_all(None, None).await.unwrap();
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }
}

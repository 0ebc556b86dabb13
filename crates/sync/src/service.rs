//! Job lifecycle around the orchestrator.
//!
//! [`SyncService`] owns the pieces of the job state machine:
//! - manual triggers and schedule ticks both create Pending jobs
//! - a single sequential worker promotes Pending → Running through the
//!   store's atomic gate, runs the orchestrator, and records the outcome
//! - a staleness sweeper force-fails Running jobs older than the timeout
//!
//! Every loop body is wrapped so one failure never disables future
//! scheduling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kasane_core::config::SyncConfig;
use kasane_core::model::{JobStatus, ScheduleConfig, SyncJob, TriggerKind};
use kasane_store::{CatalogStore, StoreError};

use crate::error::SyncError;
use crate::orchestrator::Orchestrator;
use crate::schedule::is_due;

/// Coordinates sync jobs: creation, promotion, execution, recovery.
pub struct SyncService {
    store: Arc<dyn CatalogStore>,
    orchestrator: Arc<Orchestrator>,
    config: SyncConfig,
    /// Wakes the worker when a job is enqueued.
    wake: Notify,
    shutdown: Arc<Notify>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        orchestrator: Arc<Orchestrator>,
        config: SyncConfig,
        shutdown: Arc<Notify>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            orchestrator,
            config,
            wake: Notify::new(),
            shutdown,
        })
    }

    // ── Public operations ────────────────────────────────────────────

    /// Create a Pending job and return immediately; the worker picks it up.
    /// A request made while another job runs is accepted and serialized,
    /// never rejected and never racing.
    pub async fn request_manual_sync(
        &self,
        source_ids: Option<Vec<Uuid>>,
    ) -> Result<SyncJob, StoreError> {
        let job = self.store.create_job(TriggerKind::Manual, source_ids).await?;
        info!(job_id = %job.id, "manual sync requested");
        self.wake.notify_one();
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<SyncJob>, StoreError> {
        self.store.get_job(id).await
    }

    pub async fn list_recent_jobs(&self, limit: u64) -> Result<Vec<SyncJob>, StoreError> {
        self.store.list_recent_jobs(limit).await
    }

    /// Cancel a job that has not started. Running jobs are not
    /// cooperatively cancellable; the staleness sweep is their only
    /// recovery path.
    pub async fn cancel_pending(&self, id: Uuid) -> Result<SyncJob, StoreError> {
        let job = self
            .store
            .get_job(id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        if job.status != JobStatus::Pending {
            return Err(StoreError::InvalidInput(format!(
                "only pending jobs can be cancelled (job is {})",
                job.status.as_str()
            )));
        }
        self.store.fail_job(id, "cancelled before start").await?;
        info!(job_id = %id, "pending job cancelled");
        self.store
            .get_job(id)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    pub async fn get_schedule(&self) -> Result<ScheduleConfig, StoreError> {
        self.store.get_schedule().await
    }

    /// Validate, persist, and apply a new schedule config. The trigger
    /// loop re-reads it on its next tick, so the change takes effect
    /// without a restart.
    pub async fn update_schedule(
        &self,
        config: ScheduleConfig,
    ) -> Result<ScheduleConfig, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        self.store.put_schedule(&config).await?;
        info!(enabled = config.enabled, "schedule config updated");
        Ok(config)
    }

    // ── Worker ───────────────────────────────────────────────────────

    /// Single sequential worker loop. Spawned once at startup.
    pub async fn run_worker(self: Arc<Self>) {
        info!("sync worker started");
        loop {
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                _ = self.shutdown.notified() => {
                    info!("sync worker shutting down");
                    return;
                }
            }
            self.process_pending_jobs().await;
        }
    }

    /// Drain the Pending queue, one job at a time. Each promotion goes
    /// through the store's atomic gate, so even a second worker (or
    /// another process) could not start a concurrent run.
    pub async fn process_pending_jobs(&self) {
        loop {
            let job = match self.store.next_pending_job().await {
                Ok(Some(job)) => job,
                Ok(None) => return,
                Err(e) => {
                    error!(error = %e, "worker: failed to query pending jobs");
                    return;
                }
            };

            match self.store.try_start_job(job.id).await {
                Ok(true) => {}
                Ok(false) => {
                    // Another job holds the Running slot; retry on next wake.
                    debug!(job_id = %job.id, "worker: running slot busy");
                    return;
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "worker: failed to start job");
                    return;
                }
            }

            info!(job_id = %job.id, trigger = ?job.trigger, "sync job started");
            let outcome = self
                .orchestrator
                .sync_all(job.source_ids.as_deref(), Some(job.id))
                .await;

            match outcome {
                Ok(summary) => {
                    if let Err(e) = self.store.complete_job(job.id, &summary).await {
                        error!(job_id = %job.id, error = %e, "worker: failed to record completion");
                    }
                    info!(
                        job_id = %job.id,
                        new_works = summary.new_works,
                        new_chapters = summary.new_chapters,
                        duplicates = summary.duplicates_skipped,
                        "sync job completed"
                    );
                }
                Err(e) => {
                    let message = match &e {
                        // The worker itself is the only runner, so Busy here
                        // means an out-of-band run (e.g. the CLI one-shot).
                        SyncError::Busy => "another sync run is in progress".to_string(),
                        other => other.to_string(),
                    };
                    if let Err(persist_err) = self.store.fail_job(job.id, &message).await {
                        error!(job_id = %job.id, error = %persist_err, "worker: failed to record failure");
                    }
                    warn!(job_id = %job.id, error = %message, "sync job failed");
                }
            }
        }
    }

    // ── Schedule trigger loop ────────────────────────────────────────

    /// Trigger-check loop. Re-reads the schedule config every tick so
    /// admin updates apply immediately; a config change re-anchors the
    /// policy window so a freshly enabled daily 02:00 schedule waits for
    /// the next 02:00 instead of firing retroactively.
    pub async fn run_scheduler(self: Arc<Self>) {
        info!(
            tick_secs = self.config.tick_interval_secs,
            "schedule trigger loop started"
        );
        let mut anchor = Utc::now();
        let mut last_config: Option<ScheduleConfig> = None;
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        interval.tick().await; // skip the immediate tick

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.notified() => {
                    info!("schedule trigger loop shutting down");
                    return;
                }
            }

            let config = match self.store.get_schedule().await {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "trigger: failed to load schedule config");
                    continue;
                }
            };

            if last_config.as_ref() != Some(&config) {
                anchor = Utc::now();
                last_config = Some(config.clone());
                debug!("schedule config (re)loaded — window re-anchored");
            }

            match self.maybe_enqueue_scheduled(&config, Utc::now(), &mut anchor).await {
                Ok(Some(job)) => {
                    info!(job_id = %job.id, "scheduled sync enqueued");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "trigger: failed to enqueue scheduled sync");
                }
            }
        }
    }

    /// One trigger check: enqueue exactly one Scheduled job when the
    /// policy window has a tick in `(anchor, now]` and no job is already
    /// pending or running. A non-matching check is a no-op, not an error.
    pub async fn maybe_enqueue_scheduled(
        &self,
        config: &ScheduleConfig,
        now: DateTime<Utc>,
        anchor: &mut DateTime<Utc>,
    ) -> Result<Option<SyncJob>, StoreError> {
        if !is_due(config, now, *anchor) {
            return Ok(None);
        }
        if self.store.running_job().await?.is_some()
            || self.store.next_pending_job().await?.is_some()
        {
            debug!("trigger: due, but a job is already queued or running");
            return Ok(None);
        }

        let job = self
            .store
            .create_job(TriggerKind::Scheduled, config.source_ids.clone())
            .await?;
        *anchor = now;
        self.wake.notify_one();
        Ok(Some(job))
    }

    // ── Staleness sweeper ────────────────────────────────────────────

    /// Sweep loop. Spawned once at startup; one sweep failure never stops
    /// the loop.
    pub async fn run_sweeper(self: Arc<Self>) {
        info!(
            sweep_secs = self.config.sweep_interval_secs,
            stale_mins = self.config.stale_after_mins,
            "staleness sweeper started"
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.notified() => {
                    info!("staleness sweeper shutting down");
                    return;
                }
            }
            self.sweep_once().await;
        }
    }

    /// Force-fail Running jobs older than the staleness window. This is
    /// the only recovery path for a run wedged by a crashed process.
    pub async fn sweep_once(&self) {
        let cutoff = Utc::now() - chrono::Duration::minutes(self.config.stale_after_mins as i64);
        let reason = format!(
            "sync job timed out after {} minutes",
            self.config.stale_after_mins
        );
        match self.store.fail_stale_jobs(cutoff, &reason).await {
            Ok(failed) => {
                for job in failed {
                    warn!(
                        job_id = %job.id,
                        started_at = ?job.started_at,
                        "stale running job force-failed"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "staleness sweep failed");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kasane_core::model::{
        CatalogEntry, FetchKind, SchedulePolicy, Source, SourceSettings,
    };
    use kasane_detect::{DetectorConfig, DuplicateDetector};
    use kasane_fetch::CatalogFetcher;
    use kasane_notify::Dispatcher;
    use kasane_store::{CreateSource, MemStore};

    /// Fetcher returning one fixed entry per source.
    struct OneEntryFetcher;

    #[async_trait]
    impl CatalogFetcher for OneEntryFetcher {
        async fn fetch_catalog(&self, source: &Source) -> Vec<CatalogEntry> {
            vec![CatalogEntry {
                title: format!("{} exclusive", source.name),
                description: None,
                author: None,
                artist: None,
                genres: Vec::new(),
                status: Default::default(),
                cover_url: None,
                kind: Default::default(),
                source_id: source.id,
                source_key: format!("{}-1", source.name),
                chapters: Vec::new(),
            }]
        }
    }

    fn test_config(stale_after_mins: u64) -> SyncConfig {
        SyncConfig {
            default_source_delay_ms: 0,
            stale_after_mins,
            ..Default::default()
        }
    }

    async fn service_with(
        store: Arc<MemStore>,
        stale_after_mins: u64,
    ) -> Arc<SyncService> {
        let shutdown = Arc::new(Notify::new());
        let detector = DuplicateDetector::new(store.clone(), DetectorConfig::default());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            detector,
            Arc::new(OneEntryFetcher),
            Arc::new(Dispatcher::empty()),
            test_config(stale_after_mins),
            shutdown.clone(),
        ));
        SyncService::new(store, orchestrator, test_config(stale_after_mins), shutdown)
    }

    async fn add_source(store: &MemStore, name: &str) {
        store
            .create_source(CreateSource {
                name: name.to_string(),
                base_url: "https://api.example.org/catalog".to_string(),
                fetch_kind: FetchKind::Api,
                active: None,
                config: SourceSettings::default(),
            })
            .await
            .unwrap();
    }

    // ── worker ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn manual_sync_runs_to_completion() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let service = service_with(store.clone(), 30).await;

        let job = service.request_manual_sync(None).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        service.process_pending_jobs().await;

        let job = service.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let summary = job.result.unwrap();
        assert_eq!(summary.new_works, 1);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn queued_jobs_run_sequentially() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let service = service_with(store.clone(), 30).await;

        let a = service.request_manual_sync(None).await.unwrap();
        let b = service.request_manual_sync(None).await.unwrap();

        service.process_pending_jobs().await;

        let a = service.get_job(a.id).await.unwrap().unwrap();
        let b = service.get_job(b.id).await.unwrap().unwrap();
        assert_eq!(a.status, JobStatus::Completed);
        assert_eq!(b.status, JobStatus::Completed);
        // The second run saw the first run's output: everything duplicate.
        assert_eq!(b.result.unwrap().duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn run_with_no_active_sources_fails_cleanly() {
        let store = Arc::new(MemStore::new());
        let service = service_with(store.clone(), 30).await;

        let job = service.request_manual_sync(None).await.unwrap();
        service.process_pending_jobs().await;

        let job = service.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("no active sources"));
    }

    // ── cancel ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn pending_job_is_cancellable() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let service = service_with(store.clone(), 30).await;

        let job = service.request_manual_sync(None).await.unwrap();
        let cancelled = service.cancel_pending(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        assert!(cancelled.error.unwrap().contains("cancelled"));

        // The worker finds nothing to do.
        service.process_pending_jobs().await;
        let job = service.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn terminal_job_is_not_cancellable() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let service = service_with(store.clone(), 30).await;

        let job = service.request_manual_sync(None).await.unwrap();
        service.process_pending_jobs().await;

        let err = service.cancel_pending(job.id).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    // ── sweeper ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn sweep_force_fails_stale_running_job() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        // Zero-minute staleness window: anything Running is already stale.
        let service = service_with(store.clone(), 0).await;

        let job = store.create_job(TriggerKind::Manual, None).await.unwrap();
        assert!(store.try_start_job(job.id).await.unwrap());
        // Ensure started_at is strictly before the sweep cutoff.
        tokio::time::sleep(Duration::from_millis(5)).await;

        service.sweep_once().await;

        let job = service.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_jobs_alone() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let service = service_with(store.clone(), 30).await;

        let job = store.create_job(TriggerKind::Manual, None).await.unwrap();
        assert!(store.try_start_job(job.id).await.unwrap());

        service.sweep_once().await;

        let job = service.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }

    // ── schedule trigger ────────────────────────────────────────────

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn daily_schedule_enqueues_exactly_one_job() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let service = service_with(store.clone(), 30).await;

        let config = ScheduleConfig {
            enabled: true,
            policy: SchedulePolicy::Daily {
                time: "02:00".to_string(),
            },
            source_ids: None,
        };

        // Config applied at 01:59 — the 01:59:30 tick is a no-op.
        let mut anchor = at("2026-08-06T01:59:00Z");
        let tick = service
            .maybe_enqueue_scheduled(&config, at("2026-08-06T01:59:30Z"), &mut anchor)
            .await
            .unwrap();
        assert!(tick.is_none());

        // The 02:00:30 tick fires once.
        let job = service
            .maybe_enqueue_scheduled(&config, at("2026-08-06T02:00:30Z"), &mut anchor)
            .await
            .unwrap()
            .expect("job should be enqueued");
        assert_eq!(job.trigger, TriggerKind::Scheduled);

        // Drain it so the queue is empty, then verify no re-fire on later
        // ticks the same day.
        service.process_pending_jobs().await;
        for minute in ["02:01:30", "02:05:00", "12:00:00"] {
            let tick = service
                .maybe_enqueue_scheduled(
                    &config,
                    at(&format!("2026-08-06T{}Z", minute)),
                    &mut anchor,
                )
                .await
                .unwrap();
            assert!(tick.is_none(), "unexpected fire at {}", minute);
        }
    }

    #[tokio::test]
    async fn due_trigger_skipped_while_job_queued() {
        let store = Arc::new(MemStore::new());
        add_source(&store, "mangadex").await;
        let service = service_with(store.clone(), 30).await;

        // A manual job is already pending.
        service.request_manual_sync(None).await.unwrap();

        let config = ScheduleConfig {
            enabled: true,
            policy: SchedulePolicy::Hourly,
            source_ids: None,
        };
        let mut anchor = at("2026-08-06T01:30:00Z");
        let tick = service
            .maybe_enqueue_scheduled(&config, at("2026-08-06T02:00:30Z"), &mut anchor)
            .await
            .unwrap();
        assert!(tick.is_none());
        // The anchor did not advance, so the window fires once the queue
        // drains.
        service.process_pending_jobs().await;
        let tick = service
            .maybe_enqueue_scheduled(&config, at("2026-08-06T02:01:30Z"), &mut anchor)
            .await
            .unwrap();
        assert!(tick.is_some());
    }

    // ── schedule config ─────────────────────────────────────────────

    #[tokio::test]
    async fn update_schedule_validates_and_persists() {
        let store = Arc::new(MemStore::new());
        let service = service_with(store.clone(), 30).await;

        let bad = ScheduleConfig {
            enabled: true,
            policy: SchedulePolicy::Daily {
                time: "25:61".to_string(),
            },
            source_ids: None,
        };
        assert!(service.update_schedule(bad).await.is_err());

        let good = ScheduleConfig {
            enabled: true,
            policy: SchedulePolicy::Custom { every_minutes: 30 },
            source_ids: None,
        };
        service.update_schedule(good.clone()).await.unwrap();
        assert_eq!(service.get_schedule().await.unwrap(), good);
    }
}

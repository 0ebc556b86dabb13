//! The [`CatalogStore`] port and its request DTOs.
//!
//! Every component above the persistence layer (duplicate detection,
//! orchestration, the admin API) takes `Arc<dyn CatalogStore>` so tests
//! can inject [`crate::MemStore`] and production wires [`crate::PgStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use kasane_core::model::{
    CatalogEntry, ChapterEntry, ChapterRecord, FetchKind, JobProgress, QueueStats, ScheduleConfig,
    Source, SourceSettings, SyncJob, SyncSummary, TriggerKind, WorkRecord,
};

use crate::error::StoreError;

// ── Request types ────────────────────────────────────────────────────

/// Request body for creating a source.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSource {
    pub name: String,
    pub base_url: String,
    pub fetch_kind: FetchKind,
    /// Defaults to `true` if not provided.
    pub active: Option<bool>,
    #[serde(default)]
    pub config: SourceSettings,
}

/// Request body for updating a source (all fields optional).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSource {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub fetch_kind: Option<FetchKind>,
    pub active: Option<bool>,
    pub config: Option<SourceSettings>,
}

// ── Port ─────────────────────────────────────────────────────────────

/// Persistence operations needed by the ingestion pipeline.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // ── Sources ──────────────────────────────────────────────────────

    async fn create_source(&self, req: CreateSource) -> Result<Source, StoreError>;
    async fn update_source(&self, id: Uuid, req: UpdateSource) -> Result<Source, StoreError>;
    async fn delete_source(&self, id: Uuid) -> Result<(), StoreError>;
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StoreError>;
    /// All sources in stable registry order (creation order).
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError>;
    async fn update_source_last_sync(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ── Catalog reads ────────────────────────────────────────────────

    /// Equality lookup on the (source, source-native id) pair.
    async fn find_work_by_source(
        &self,
        source_id: Uuid,
        source_key: &str,
    ) -> Result<Option<WorkRecord>, StoreError>;

    /// Bounded keyword search over work titles, optionally narrowed by
    /// author substring.
    async fn search_works(
        &self,
        keywords: &[String],
        author: Option<&str>,
        limit: u64,
    ) -> Result<Vec<WorkRecord>, StoreError>;

    /// Chapters of a work whose number falls in `[lo, hi]`.
    async fn chapters_in_range(
        &self,
        work_id: Uuid,
        lo: f64,
        hi: f64,
    ) -> Result<Vec<ChapterRecord>, StoreError>;

    // ── Catalog writes ───────────────────────────────────────────────

    /// Persist a new work as pending approval, including its review-queue
    /// row. Returns the new work id. Does NOT insert the entry's chapters.
    async fn insert_pending_work(&self, entry: &CatalogEntry) -> Result<Uuid, StoreError>;

    /// Persist a new chapter of `work_id` as pending approval, including
    /// its review-queue row. Returns the new chapter id.
    async fn insert_pending_chapter(
        &self,
        work_id: Uuid,
        chapter: &ChapterEntry,
    ) -> Result<Uuid, StoreError>;

    // ── Review queue ─────────────────────────────────────────────────

    async fn queue_stats(&self) -> Result<QueueStats, StoreError>;

    /// Operator accounts with review visibility — the aggregate
    /// notification recipients.
    async fn review_operator_ids(&self) -> Result<Vec<Uuid>, StoreError>;

    // ── Sync jobs ────────────────────────────────────────────────────

    async fn create_job(
        &self,
        trigger: TriggerKind,
        source_ids: Option<Vec<Uuid>>,
    ) -> Result<SyncJob, StoreError>;
    async fn get_job(&self, id: Uuid) -> Result<Option<SyncJob>, StoreError>;
    /// Most recent jobs first.
    async fn list_recent_jobs(&self, limit: u64) -> Result<Vec<SyncJob>, StoreError>;
    async fn running_job(&self) -> Result<Option<SyncJob>, StoreError>;
    /// Oldest pending job, if any.
    async fn next_pending_job(&self) -> Result<Option<SyncJob>, StoreError>;

    /// Atomically promote a Pending job to Running, but only when no other
    /// job is Running — the single-flight gate. Returns `false` when the
    /// job is not pending or another job holds the slot.
    async fn try_start_job(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn update_job_progress(
        &self,
        id: Uuid,
        progress: &JobProgress,
    ) -> Result<(), StoreError>;
    async fn complete_job(&self, id: Uuid, summary: &SyncSummary) -> Result<(), StoreError>;
    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Force-fail Running jobs started before `cutoff` with `reason`.
    /// Returns the jobs that were failed.
    async fn fail_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<SyncJob>, StoreError>;

    // ── Schedule ─────────────────────────────────────────────────────

    async fn get_schedule(&self) -> Result<ScheduleConfig, StoreError>;
    async fn put_schedule(&self, config: &ScheduleConfig) -> Result<(), StoreError>;
}

/// Shared validation applied by both store implementations.
pub(crate) fn validate_create(req: &CreateSource) -> Result<(), StoreError> {
    if req.name.trim().is_empty() {
        return Err(StoreError::InvalidInput("name must not be empty".into()));
    }
    if url::Url::parse(&req.base_url).is_err() {
        return Err(StoreError::InvalidInput(format!(
            "base_url '{}' is not a valid URL",
            req.base_url
        )));
    }
    req.config
        .validate()
        .map_err(|e| StoreError::InvalidInput(e.to_string()))
}

pub(crate) fn validate_update(req: &UpdateSource) -> Result<(), StoreError> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("name must not be empty".into()));
        }
    }
    if let Some(base_url) = &req.base_url {
        if url::Url::parse(base_url).is_err() {
            return Err(StoreError::InvalidInput(format!(
                "base_url '{}' is not a valid URL",
                base_url
            )));
        }
    }
    if let Some(config) = &req.config {
        config
            .validate()
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────

//! In-memory [`CatalogStore`] implementation for tests and PG-less dev mode.
//!
//! Uses `IndexMap` (insertion order = registry order) and `Vec` behind
//! `std::sync::RwLock`. Keyword search is a case-insensitive substring
//! scan over all stored titles.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use kasane_core::model::{
    CatalogEntry, ChapterEntry, ChapterRecord, ContentKind, JobProgress, JobStatus, QueueStats,
    ReviewQueueItem, ReviewStatus, ScheduleConfig, Source, SyncJob, SyncSummary, TriggerKind,
    WorkRecord,
};

use crate::error::StoreError;
use crate::traits::{validate_create, validate_update, CatalogStore, CreateSource, UpdateSource};

/// In-memory store. Cheap to construct per test.
pub struct MemStore {
    sources: RwLock<IndexMap<Uuid, Source>>,
    works: RwLock<IndexMap<Uuid, WorkRecord>>,
    chapters: RwLock<IndexMap<Uuid, ChapterRecord>>,
    queue: RwLock<Vec<ReviewQueueItem>>,
    jobs: RwLock<IndexMap<Uuid, SyncJob>>,
    schedule: RwLock<ScheduleConfig>,
    operators: RwLock<Vec<Uuid>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(IndexMap::new()),
            works: RwLock::new(IndexMap::new()),
            chapters: RwLock::new(IndexMap::new()),
            queue: RwLock::new(Vec::new()),
            jobs: RwLock::new(IndexMap::new()),
            schedule: RwLock::new(ScheduleConfig::default()),
            operators: RwLock::new(Vec::new()),
        }
    }

    /// Register an operator account as a notification recipient.
    pub fn add_operator(&self, id: Uuid) {
        self.operators.write().expect("operators lock poisoned").push(id);
    }

    /// Test hook: number of review-queue rows.
    pub fn queue_len(&self) -> usize {
        self.queue.read().expect("queue lock poisoned").len()
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for MemStore {
    // ── Sources ──────────────────────────────────────────────────────

    async fn create_source(&self, req: CreateSource) -> Result<Source, StoreError> {
        validate_create(&req)?;
        let mut sources = self.sources.write().expect("sources lock poisoned");
        if sources.values().any(|s| s.name == req.name) {
            return Err(StoreError::DuplicateName(req.name));
        }
        let now = Utc::now();
        let source = Source {
            id: Uuid::new_v4(),
            name: req.name,
            base_url: req.base_url,
            fetch_kind: req.fetch_kind,
            active: req.active.unwrap_or(true),
            config: req.config,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        sources.insert(source.id, source.clone());
        Ok(source)
    }

    async fn update_source(&self, id: Uuid, req: UpdateSource) -> Result<Source, StoreError> {
        validate_update(&req)?;
        let mut sources = self.sources.write().expect("sources lock poisoned");
        if let Some(name) = &req.name {
            if sources.values().any(|s| s.name == *name && s.id != id) {
                return Err(StoreError::DuplicateName(name.clone()));
            }
        }
        let source = sources.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(name) = req.name {
            source.name = name;
        }
        if let Some(base_url) = req.base_url {
            source.base_url = base_url;
        }
        if let Some(fetch_kind) = req.fetch_kind {
            source.fetch_kind = fetch_kind;
        }
        if let Some(active) = req.active {
            source.active = active;
        }
        if let Some(config) = req.config {
            source.config = config;
        }
        source.updated_at = Utc::now();
        Ok(source.clone())
    }

    async fn delete_source(&self, id: Uuid) -> Result<(), StoreError> {
        let mut sources = self.sources.write().expect("sources lock poisoned");
        sources.shift_remove(&id).ok_or(StoreError::NotFound(id))?;
        Ok(())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StoreError> {
        Ok(self
            .sources
            .read()
            .expect("sources lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self
            .sources
            .read()
            .expect("sources lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn update_source_last_sync(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sources = self.sources.write().expect("sources lock poisoned");
        let source = sources.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        source.last_sync_at = Some(at);
        source.updated_at = Utc::now();
        Ok(())
    }

    // ── Catalog reads ────────────────────────────────────────────────

    async fn find_work_by_source(
        &self,
        source_id: Uuid,
        source_key: &str,
    ) -> Result<Option<WorkRecord>, StoreError> {
        Ok(self
            .works
            .read()
            .expect("works lock poisoned")
            .values()
            .find(|w| w.source_id == Some(source_id) && w.source_key.as_deref() == Some(source_key))
            .cloned())
    }

    async fn search_works(
        &self,
        keywords: &[String],
        author: Option<&str>,
        limit: u64,
    ) -> Result<Vec<WorkRecord>, StoreError> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let author_needle = author.map(|a| a.to_lowercase());
        let works = self.works.read().expect("works lock poisoned");
        let mut hits = Vec::new();
        for work in works.values() {
            let title = work.title.to_lowercase();
            if !needles.iter().any(|n| title.contains(n.as_str())) {
                continue;
            }
            if let Some(needle) = &author_needle {
                match &work.author {
                    Some(a) if a.to_lowercase().contains(needle.as_str()) => {}
                    _ => continue,
                }
            }
            hits.push(work.clone());
            if hits.len() as u64 >= limit {
                break;
            }
        }
        Ok(hits)
    }

    async fn chapters_in_range(
        &self,
        work_id: Uuid,
        lo: f64,
        hi: f64,
    ) -> Result<Vec<ChapterRecord>, StoreError> {
        let mut hits: Vec<ChapterRecord> = self
            .chapters
            .read()
            .expect("chapters lock poisoned")
            .values()
            .filter(|c| c.work_id == work_id && c.number >= lo && c.number <= hi)
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.number.partial_cmp(&b.number).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }

    // ── Catalog writes ───────────────────────────────────────────────

    async fn insert_pending_work(&self, entry: &CatalogEntry) -> Result<Uuid, StoreError> {
        let work = WorkRecord {
            id: Uuid::new_v4(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            author: entry.author.clone(),
            artist: entry.artist.clone(),
            genres: entry.genres.clone(),
            status: entry.status,
            kind: entry.kind,
            cover_url: entry.cover_url.clone(),
            source_id: Some(entry.source_id),
            source_key: Some(entry.source_key.clone()),
            approval: ReviewStatus::Pending,
            created_at: Utc::now(),
        };
        let id = work.id;
        self.works
            .write()
            .expect("works lock poisoned")
            .insert(id, work);
        self.queue
            .write()
            .expect("queue lock poisoned")
            .push(ReviewQueueItem {
                id: Uuid::new_v4(),
                content_kind: ContentKind::Work,
                content_id: id,
                priority: 0,
                submitted_by: None,
                submitted_at: Utc::now(),
                status: ReviewStatus::Pending,
            });
        Ok(id)
    }

    async fn insert_pending_chapter(
        &self,
        work_id: Uuid,
        chapter: &ChapterEntry,
    ) -> Result<Uuid, StoreError> {
        if !self
            .works
            .read()
            .expect("works lock poisoned")
            .contains_key(&work_id)
        {
            return Err(StoreError::NotFound(work_id));
        }
        let record = ChapterRecord {
            id: Uuid::new_v4(),
            work_id,
            number: chapter.number,
            title: chapter.title.clone(),
            pages: chapter.pages.clone(),
            source_key: Some(chapter.source_key.clone()),
            approval: ReviewStatus::Pending,
            created_at: Utc::now(),
        };
        let id = record.id;
        self.chapters
            .write()
            .expect("chapters lock poisoned")
            .insert(id, record);
        self.queue
            .write()
            .expect("queue lock poisoned")
            .push(ReviewQueueItem {
                id: Uuid::new_v4(),
                content_kind: ContentKind::Chapter,
                content_id: id,
                priority: 0,
                submitted_by: None,
                submitted_at: Utc::now(),
                status: ReviewStatus::Pending,
            });
        Ok(id)
    }

    // ── Review queue ─────────────────────────────────────────────────

    async fn queue_stats(&self) -> Result<QueueStats, StoreError> {
        let queue = self.queue.read().expect("queue lock poisoned");
        let mut stats = QueueStats::default();
        for item in queue.iter() {
            match item.status {
                ReviewStatus::Pending => {
                    stats.pending += 1;
                    match item.content_kind {
                        ContentKind::Work => stats.pending_works += 1,
                        ContentKind::Chapter => stats.pending_chapters += 1,
                    }
                }
                ReviewStatus::Approved => stats.approved += 1,
                ReviewStatus::Rejected => stats.rejected += 1,
            }
        }
        Ok(stats)
    }

    async fn review_operator_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.operators.read().expect("operators lock poisoned").clone())
    }

    // ── Sync jobs ────────────────────────────────────────────────────

    async fn create_job(
        &self,
        trigger: TriggerKind,
        source_ids: Option<Vec<Uuid>>,
    ) -> Result<SyncJob, StoreError> {
        let job = SyncJob {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            trigger,
            source_ids,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: JobProgress::default(),
            result: None,
            error: None,
        };
        self.jobs
            .write()
            .expect("jobs lock poisoned")
            .insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<SyncJob>, StoreError> {
        Ok(self.jobs.read().expect("jobs lock poisoned").get(&id).cloned())
    }

    async fn list_recent_jobs(&self, limit: u64) -> Result<Vec<SyncJob>, StoreError> {
        let jobs = self.jobs.read().expect("jobs lock poisoned");
        Ok(jobs.values().rev().take(limit as usize).cloned().collect())
    }

    async fn running_job(&self) -> Result<Option<SyncJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .expect("jobs lock poisoned")
            .values()
            .find(|j| j.status == JobStatus::Running)
            .cloned())
    }

    async fn next_pending_job(&self) -> Result<Option<SyncJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .expect("jobs lock poisoned")
            .values()
            .find(|j| j.status == JobStatus::Pending)
            .cloned())
    }

    async fn try_start_job(&self, id: Uuid) -> Result<bool, StoreError> {
        // Single write lock covers the running-check and the promotion,
        // so two workers cannot both observe "no running job".
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        if jobs.values().any(|j| j.status == JobStatus::Running) {
            return Ok(false);
        }
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_job_progress(
        &self,
        id: Uuid,
        progress: &JobProgress,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.progress = progress.clone();
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, summary: &SyncSummary) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = Some(summary.clone());
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error = Some(error.to_string());
        Ok(())
    }

    async fn fail_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<SyncJob>, StoreError> {
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        let mut failed = Vec::new();
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running
                && job.started_at.map(|t| t < cutoff).unwrap_or(false)
            {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error = Some(reason.to_string());
                failed.push(job.clone());
            }
        }
        Ok(failed)
    }

    // ── Schedule ─────────────────────────────────────────────────────

    async fn get_schedule(&self) -> Result<ScheduleConfig, StoreError> {
        Ok(self.schedule.read().expect("schedule lock poisoned").clone())
    }

    async fn put_schedule(&self, config: &ScheduleConfig) -> Result<(), StoreError> {
        *self.schedule.write().expect("schedule lock poisoned") = config.clone();
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

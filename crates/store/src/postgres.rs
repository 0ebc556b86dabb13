//! PostgreSQL [`CatalogStore`] implementation.
//!
//! String SQL with binds via `sqlx::query_as`, `COALESCE` partial updates,
//! and unique-violation (23505) mapping to [`StoreError::DuplicateName`].
//! Enum columns are stored as text and parsed on read; flexible fields
//! (source config, job progress/result, genres, pages) are JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, info, warn};
use uuid::Uuid;

use kasane_core::model::{
    CatalogEntry, ChapterEntry, ChapterRecord, FetchKind, JobProgress, JobStatus, QueueStats,
    ReviewStatus, ScheduleConfig, Source, SourceSettings, SyncJob, SyncSummary, TriggerKind,
    WorkKind, WorkRecord, WorkStatus,
};

use crate::error::StoreError;
use crate::traits::{validate_create, validate_update, CatalogStore, CreateSource, UpdateSource};

/// Create a PostgreSQL connection pool and run migrations.
/// Returns `None` if no connection URL is configured.
pub async fn init_pg_pool(config: &kasane_core::config::PostgresConfig) -> Option<PgPool> {
    let url = config.database_url();
    if url.is_empty() {
        warn!("PostgreSQL not configured — falling back to the in-memory store");
        return None;
    }

    match PgPool::connect(&url).await {
        Ok(pool) => {
            info!("PostgreSQL connected: {}", config.host);
            match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(_) => {
                    info!("Database migrations applied successfully");
                    Some(pool)
                }
                Err(e) => {
                    warn!("Failed to run migrations: {} — falling back to the in-memory store", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("Failed to connect to PostgreSQL: {} — falling back to the in-memory store", e);
            None
        }
    }
}

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

#[derive(FromRow)]
struct SourceRow {
    id: Uuid,
    name: String,
    base_url: String,
    fetch_kind: String,
    active: bool,
    config_json: serde_json::Value,
    last_sync_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SourceRow {
    fn into_source(self) -> Source {
        let config: SourceSettings =
            serde_json::from_value(self.config_json).unwrap_or_default();
        Source {
            id: self.id,
            name: self.name,
            base_url: self.base_url,
            fetch_kind: parse_fetch_kind(&self.fetch_kind),
            active: self.active,
            config,
            last_sync_at: self.last_sync_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct WorkRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    author: Option<String>,
    artist: Option<String>,
    genres: serde_json::Value,
    status: String,
    kind: String,
    cover_url: Option<String>,
    source_id: Option<Uuid>,
    source_key: Option<String>,
    approval: String,
    created_at: DateTime<Utc>,
}

impl WorkRow {
    fn into_work(self) -> WorkRecord {
        WorkRecord {
            id: self.id,
            title: self.title,
            description: self.description,
            author: self.author,
            artist: self.artist,
            genres: serde_json::from_value(self.genres).unwrap_or_default(),
            status: parse_work_status(&self.status),
            kind: parse_work_kind(&self.kind),
            cover_url: self.cover_url,
            source_id: self.source_id,
            source_key: self.source_key,
            approval: parse_review_status(&self.approval),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChapterRow {
    id: Uuid,
    work_id: Uuid,
    number: f64,
    title: Option<String>,
    pages: serde_json::Value,
    source_key: Option<String>,
    approval: String,
    created_at: DateTime<Utc>,
}

impl ChapterRow {
    fn into_chapter(self) -> ChapterRecord {
        ChapterRecord {
            id: self.id,
            work_id: self.work_id,
            number: self.number,
            title: self.title,
            pages: serde_json::from_value(self.pages).unwrap_or_default(),
            source_key: self.source_key,
            approval: parse_review_status(&self.approval),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    trigger_kind: String,
    source_ids: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    progress: serde_json::Value,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

impl JobRow {
    fn into_job(self) -> SyncJob {
        SyncJob {
            id: self.id,
            status: parse_job_status(&self.status),
            trigger: if self.trigger_kind == "scheduled" {
                TriggerKind::Scheduled
            } else {
                TriggerKind::Manual
            },
            source_ids: self
                .source_ids
                .and_then(|v| serde_json::from_value(v).ok()),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            progress: serde_json::from_value(self.progress).unwrap_or_default(),
            result: self.result.and_then(|v| serde_json::from_value(v).ok()),
            error: self.error,
        }
    }
}

fn parse_fetch_kind(s: &str) -> FetchKind {
    if s == "scraping" {
        FetchKind::Scraping
    } else {
        FetchKind::Api
    }
}

fn parse_work_status(s: &str) -> WorkStatus {
    match s {
        "completed" => WorkStatus::Completed,
        "hiatus" => WorkStatus::Hiatus,
        "cancelled" => WorkStatus::Cancelled,
        _ => WorkStatus::Ongoing,
    }
}

fn parse_work_kind(s: &str) -> WorkKind {
    match s {
        "manhwa" => WorkKind::Manhwa,
        "manhua" => WorkKind::Manhua,
        _ => WorkKind::Manga,
    }
}

fn parse_review_status(s: &str) -> ReviewStatus {
    match s {
        "approved" => ReviewStatus::Approved,
        "rejected" => ReviewStatus::Rejected,
        _ => ReviewStatus::Pending,
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn fetch_kind_str(kind: FetchKind) -> &'static str {
    match kind {
        FetchKind::Api => "api",
        FetchKind::Scraping => "scraping",
    }
}

const SOURCE_COLUMNS: &str = "id, name, base_url, fetch_kind, active, config_json, \
     last_sync_at, created_at, updated_at";

const WORK_COLUMNS: &str = "id, title, description, author, artist, genres, status, kind, \
     cover_url, source_id, source_key, approval, created_at";

const CHAPTER_COLUMNS: &str =
    "id, work_id, number, title, pages, source_key, approval, created_at";

const JOB_COLUMNS: &str = "id, status, trigger_kind, source_ids, created_at, started_at, \
     completed_at, progress, result, error";

/// Map a PostgreSQL unique violation (23505) to a friendly `DuplicateName` error.
fn map_unique_violation(e: sqlx::Error, name: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateName(name.to_string());
        }
    }
    error!("catalog store database error: {}", e);
    StoreError::Database(e)
}

// ── Store impl ───────────────────────────────────────────────────────

#[async_trait]
impl CatalogStore for PgStore {
    async fn create_source(&self, req: CreateSource) -> Result<Source, StoreError> {
        validate_create(&req)?;
        let config_json = serde_json::to_value(&req.config)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let result = sqlx::query_as::<_, SourceRow>(&format!(
            "INSERT INTO sources (name, base_url, fetch_kind, active, config_json)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            SOURCE_COLUMNS
        ))
        .bind(&req.name)
        .bind(&req.base_url)
        .bind(fetch_kind_str(req.fetch_kind))
        .bind(req.active.unwrap_or(true))
        .bind(&config_json)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into_source()),
            Err(e) => Err(map_unique_violation(e, &req.name)),
        }
    }

    async fn update_source(&self, id: Uuid, req: UpdateSource) -> Result<Source, StoreError> {
        validate_update(&req)?;
        let config_json = match &req.config {
            Some(config) => Some(
                serde_json::to_value(config)
                    .map_err(|e| StoreError::InvalidInput(e.to_string()))?,
            ),
            None => None,
        };
        let result = sqlx::query_as::<_, SourceRow>(&format!(
            "UPDATE sources SET
                name = COALESCE($2, name),
                base_url = COALESCE($3, base_url),
                fetch_kind = COALESCE($4, fetch_kind),
                active = COALESCE($5, active),
                config_json = COALESCE($6, config_json),
                updated_at = now()
             WHERE id = $1
             RETURNING {}",
            SOURCE_COLUMNS
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&req.base_url)
        .bind(req.fetch_kind.map(fetch_kind_str))
        .bind(req.active)
        .bind(&config_json)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => Ok(row.into_source()),
            Ok(None) => Err(StoreError::NotFound(id)),
            Err(e) => Err(map_unique_violation(e, req.name.as_deref().unwrap_or(""))),
        }
    }

    async fn delete_source(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StoreError> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {} FROM sources WHERE id = $1",
            SOURCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SourceRow::into_source))
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {} FROM sources ORDER BY created_at ASC",
            SOURCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SourceRow::into_source).collect())
    }

    async fn update_source_last_sync(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sources SET last_sync_at = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn find_work_by_source(
        &self,
        source_id: Uuid,
        source_key: &str,
    ) -> Result<Option<WorkRecord>, StoreError> {
        let row = sqlx::query_as::<_, WorkRow>(&format!(
            "SELECT {} FROM works WHERE source_id = $1 AND source_key = $2",
            WORK_COLUMNS
        ))
        .bind(source_id)
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WorkRow::into_work))
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
        let patterns: Vec<String> = keywords.iter().map(|k| format!("%{}%", k)).collect();
        let author_pattern = author.map(|a| format!("%{}%", a));
        let rows = sqlx::query_as::<_, WorkRow>(&format!(
            "SELECT {} FROM works
             WHERE title ILIKE ANY($1)
               AND ($2::text IS NULL OR author ILIKE $2)
             ORDER BY created_at ASC
             LIMIT $3",
            WORK_COLUMNS
        ))
        .bind(&patterns)
        .bind(&author_pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WorkRow::into_work).collect())
    }

    async fn chapters_in_range(
        &self,
        work_id: Uuid,
        lo: f64,
        hi: f64,
    ) -> Result<Vec<ChapterRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ChapterRow>(&format!(
            "SELECT {} FROM chapters
             WHERE work_id = $1 AND number >= $2 AND number <= $3
             ORDER BY number ASC",
            CHAPTER_COLUMNS
        ))
        .bind(work_id)
        .bind(lo)
        .bind(hi)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChapterRow::into_chapter).collect())
    }

    async fn insert_pending_work(&self, entry: &CatalogEntry) -> Result<Uuid, StoreError> {
        let genres = serde_json::to_value(&entry.genres)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let mut tx = self.pool.begin().await?;
        let work_id: Uuid = sqlx::query_scalar(
            "INSERT INTO works
                (title, description, author, artist, genres, status, kind,
                 cover_url, source_id, source_key, approval)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
             RETURNING id",
        )
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(&entry.author)
        .bind(&entry.artist)
        .bind(&genres)
        .bind(entry.status.as_str())
        .bind(entry.kind.as_str())
        .bind(&entry.cover_url)
        .bind(entry.source_id)
        .bind(&entry.source_key)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO review_queue (content_kind, content_id, status)
             VALUES ('work', $1, 'pending')",
        )
        .bind(work_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(work_id)
    }

    async fn insert_pending_chapter(
        &self,
        work_id: Uuid,
        chapter: &ChapterEntry,
    ) -> Result<Uuid, StoreError> {
        let pages = serde_json::to_value(&chapter.pages)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let mut tx = self.pool.begin().await?;
        let chapter_id: Uuid = sqlx::query_scalar(
            "INSERT INTO chapters (work_id, number, title, pages, source_key, approval)
             VALUES ($1, $2, $3, $4, $5, 'pending')
             RETURNING id",
        )
        .bind(work_id)
        .bind(chapter.number)
        .bind(&chapter.title)
        .bind(&pages)
        .bind(&chapter.source_key)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO review_queue (content_kind, content_id, status)
             VALUES ('chapter', $1, 'pending')",
        )
        .bind(chapter_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(chapter_id)
    }

    async fn queue_stats(&self) -> Result<QueueStats, StoreError> {
        #[derive(FromRow)]
        struct StatsRow {
            pending: i64,
            approved: i64,
            rejected: i64,
            pending_works: i64,
            pending_chapters: i64,
        }
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                COUNT(*) FILTER (WHERE status = 'pending' AND content_kind = 'work')
                    AS pending_works,
                COUNT(*) FILTER (WHERE status = 'pending' AND content_kind = 'chapter')
                    AS pending_chapters
             FROM review_queue",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(QueueStats {
            pending: row.pending as u64,
            approved: row.approved as u64,
            rejected: row.rejected as u64,
            pending_works: row.pending_works as u64,
            pending_chapters: row.pending_chapters as u64,
        })
    }

    async fn review_operator_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM operators WHERE role IN ('admin', 'moderator')",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn create_job(
        &self,
        trigger: TriggerKind,
        source_ids: Option<Vec<Uuid>>,
    ) -> Result<SyncJob, StoreError> {
        let scope = match &source_ids {
            Some(ids) => Some(
                serde_json::to_value(ids)
                    .map_err(|e| StoreError::InvalidInput(e.to_string()))?,
            ),
            None => None,
        };
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO sync_jobs (status, trigger_kind, source_ids, progress)
             VALUES ('pending', $1, $2, '{{}}'::jsonb)
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(if trigger == TriggerKind::Scheduled {
            "scheduled"
        } else {
            "manual"
        })
        .bind(&scope)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_job())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<SyncJob>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM sync_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(JobRow::into_job))
    }

    async fn list_recent_jobs(&self, limit: u64) -> Result<Vec<SyncJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM sync_jobs ORDER BY created_at DESC LIMIT $1",
            JOB_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    async fn running_job(&self) -> Result<Option<SyncJob>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM sync_jobs WHERE status = 'running' LIMIT 1",
            JOB_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(JobRow::into_job))
    }

    async fn next_pending_job(&self) -> Result<Option<SyncJob>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM sync_jobs WHERE status = 'pending'
             ORDER BY created_at ASC LIMIT 1",
            JOB_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(JobRow::into_job))
    }

    async fn try_start_job(&self, id: Uuid) -> Result<bool, StoreError> {
        // Single statement: the NOT EXISTS guard and the promotion are
        // atomic, which is what upholds the single-flight invariant.
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'running', started_at = now()
             WHERE id = $1 AND status = 'pending'
               AND NOT EXISTS (SELECT 1 FROM sync_jobs WHERE status = 'running')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_job_progress(
        &self,
        id: Uuid,
        progress: &JobProgress,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(progress)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let result = sqlx::query("UPDATE sync_jobs SET progress = $2 WHERE id = $1")
            .bind(id)
            .bind(&value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, summary: &SyncSummary) -> Result<(), StoreError> {
        let value = serde_json::to_value(summary)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'completed', completed_at = now(), result = $2
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'failed', completed_at = now(), error = $2
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn fail_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<SyncJob>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE sync_jobs SET status = 'failed', completed_at = now(), error = $2
             WHERE status = 'running' AND started_at < $1
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(cutoff)
        .bind(reason)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    async fn get_schedule(&self) -> Result<ScheduleConfig, StoreError> {
        let value: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT config FROM schedule_config WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    async fn put_schedule(&self, config: &ScheduleConfig) -> Result<(), StoreError> {
        let value = serde_json::to_value(config)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        sqlx::query(
            "INSERT INTO schedule_config (id, config) VALUES (1, $1)
             ON CONFLICT (id) DO UPDATE SET config = $1, updated_at = now()",
        )
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

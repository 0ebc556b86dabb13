//! Domain model for the ingestion pipeline.
//!
//! Transient types ([`CatalogEntry`], [`ChapterEntry`]) exist only during a
//! single sync pass and are never persisted directly. Persisted rows
//! ([`WorkRecord`], [`ChapterRecord`], [`ReviewQueueItem`], [`SyncJob`]) map
//! 1:1 onto the migration schema.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KasaneError;

// ── Work classification ──────────────────────────────────────────────

/// Publication status of a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
}

impl Default for WorkStatus {
    fn default() -> Self {
        Self::Ongoing
    }
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Hiatus => "hiatus",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Regional kind of a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    Manga,
    Manhwa,
    Manhua,
}

impl Default for WorkKind {
    fn default() -> Self {
        Self::Manga
    }
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manga => "manga",
            Self::Manhwa => "manhwa",
            Self::Manhua => "manhua",
        }
    }
}

// ── Sources ──────────────────────────────────────────────────────────

/// How catalog data is retrieved from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// JSON API endpoint.
    Api,
    /// HTML scraping. Accepted in config, not executed in-process.
    Scraping,
}

/// CSS selectors for scraping sources. Stored for operators staging such
/// sources; the pipeline itself never runs a scrape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeSelectors {
    pub list: Option<String>,
    pub title: Option<String>,
    pub cover: Option<String>,
    pub chapter: Option<String>,
}

/// Source-specific settings, stored as JSONB in `sources.config_json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSettings {
    /// API key sent as the `X-Api-Key` header when present.
    pub api_key: Option<String>,
    /// Extra headers applied to every request to this source.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Requests-per-minute limit. Must be > 0 when present.
    pub rate_limit: Option<u32>,
    pub selectors: Option<ScrapeSelectors>,
}

impl SourceSettings {
    /// Validate invariants that the store enforces on create/update.
    pub fn validate(&self) -> Result<(), KasaneError> {
        if let Some(limit) = self.rate_limit {
            if limit == 0 {
                return Err(KasaneError::InvalidInput(
                    "rate_limit must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Row from the `sources` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub fetch_kind: FetchKind,
    pub active: bool,
    pub config: SourceSettings,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Inter-source pacing delay in milliseconds derived from the
    /// configured rate limit, or `default_ms` when no limit is set.
    pub fn pacing_delay_ms(&self, default_ms: u64) -> u64 {
        match self.config.rate_limit {
            Some(limit) if limit > 0 => 60_000 / limit as u64,
            _ => default_ms,
        }
    }
}

// ── Canonical (transient) catalog entries ────────────────────────────

/// Normalized representation of one work as fetched from a source.
///
/// Exists only during a sync pass: it is either discarded as a duplicate
/// or converted into pending `works`/`chapters` rows plus review-queue rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub status: WorkStatus,
    pub cover_url: Option<String>,
    #[serde(default)]
    pub kind: WorkKind,
    pub source_id: Uuid,
    /// The source's own identifier for this work.
    pub source_key: String,
    #[serde(default)]
    pub chapters: Vec<ChapterEntry>,
}

/// Normalized representation of one chapter as fetched from a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterEntry {
    /// Chapter number; fractional values represent sub-chapters (10.5).
    pub number: f64,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    pub source_key: String,
}

// ── Persisted catalog rows ───────────────────────────────────────────

/// Row from the `works` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub status: WorkStatus,
    pub kind: WorkKind,
    pub cover_url: Option<String>,
    pub source_id: Option<Uuid>,
    pub source_key: Option<String>,
    pub approval: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

/// Row from the `chapters` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: Uuid,
    pub work_id: Uuid,
    pub number: f64,
    pub title: Option<String>,
    pub pages: Vec<String>,
    pub source_key: Option<String>,
    pub approval: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

// ── Review queue ─────────────────────────────────────────────────────

/// What a review-queue row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Work,
    Chapter,
}

/// Review state of a queued submission (and of the underlying row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// Row from the `review_queue` table.
///
/// Created by the orchestrator for every accepted new work/chapter;
/// mutated by reviewer actions (an external collaborator); never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: Uuid,
    pub content_kind: ContentKind,
    pub content_id: Uuid,
    pub priority: i32,
    /// `None` means the automated pipeline submitted it.
    pub submitted_by: Option<Uuid>,
    pub submitted_at: DateTime<Utc>,
    pub status: ReviewStatus,
}

/// Aggregate statistics over the review queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub pending_works: u64,
    pub pending_chapters: u64,
}

// ── Sync jobs ────────────────────────────────────────────────────────

/// Lifecycle state of a sync job. Terminal once Completed or Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// How a job was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Scheduled,
}

/// Live progress of a running job. Stored as JSONB on the job row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    /// Human-readable current step, e.g. "fetching mangadex".
    pub step: String,
    pub works_processed: u64,
    pub chapters_processed: u64,
    pub errors: u64,
}

/// Final result of a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    pub new_works: u64,
    pub new_chapters: u64,
    pub duplicates_skipped: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SyncSummary {
    /// Count of items that entered the review queue this run.
    pub fn pending_review(&self) -> u64 {
        self.new_works + self.new_chapters
    }

    /// Fold another summary into this one.
    pub fn absorb(&mut self, other: SyncSummary) {
        self.new_works += other.new_works;
        self.new_chapters += other.new_chapters;
        self.duplicates_skipped += other.duplicates_skipped;
        self.errors.extend(other.errors);
    }
}

/// Row from the `sync_jobs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub trigger: TriggerKind,
    /// Optional restriction to a subset of sources.
    pub source_ids: Option<Vec<Uuid>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: JobProgress,
    pub result: Option<SyncSummary>,
    pub error: Option<String>,
}

// ── Schedule configuration ───────────────────────────────────────────

/// When scheduled syncs fire. Tagged by `interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "interval", rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// Top of every hour.
    Hourly,
    /// Once a day at `time` ("HH:MM", 24h).
    Daily { time: String },
    /// Once a week on `day` (0 = Sunday) at `time`.
    Weekly { day: u8, time: String },
    /// Every `every_minutes` minutes, measured from the last fire.
    Custom { every_minutes: u32 },
}

/// Process-wide sync schedule. Loaded at startup, mutable via the admin
/// API; the trigger loop re-reads it every tick so changes apply
/// immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub policy: SchedulePolicy,
    /// Optional restriction to a subset of sources.
    pub source_ids: Option<Vec<Uuid>>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: SchedulePolicy::Daily {
                time: "02:00".to_string(),
            },
            source_ids: None,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), KasaneError> {
        match &self.policy {
            SchedulePolicy::Hourly => Ok(()),
            SchedulePolicy::Daily { time } => parse_hhmm(time).map(|_| ()),
            SchedulePolicy::Weekly { day, time } => {
                if *day > 6 {
                    return Err(KasaneError::InvalidInput(format!(
                        "day must be 0-6 (got {})",
                        day
                    )));
                }
                parse_hhmm(time).map(|_| ())
            }
            SchedulePolicy::Custom { every_minutes } => {
                if *every_minutes == 0 {
                    return Err(KasaneError::InvalidInput(
                        "every_minutes must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Parse a 24h "HH:MM" string into (hour, minute).
pub fn parse_hhmm(s: &str) -> Result<(u8, u8), KasaneError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| KasaneError::InvalidInput(format!("invalid time '{}': expected HH:MM", s)))?;
    let hour: u8 = h
        .parse()
        .map_err(|_| KasaneError::InvalidInput(format!("invalid hour in '{}'", s)))?;
    let minute: u8 = m
        .parse()
        .map_err(|_| KasaneError::InvalidInput(format!("invalid minute in '{}'", s)))?;
    if hour > 23 || minute > 59 {
        return Err(KasaneError::InvalidInput(format!(
            "time '{}' out of range",
            s
        )));
    }
    Ok((hour, minute))
}

// ── Tests ────────────────────────────────────────────────────────────

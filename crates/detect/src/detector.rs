//! Work- and chapter-level duplicate classification.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use kasane_core::config::SyncConfig;
use kasane_core::model::{ChapterRecord, WorkRecord};
use kasane_store::{CatalogStore, StoreError};

use crate::text::{significant_words, similarity};

/// Title similarity above which an in-range chapter with a non-exact
/// number is still considered the same chapter.
const CHAPTER_TITLE_SIMILARITY: f64 = 0.9;

/// Maximum significant title words used for candidate lookup.
const MAX_KEYWORDS: usize = 5;

// ── Configuration ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Weighted-similarity threshold at or above which a work is a duplicate.
    pub title_threshold: f64,
    /// Chapter-number tolerance for range matching.
    pub chapter_tolerance: f64,
    /// Bounded candidate-set size for keyword lookups.
    pub max_candidates: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.85,
            chapter_tolerance: 0.1,
            max_candidates: 20,
        }
    }
}

impl DetectorConfig {
    pub fn from_sync(sync: &SyncConfig) -> Self {
        Self {
            title_threshold: sync.title_threshold,
            chapter_tolerance: sync.chapter_tolerance,
            max_candidates: sync.max_candidates,
        }
    }
}

// ── Inputs / outputs ─────────────────────────────────────────────────

/// What we know about an incoming work when checking for duplicates.
#[derive(Debug, Clone, Default)]
pub struct WorkQuery {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub source_id: Option<Uuid>,
    pub source_key: Option<String>,
}

/// The existing work an incoming entry matched against.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedWork {
    pub id: Uuid,
    pub title: String,
    pub similarity: f64,
}

/// Outcome of a work-level duplicate check.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateResult {
    pub is_duplicate: bool,
    /// Confidence in [0,1]; forced to 1.0 on an exact source match.
    pub confidence: f64,
    pub matched: Option<MatchedWork>,
    pub reasons: Vec<String>,
}

impl DuplicateResult {
    fn unique() -> Self {
        Self {
            is_duplicate: false,
            confidence: 0.0,
            matched: None,
            reasons: Vec::new(),
        }
    }
}

/// Outcome of a chapter-level duplicate check.
#[derive(Debug, Clone)]
pub struct ChapterDuplicate {
    pub is_duplicate: bool,
    pub existing: Option<ChapterRecord>,
}

// ── Detector ─────────────────────────────────────────────────────────

/// Classifies incoming entries against the persisted catalog.
pub struct DuplicateDetector {
    store: Arc<dyn CatalogStore>,
    config: DetectorConfig,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn CatalogStore>, config: DetectorConfig) -> Self {
        Self { store, config }
    }

    /// Check an incoming work against the catalog.
    ///
    /// 1. An exact (source, native-id) pair match short-circuits at
    ///    confidence 1.0 — cheapest and most certain.
    /// 2. Otherwise fetch a bounded candidate set by title keywords
    ///    (optionally narrowed by author) and score each with
    ///    [`weighted_similarity`]. The best candidate decides.
    pub async fn check_work(&self, query: &WorkQuery) -> Result<DuplicateResult, StoreError> {
        if let (Some(source_id), Some(source_key)) = (query.source_id, query.source_key.as_deref())
        {
            if let Some(existing) = self.store.find_work_by_source(source_id, source_key).await? {
                return Ok(DuplicateResult {
                    is_duplicate: true,
                    confidence: 1.0,
                    matched: Some(MatchedWork {
                        id: existing.id,
                        title: existing.title,
                        similarity: 1.0,
                    }),
                    reasons: vec![format!(
                        "exact source match on native id '{}'",
                        source_key
                    )],
                });
            }
        }

        let keywords = significant_words(&query.title, MAX_KEYWORDS);
        if keywords.is_empty() {
            debug!(title = %query.title, "no significant keywords — treating as unique");
            return Ok(DuplicateResult::unique());
        }

        let candidates = self
            .store
            .search_works(&keywords, query.author.as_deref(), self.config.max_candidates)
            .await?;

        let mut best: Option<(f64, &WorkRecord)> = None;
        for candidate in &candidates {
            let score = weighted_similarity(query, candidate);
            match best {
                None => best = Some((score, candidate)),
                Some((best_score, _)) if score > best_score => best = Some((score, candidate)),
                _ => {}
            }
        }

        let (score, candidate) = match best {
            Some(found) => found,
            None => return Ok(DuplicateResult::unique()),
        };

        let is_duplicate = score >= self.config.title_threshold;
        let mut reasons = Vec::new();
        if is_duplicate {
            reasons.push(format!(
                "similarity {:.2} meets threshold {:.2} against '{}'",
                score, self.config.title_threshold, candidate.title
            ));
        } else {
            reasons.push(format!(
                "best similarity {:.2} below threshold {:.2}",
                score, self.config.title_threshold
            ));
        }

        Ok(DuplicateResult {
            is_duplicate,
            confidence: score,
            matched: Some(MatchedWork {
                id: candidate.id,
                title: candidate.title.clone(),
                similarity: score,
            }),
            reasons,
        })
    }

    /// Check one incoming chapter against the stored chapters of `work_id`.
    ///
    /// Runs independently per chapter so new chapters can be merged into an
    /// already-known work while existing ones are skipped.
    pub async fn check_chapter(
        &self,
        work_id: Uuid,
        number: f64,
        title: Option<&str>,
    ) -> Result<ChapterDuplicate, StoreError> {
        let tolerance = self.config.chapter_tolerance;
        let candidates = self
            .store
            .chapters_in_range(work_id, number - tolerance, number + tolerance)
            .await?;

        // Exact numeric match is always a duplicate.
        if let Some(exact) = candidates
            .iter()
            .find(|c| (c.number - number).abs() < f64::EPSILON)
        {
            return Ok(ChapterDuplicate {
                is_duplicate: true,
                existing: Some(exact.clone()),
            });
        }

        // A near-number candidate with a near-identical title also counts.
        if let Some(incoming_title) = title {
            for candidate in &candidates {
                if let Some(existing_title) = &candidate.title {
                    if similarity(incoming_title, existing_title) > CHAPTER_TITLE_SIMILARITY {
                        return Ok(ChapterDuplicate {
                            is_duplicate: true,
                            existing: Some(candidate.clone()),
                        });
                    }
                }
            }
        }

        Ok(ChapterDuplicate {
            is_duplicate: false,
            existing: None,
        })
    }
}

/// Weighted similarity between an incoming query and a stored work.
///
/// Title weighs 0.6; author 0.3 and description 0.1 count only when both
/// sides are present. The sum is divided by the weights actually applied so
/// missing fields do not drag the score down.
pub fn weighted_similarity(query: &WorkQuery, candidate: &WorkRecord) -> f64 {
    let mut score = 0.6 * similarity(&query.title, &candidate.title);
    let mut total_weight = 0.6;

    if let (Some(qa), Some(ca)) = (query.author.as_deref(), candidate.author.as_deref()) {
        score += 0.3 * similarity(qa, ca);
        total_weight += 0.3;
    }
    if let (Some(qd), Some(cd)) = (
        query.description.as_deref(),
        candidate.description.as_deref(),
    ) {
        score += 0.1 * similarity(qd, cd);
        total_weight += 0.1;
    }

    score / total_weight
}

// ── Tests ────────────────────────────────────────────────────────────

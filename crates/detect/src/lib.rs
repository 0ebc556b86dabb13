//! Duplicate detection for incoming catalog entries.
//!
//! [`DuplicateDetector`] decides whether a fetched work/chapter already
//! exists in the catalog: an exact (source, native-id) match short-circuits
//! at full confidence; otherwise candidates found by keyword search are
//! scored with a weighted normalized-Levenshtein similarity over title,
//! author, and description.

pub mod detector;
pub mod text;

pub use detector::{
    ChapterDuplicate, DetectorConfig, DuplicateDetector, DuplicateResult, MatchedWork, WorkQuery,
};
pub use text::{clean, levenshtein, significant_words, similarity};

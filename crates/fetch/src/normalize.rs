//! Canonicalization of heterogeneous source payloads.
//!
//! Sources disagree on field names, genre encodings, and status vocabulary.
//! The rules here fold the shapes we have seen in the wild into the
//! canonical entry types; anything missing a title or a source-native id is
//! dropped before it reaches deduplication.

use serde_json::Value;
use tracing::debug;

use kasane_core::model::{CatalogEntry, ChapterEntry, Source, WorkKind, WorkStatus};

// ── Field alternatives ───────────────────────────────────────────────

const TITLE_KEYS: &[&str] = &["title", "name"];
const KEY_KEYS: &[&str] = &["id", "slug", "source_id", "manga_id"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "synopsis"];
const COVER_KEYS: &[&str] = &["cover_url", "cover", "image", "thumbnail"];
const GENRE_KEYS: &[&str] = &["genres", "tags", "categories"];
const CHAPTER_NUMBER_KEYS: &[&str] = &["number", "chapter", "chapter_number", "chapterNumber"];

/// Convert a whole response body into canonical entries.
pub fn normalize_catalog(body: &Value, source: &Source) -> Vec<CatalogEntry> {
    let items = extract_items(body);
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match normalize_entry(item, source) {
            Some(entry) => entries.push(entry),
            None => {
                debug!(
                    source = %source.name,
                    "dropping entry without title or source key"
                );
            }
        }
    }
    entries
}

/// Find the list of items in a response: a bare array, or one nested under
/// a well-known envelope key.
fn extract_items(body: &Value) -> &[Value] {
    if let Some(items) = body.as_array() {
        return items;
    }
    for key in ["data", "mangas", "results", "items"] {
        if let Some(items) = body.get(key).and_then(Value::as_array) {
            return items;
        }
    }
    &[]
}

/// Normalize a single work object. Returns `None` when the entry cannot be
/// tracked (no title or no source-native id).
pub fn normalize_entry(item: &Value, source: &Source) -> Option<CatalogEntry> {
    let title = first_string(item, TITLE_KEYS)?;
    let source_key = first_key(item, KEY_KEYS)?;
    if title.trim().is_empty() || source_key.is_empty() {
        return None;
    }

    let chapters = item
        .get("chapters")
        .and_then(Value::as_array)
        .map(|raw| raw.iter().filter_map(normalize_chapter).collect())
        .unwrap_or_default();

    Some(CatalogEntry {
        title: title.trim().to_string(),
        description: first_string(item, DESCRIPTION_KEYS),
        author: first_string(item, &["author"]),
        artist: first_string(item, &["artist"]),
        genres: item
            .get(GENRE_KEYS[0])
            .or_else(|| item.get(GENRE_KEYS[1]))
            .or_else(|| item.get(GENRE_KEYS[2]))
            .map(split_genres)
            .unwrap_or_default(),
        status: item
            .get("status")
            .and_then(Value::as_str)
            .map(parse_status)
            .unwrap_or_default(),
        cover_url: first_string(item, COVER_KEYS),
        kind: infer_kind(
            item.get("type").and_then(Value::as_str),
            &source.name,
        ),
        source_id: source.id,
        source_key,
        chapters,
    })
}

/// Normalize a single chapter object. Returns `None` without a parseable
/// number or a source-native id.
pub fn normalize_chapter(item: &Value) -> Option<ChapterEntry> {
    let number = CHAPTER_NUMBER_KEYS
        .iter()
        .find_map(|key| item.get(key).and_then(parse_chapter_number))?;
    let source_key = first_key(item, KEY_KEYS)?;

    let pages = item
        .get("pages")
        .and_then(Value::as_array)
        .map(|raw| {
            raw.iter()
                .filter_map(|page| match page {
                    Value::String(url) => Some(url.clone()),
                    Value::Object(_) => page
                        .get("url")
                        .and_then(Value::as_str)
                        .map(String::from),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ChapterEntry {
        number,
        title: first_string(item, TITLE_KEYS),
        description: first_string(item, DESCRIPTION_KEYS),
        pages,
        source_key,
    })
}

/// Map a raw status string onto the canonical vocabulary by
/// case-insensitive substring. Unrecognized values default to Ongoing.
pub fn parse_status(raw: &str) -> WorkStatus {
    let lower = raw.to_lowercase();
    if lower.contains("ongoing") || lower.contains("continuing") {
        WorkStatus::Ongoing
    } else if lower.contains("completed") || lower.contains("finished") {
        WorkStatus::Completed
    } else if lower.contains("hiatus") || lower.contains("pause") {
        WorkStatus::Hiatus
    } else if lower.contains("cancelled") || lower.contains("dropped") {
        WorkStatus::Cancelled
    } else {
        WorkStatus::Ongoing
    }
}

/// Infer the work kind from an explicit type field, falling back to hints
/// in the source's own name.
pub fn infer_kind(type_field: Option<&str>, source_name: &str) -> WorkKind {
    let haystack = match type_field {
        Some(t) => t.to_lowercase(),
        None => source_name.to_lowercase(),
    };
    if haystack.contains("manhwa") || haystack.contains("korean") {
        WorkKind::Manhwa
    } else if haystack.contains("manhua") || haystack.contains("chinese") {
        WorkKind::Manhua
    } else {
        WorkKind::Manga
    }
}

/// Genres arrive either as a list or as one comma-separated string; split
/// and trim either form into an ordered, deduplicated set.
pub fn split_genres(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Value::String(joined) => joined.split(',').map(String::from).collect(),
        _ => Vec::new(),
    };

    let mut genres = Vec::new();
    for genre in raw {
        let trimmed = genre.trim().to_string();
        if !trimmed.is_empty() && !genres.contains(&trimmed) {
            genres.push(trimmed);
        }
    }
    genres
}

/// Parse a chapter number from a JSON number or a string like "10.5" or
/// "Chapter 3".
fn parse_chapter_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| item.get(key).and_then(Value::as_str))
        .map(String::from)
        .filter(|s| !s.is_empty())
}

/// Like [`first_string`] but also accepts numeric ids, stringified.
fn first_key(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kasane_core::model::{FetchKind, SourceSettings};
    use serde_json::json;
    use uuid::Uuid;

    fn source(name: &str) -> Source {
        Source {
            id: Uuid::new_v4(),
            name: name.to_string(),
            base_url: "https://api.example.org/catalog".to_string(),
            fetch_kind: FetchKind::Api,
            active: true,
            config: SourceSettings::default(),
            last_sync_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // ── status matching ─────────────────────────────────────────────

    #[test]
    fn status_substring_table() {
        assert_eq!(parse_status("Ongoing"), WorkStatus::Ongoing);
        assert_eq!(parse_status("currently CONTINUING"), WorkStatus::Ongoing);
        assert_eq!(parse_status("Completed"), WorkStatus::Completed);
        assert_eq!(parse_status("finished publishing"), WorkStatus::Completed);
        assert_eq!(parse_status("on hiatus"), WorkStatus::Hiatus);
        assert_eq!(parse_status("Paused"), WorkStatus::Hiatus);
        assert_eq!(parse_status("Cancelled"), WorkStatus::Cancelled);
        assert_eq!(parse_status("dropped by author"), WorkStatus::Cancelled);
        assert_eq!(parse_status("???"), WorkStatus::Ongoing);
    }

    // ── kind inference ──────────────────────────────────────────────

    #[test]
    fn kind_from_type_field() {
        assert_eq!(infer_kind(Some("Manhwa"), "whatever"), WorkKind::Manhwa);
        assert_eq!(infer_kind(Some("korean webtoon"), "x"), WorkKind::Manhwa);
        assert_eq!(infer_kind(Some("manhua"), "x"), WorkKind::Manhua);
        assert_eq!(infer_kind(Some("chinese comic"), "x"), WorkKind::Manhua);
        assert_eq!(infer_kind(Some("manga"), "x"), WorkKind::Manga);
    }

    #[test]
    fn kind_from_source_name_fallback() {
        assert_eq!(infer_kind(None, "KoreanScans"), WorkKind::Manhwa);
        assert_eq!(infer_kind(None, "manhua-house"), WorkKind::Manhua);
        assert_eq!(infer_kind(None, "mangadex"), WorkKind::Manga);
    }

    // ── genres ──────────────────────────────────────────────────────

    #[test]
    fn genres_from_list() {
        let value = json!(["Action", " Fantasy ", "Action"]);
        assert_eq!(split_genres(&value), vec!["Action", "Fantasy"]);
    }

    #[test]
    fn genres_from_comma_string() {
        let value = json!("Action, Fantasy , Adventure,,");
        assert_eq!(
            split_genres(&value),
            vec!["Action", "Fantasy", "Adventure"]
        );
    }

    // ── entries ─────────────────────────────────────────────────────

    #[test]
    fn entry_requires_title_and_key() {
        let src = source("mangadex");
        assert!(normalize_entry(&json!({"title": "No Key"}), &src).is_none());
        assert!(normalize_entry(&json!({"id": "no-title"}), &src).is_none());
        assert!(normalize_entry(&json!({"title": "", "id": "x"}), &src).is_none());
        assert!(normalize_entry(&json!({"title": "Ok", "id": "x"}), &src).is_some());
    }

    #[test]
    fn entry_accepts_numeric_id() {
        let src = source("mangadex");
        let entry = normalize_entry(&json!({"name": "Berserk", "id": 42}), &src).unwrap();
        assert_eq!(entry.source_key, "42");
        assert_eq!(entry.title, "Berserk");
    }

    #[test]
    fn entry_full_shape() {
        let src = source("mangadex");
        let entry = normalize_entry(
            &json!({
                "title": "  Solo Leveling ",
                "id": "sl-1",
                "synopsis": "A hunter grows strong.",
                "author": "Chugong",
                "tags": "Action, Fantasy",
                "status": "Ongoing",
                "type": "manhwa",
                "cover": "https://cdn.example.org/sl.jpg",
                "chapters": [
                    {"chapter_number": "10.5", "id": "c105", "title": "Interlude",
                     "pages": ["p1.jpg", {"url": "p2.jpg"}, 3]},
                    {"id": "broken"}
                ]
            }),
            &src,
        )
        .unwrap();

        assert_eq!(entry.title, "Solo Leveling");
        assert_eq!(entry.description.as_deref(), Some("A hunter grows strong."));
        assert_eq!(entry.genres, vec!["Action", "Fantasy"]);
        assert_eq!(entry.status, WorkStatus::Ongoing);
        assert_eq!(entry.kind, WorkKind::Manhwa);
        assert_eq!(entry.cover_url.as_deref(), Some("https://cdn.example.org/sl.jpg"));
        // The chapter without a number is dropped; non-string pages skipped.
        assert_eq!(entry.chapters.len(), 1);
        assert!((entry.chapters[0].number - 10.5).abs() < 1e-9);
        assert_eq!(entry.chapters[0].pages, vec!["p1.jpg", "p2.jpg"]);
    }

    #[test]
    fn chapter_number_from_labelled_string() {
        let chapter = normalize_chapter(&json!({"chapter": "Chapter 3", "id": "c3"})).unwrap();
        assert!((chapter.number - 3.0).abs() < 1e-9);
    }

    // ── envelopes ───────────────────────────────────────────────────

    #[test]
    fn catalog_from_bare_array_and_envelopes() {
        let src = source("mangadex");
        let item = json!({"title": "Berserk", "id": "b1"});

        for body in [
            json!([item.clone()]),
            json!({"data": [item.clone()]}),
            json!({"mangas": [item.clone()]}),
            json!({"results": [item]}),
        ] {
            let entries = normalize_catalog(&body, &src);
            assert_eq!(entries.len(), 1, "body = {}", body);
        }

        assert!(normalize_catalog(&json!({"unrelated": 1}), &src).is_empty());
    }

    #[test]
    fn catalog_drops_untrackable_entries() {
        let src = source("mangadex");
        let body = json!([
            {"title": "Keep Me", "id": "k1"},
            {"title": "No Key At All"},
            {"id": "no-title"}
        ]);
        let entries = normalize_catalog(&body, &src);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Keep Me");
    }
}

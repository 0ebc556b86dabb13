//! Minijinja template rendering for the aggregate sync summary.
//!
//! Templates are plain strings (not pre-registered files), so a fresh
//! [`minijinja::Environment`] is created per render call.

use crate::traits::NotifyError;

/// Default subject template for the per-run summary.
const SUBJECT_TEMPLATE: &str = "New content pending review ({{ pending_review }} items)";

/// Default body template for the per-run summary.
const BODY_TEMPLATE: &str = "\
Sync run finished at {{ now }}.

New works: {{ new_works }}
New chapters: {{ new_chapters }}
Duplicates skipped: {{ duplicates_skipped }}

{{ pending_review }} item(s) are waiting in the review queue.";

/// Context data available to summary templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SummaryContext {
    pub new_works: u64,
    pub new_chapters: u64,
    pub duplicates_skipped: u64,
    pub pending_review: u64,
    /// Current timestamp in RFC 3339 format.
    pub now: String,
}

/// Render the (subject, body) pair for a sync-run summary.
pub fn render_sync_summary(context: &SummaryContext) -> Result<(String, String), NotifyError> {
    let subject = render(SUBJECT_TEMPLATE, context)?;
    let body = render(BODY_TEMPLATE, context)?;
    Ok((subject, body))
}

fn render(template: &str, context: &SummaryContext) -> Result<String, NotifyError> {
    let mut env = minijinja::Environment::new();
    env.add_template("t", template)
        .map_err(|e| NotifyError::Template(e.to_string()))?;
    let tmpl = env
        .get_template("t")
        .map_err(|e| NotifyError::Template(e.to_string()))?;
    tmpl.render(context)
        .map_err(|e| NotifyError::Template(e.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SummaryContext {
        SummaryContext {
            new_works: 2,
            new_chapters: 7,
            duplicates_skipped: 4,
            pending_review: 9,
            now: "2026-08-06T02:00:00Z".to_string(),
        }
    }

    #[test]
    fn subject_carries_pending_count() {
        let (subject, _) = render_sync_summary(&context()).unwrap();
        assert_eq!(subject, "New content pending review (9 items)");
    }

    #[test]
    fn body_carries_all_counts() {
        let (_, body) = render_sync_summary(&context()).unwrap();
        assert!(body.contains("New works: 2"));
        assert!(body.contains("New chapters: 7"));
        assert!(body.contains("Duplicates skipped: 4"));
        assert!(body.contains("9 item(s)"));
    }
}

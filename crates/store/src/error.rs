//! Store error taxonomy with HTTP status mapping.

use uuid::Uuid;

/// Errors from catalog store operations.
#[derive(Debug)]
pub enum StoreError {
    InvalidInput(String),
    NotFound(Uuid),
    DuplicateName(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Self::NotFound(id) => write!(f, "not found: {}", id),
            Self::DuplicateName(name) => write!(
                f,
                "duplicate name '{}': a source with this name already exists",
                name
            ),
            Self::Database(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e)
    }
}

impl StoreError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::DuplicateName(_) => 409,
            Self::Database(_) => 500,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

//! Error types for translation store operations

use crate::entry::EntryId;
use crate::store::MergeReport;
use crate::validator::ValidationErrors;
use thiserror::Error;

/// Result type for translation store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store, the key codec and the merge engine
#[derive(Debug, Error)]
pub enum StoreError {
    /// One or more field rules failed; nothing was written
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Referenced entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Plain update attempted on an entry that is locked against overwrite
    #[error("Entry {0} is locked; use update_and_lock to edit it")]
    Locked(EntryId),

    /// Code string could not be split into namespace, group and item
    #[error("Malformed code '{0}': expected [namespace::]group.item")]
    MalformedCode(String),

    /// A bulk merge committed some items but failed others
    #[error("Merge of {locale}/{group} left {failed} item(s) unapplied")]
    PartialMerge {
        locale: String,
        group: String,
        failed: usize,
        report: Box<MergeReport>,
    },

    /// Storage engine error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Create a NotFound error for an entry id
    pub fn entry_not_found(id: EntryId) -> Self {
        Self::NotFound(format!("entry {}", id))
    }

    /// Create a NotFound error for a key in a locale
    pub fn key_not_found(locale: &str, code: &str) -> Self {
        Self::NotFound(format!("'{}' in locale '{}'", code, locale))
    }

    /// Whether a caller-side retry has a chance of succeeding.
    ///
    /// Only transient storage faults qualify: pool timeouts, I/O errors and
    /// SQLite reporting a busy or locked database. Constraint failures,
    /// aborts and lookup or codec failures repeat the same way every time.
    /// A partial merge qualifies when all of its failures were transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            Self::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().is_some_and(|code| is_busy_code(&code))
            }
            Self::PartialMerge { report, .. } => report.is_retryable(),
            _ => false,
        }
    }
}

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6), including their extended codes
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|code| matches!(code & 0xFF, 5 | 6))
}

/// Translate a unique-index violation into the validator's error shape.
///
/// The validator's uniqueness check is only a pre-check; two writers racing on
/// the same key both pass it and the index rejects the loser. That loser sees
/// the same error it would have seen had it arrived second.
pub(crate) fn map_unique_violation(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            tracing::warn!("Unique index rejected write after pre-check passed: {}", db_err);
            StoreError::Validation(ValidationErrors::duplicate_key())
        }
        _ => StoreError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_messages() {
        assert_eq!(
            StoreError::entry_not_found(7).to_string(),
            "Not found: entry 7"
        );
        assert_eq!(
            StoreError::key_not_found("es", "messages.greeting").to_string(),
            "Not found: 'messages.greeting' in locale 'es'"
        );
    }

    #[test]
    fn test_malformed_code_message() {
        let err = StoreError::MalformedCode("nogroup".to_string());
        assert!(err.to_string().contains("nogroup"));
        assert!(err.to_string().contains("group.item"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!StoreError::Locked(1).is_retryable());
        assert!(!StoreError::MalformedCode("x".into()).is_retryable());
        assert!(!StoreError::Validation(ValidationErrors::duplicate_key()).is_retryable());
    }

    #[test]
    fn test_busy_codes() {
        // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT, SQLITE_LOCKED_SHAREDCACHE
        for code in ["5", "6", "517", "262"] {
            assert!(is_busy_code(code), "{} should be transient", code);
        }
        // SQLITE_CONSTRAINT_UNIQUE, SQLITE_CONSTRAINT_TRIGGER, SQLITE_ERROR, SQLITE_FULL
        for code in ["2067", "1811", "1", "13", "", "busy"] {
            assert!(!is_busy_code(code), "{} should not be transient", code);
        }
    }

    #[test]
    fn test_non_database_error_passes_through() {
        let mapped = map_unique_violation(sqlx::Error::RowNotFound);
        assert!(matches!(mapped, StoreError::Database(sqlx::Error::RowNotFound)));
    }
}

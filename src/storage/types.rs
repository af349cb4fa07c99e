use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Client state store errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another instance holds the state database lock
    #[error("Another instance of chapterwatch appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("State store migration failed: {0}")]
    Migration(String),

    /// Stored value could not be decoded
    #[error("Corrupt value for '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Generic database error
    #[error("State store error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::InstanceLocked;
        }

        StorageError::Other(err)
    }
}

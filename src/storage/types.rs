use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Another instance of feedlist appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// No channel or folder with this uuid
    #[error("No {kind} with uuid {uuid}")]
    NotFound { kind: &'static str, uuid: String },

    /// Input rejected before reaching SQL
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map lock-related sqlx errors to [`DatabaseError::InstanceLocked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("sqlite_busy")
            || message.contains("sqlite_locked")
            || message.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Channel row as stored, before it is shaped into a sidebar entity.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ChannelRow {
    pub uuid: String,
    pub title: String,
    pub feed_url: String,
    pub link: Option<String>,
    pub folder_uuid: Option<String>,
    pub sort: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct FolderRow {
    pub uuid: String,
    pub title: String,
    pub sort: i64,
}

/// Represents a parsed article from a feed
#[derive(Debug, Clone)]
pub struct ParsedArticle {
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub summary: Option<String>,
}

/// Everything the syncer needs to know about a channel.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub uuid: String,
    pub title: String,
    pub feed_url: String,
}

use thiserror::Error;

use crate::feed::{FeedFormat, UnknownFeedFormatError};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the registry lock
    #[error("The subscription registry is locked by another process. Please try again later.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// The ingested-article range query for one subscription failed.
///
/// Deduplication treats this as fatal for the cycle. It is never read as
/// "no articles ingested yet".
#[derive(Debug, Error)]
#[error("Failed to load ingested articles for subscription {subscription_id}: {source}")]
pub struct RegistryQueryError {
    pub subscription_id: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl RegistryQueryError {
    pub fn new(
        subscription_id: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            source: source.into(),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A feed URL registered for ingestion.
///
/// `format` is classified once when the subscription is created and drives
/// parser dispatch on every later poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub url: String,
    pub format: FeedFormat,
    pub enabled: bool,
    /// Listed in the public directory. Ingestion ignores it.
    pub discoverable: bool,
    pub created_at: i64,
}

impl Subscription {
    /// New enabled subscription with a fresh UUID v4 id.
    pub fn new(url: impl Into<String>, format: FeedFormat, discoverable: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            format,
            enabled: true,
            discoverable,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Internal row type for subscription queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: String,
    pub url: String,
    pub format: String,
    pub enabled: bool,
    pub discoverable: bool,
    pub created_at: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = UnknownFeedFormatError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            format: row.format.parse()?,
            id: row.id,
            url: row.url,
            enabled: row.enabled,
            discoverable: row.discoverable,
            created_at: row.created_at,
        })
    }
}

use chrono::{DateTime, Utc};

/// Error taxonomy for the whole service.
///
/// Every fallible operation in the crate returns one of these variants so the
/// web layer can map them to HTTP statuses without string matching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed client input.
    #[error("{0}")]
    Validation(String),

    /// Unknown ticker or other missing entity.
    #[error("{0}")]
    NotFound(String),

    /// Per-user daily analysis quota exhausted.
    #[error("今日AI分析次数已达上限（{limit}次），请明日再试")]
    RateLimitExceeded {
        limit: u32,
        /// Start of the next UTC day, when the counter resets.
        resets_at: DateTime<Utc>,
    },

    /// External provider (market data or model) failed.
    #[error("{provider}: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

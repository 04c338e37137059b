//! Structured error types for cache operations.
//!
//! Everything except `Storage`, `Config` and `Source` signals a programming or
//! data-integrity fault: the offending fetch or load should be logged and
//! dropped, never retried. Data that simply is not cached yet is reported
//! through [`crate::grid::Retrieval::Gap`], not through this type.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::Granularity;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("chronological integrity violated at index {index}: {reason}")]
    ChronologicalIntegrity { index: usize, reason: String },

    #[error("invalid merge: {0}")]
    InvalidMerge(String),

    #[error("cache corruption: {0}")]
    Corruption(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("candle source error: {0}")]
    Source(String),

    #[error(
        "no progress filling {symbol} {granularity} [{begin}, {end}) after {rounds} round(s)"
    )]
    NoProgress {
        symbol: String,
        granularity: Granularity,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        rounds: usize,
    },
}

impl CacheError {
    pub(crate) fn integrity(index: usize, reason: impl Into<String>) -> Self {
        Self::ChronologicalIntegrity {
            index,
            reason: reason.into(),
        }
    }

    /// True for the data-integrity family (the fatal-to-the-operation errors).
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            Self::ChronologicalIntegrity { .. } | Self::InvalidMerge(_) | Self::Corruption(_)
        )
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_family_is_classified() {
        assert!(CacheError::integrity(3, "gap").is_integrity_fault());
        assert!(CacheError::InvalidMerge("hole".into()).is_integrity_fault());
        assert!(CacheError::Corruption("order".into()).is_integrity_fault());
        assert!(!CacheError::Storage("disk".into()).is_integrity_fault());
    }

    #[test]
    fn display_includes_index() {
        let msg = CacheError::integrity(7, "overlap").to_string();
        assert!(msg.contains("index 7"));
        assert!(msg.contains("overlap"));
    }
}

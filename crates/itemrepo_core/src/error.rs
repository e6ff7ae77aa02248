//! Crate-level error taxonomy.
//!
//! # Responsibility
//! - Separate logical query misuse (`QueryError`) from storage failures.
//! - Carry backend failures to callers unchanged.
//!
//! # Invariants
//! - "Not found" and "empty page" are never represented as errors.
//! - Nothing in the core retries or swallows a backend failure.

use crate::db::DbError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Misuse of the query surface that must not be mistaken for "no results".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Token cannot be decoded at all.
    #[error("malformed continuation token: {0}")]
    MalformedToken(String),
    /// Token was issued for a chain with a different shape.
    #[error("continuation token belongs to a different query shape (expected {expected:016x}, found {found:016x})")]
    IncompatibleToken { expected: u64, found: u64 },
    /// A page was built with more items than its page size allows.
    #[error("page holds {count} items but page size is {page_size}")]
    PageOverflow { count: usize, page_size: u32 },
    /// Page number below the 1-based minimum reached a constructor.
    #[error("page number must be >= 1")]
    InvalidPageNumber,
}

/// Error returned by store, backend and query execution APIs.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("failed to read field `{path}`: {message}")]
    FieldAccess { path: String, message: String },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("backend `{backend}` does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
    #[error("backend `{backend}` failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("invalid persisted item data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl StoreError {
    pub(crate) fn poisoned(backend: &'static str) -> Self {
        Self::Backend {
            backend,
            message: "storage lock poisoned".to_string(),
        }
    }
}

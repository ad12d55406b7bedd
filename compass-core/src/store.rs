//! Résumé store contract
//!
//! A store keeps `(category, text, embedding)` rows keyed by a monotonically
//! assigned id and answers nearest-neighbor queries by cosine distance.
//! [`crate::pg_store::PgResumeStore`] is the production implementation;
//! [`crate::memory_store::MemoryResumeStore`] has identical semantics in process.
//!
//! The store is only ever replaced wholesale (truncate + reload, or drop +
//! recreate); rows are never updated in place.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{NewResume, RecordError, ScoredResume};

/// Postgres SQLSTATE classes that describe a bad row rather than a bad connection:
/// 22 data exception, 23 integrity constraint violation.
const RECORD_LEVEL_SQLSTATE_CLASSES: [&str; 2] = ["22", "23"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("Embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid table name: {0}")]
    InvalidIdentifier(String),
}

impl StoreError {
    /// True when the failure is confined to the row being written, so a bulk
    /// load can skip it and carry on. Connectivity failures return false.
    pub fn is_record_level(&self) -> bool {
        match self {
            StoreError::InvalidRecord(_) | StoreError::DimensionMismatch { .. } => true,
            StoreError::Database(sqlx::Error::Database(db)) => db
                .code()
                .map(|code| {
                    RECORD_LEVEL_SQLSTATE_CLASSES
                        .iter()
                        .any(|class| code.starts_with(class))
                })
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// Width of the embedding column.
    fn dimensions(&self) -> usize;

    /// Create the extension, table and index if they do not exist.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Drop and recreate the table and index. All rows are lost.
    async fn recreate_schema(&self) -> Result<(), StoreError>;

    /// Remove every row. Ids are not reset.
    async fn truncate(&self) -> Result<(), StoreError>;

    /// Insert one row in its own transaction and return its id.
    async fn insert(
        &self,
        resume: &NewResume,
        embedding: &[f32],
        model_name: &str,
    ) -> Result<i64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// The `k` rows closest to `query` by cosine distance, ascending, ties
    /// broken by id. `k == 0` yields an empty vector.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResume>, StoreError>;

    async fn embedding_of(&self, id: i64) -> Result<Option<Vec<f32>>, StoreError>;

    /// Rebuild the nearest-neighbor index after a bulk reload.
    async fn rebuild_index(&self) -> Result<(), StoreError>;

    /// Take the single-writer lease. `Ok(false)` means another writer holds it.
    async fn try_acquire_writer(&self) -> Result<bool, StoreError>;

    async fn release_writer(&self) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub(crate) fn check_dimensions(expected: usize, embedding: &[f32]) -> Result<(), StoreError> {
    if embedding.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

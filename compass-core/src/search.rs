//! Similarity query service
//!
//! Encode the query, ask the store for the `k` nearest rows. No retries:
//! a failed store call is an error for the caller, never an empty result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::embeddings::{encode_with_timeout, EmbeddingError, Encoder};
use crate::models::ScoredResume;
use crate::store::{ResumeStore, StoreError};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Encoding failed: {0}")]
    Encoding(EmbeddingError),

    #[error("Store unavailable: {0}")]
    Store(StoreError),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),
}

impl From<EmbeddingError> for SearchError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::Timeout(d) => SearchError::Timeout(d),
            other => SearchError::Encoding(other),
        }
    }
}

impl From<StoreError> for SearchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout(d) => SearchError::Timeout(d),
            other => SearchError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct SimilarityQueryService {
    encoder: Arc<dyn Encoder>,
    store: Arc<dyn ResumeStore>,
    encode_timeout: Duration,
}

impl SimilarityQueryService {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        store: Arc<dyn ResumeStore>,
        encode_timeout: Duration,
    ) -> Self {
        Self {
            encoder,
            store,
            encode_timeout,
        }
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    pub fn store(&self) -> &Arc<dyn ResumeStore> {
        &self.store
    }

    /// Up to `k` stored résumés, closest first. The empty query is allowed.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredResume>, SearchError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let embedding = encode_with_timeout(self.encoder.as_ref(), query, self.encode_timeout).await?;
        let results = self.store.nearest(&embedding, k).await?;

        tracing::debug!(
            k,
            hits = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Similarity search"
        );
        Ok(results)
    }
}

//! Replace-all ingestion
//!
//! Lease → truncate → per-record validate/encode/insert → reindex → release.
//! A bad record is skipped and reported; a store that stops answering aborts
//! the run. Readers may see a partial table while a load is in progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use compass_core::{encode_with_timeout, Encoder, NewResume, ResumeStore, StoreError};
use serde::Serialize;

use crate::error::IngestError;
use crate::source::SourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Receives one [`Progress`] after every record, in order.
pub trait IngestProgress: Send + Sync {
    fn update(&self, progress: Progress);
}

impl<F> IngestProgress for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn update(&self, progress: Progress) {
        self(progress)
    }
}

pub struct SilentProgress;

impl IngestProgress for SilentProgress {
    fn update(&self, _progress: Progress) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Zero-based position in the input batch.
    pub index: usize,
    pub category: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub committed: usize,
    pub failures: Vec<RecordFailure>,
}

impl IngestReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            committed: 0,
            failures: Vec::new(),
        }
    }

    /// Every input record was committed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.committed == self.total
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

enum Step {
    Skip {
        category: Option<String>,
        reason: String,
    },
    Abort(StoreError),
}

pub struct IngestPipeline {
    encoder: Arc<dyn Encoder>,
    store: Arc<dyn ResumeStore>,
    encode_timeout: Duration,
}

impl IngestPipeline {
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

    pub async fn ingest(
        &self,
        batch: &[NewResume],
        progress: &dyn IngestProgress,
    ) -> Result<IngestReport, IngestError> {
        let records = batch.iter().cloned().map(Ok).collect();
        self.ingest_records(records, progress).await
    }

    /// Same as [`IngestPipeline::ingest`] but accepts rows that already failed
    /// to parse; those are reported as failures at their position.
    pub async fn ingest_records(
        &self,
        records: Vec<SourceRecord>,
        progress: &dyn IngestProgress,
    ) -> Result<IngestReport, IngestError> {
        if !self.store.try_acquire_writer().await? {
            return Err(IngestError::AlreadyRunning);
        }

        let result = self.load(records, progress).await;

        if let Err(e) = self.store.release_writer().await {
            tracing::warn!(error = %e, "Failed to release writer lease");
        }
        result
    }

    async fn load(
        &self,
        records: Vec<SourceRecord>,
        progress: &dyn IngestProgress,
    ) -> Result<IngestReport, IngestError> {
        let start = Instant::now();
        let total = records.len();
        let mut report = IngestReport::new(total);

        self.store.truncate().await?;
        tracing::info!(total, model = self.encoder.model_name(), "Store truncated, loading");

        for (index, record) in records.into_iter().enumerate() {
            match self.load_one(record).await {
                Ok(id) => {
                    report.committed += 1;
                    tracing::trace!(index, id, "Committed");
                }
                Err(Step::Skip { category, reason }) => {
                    tracing::warn!(index, category = ?category, %reason, "Skipping record");
                    report.failures.push(RecordFailure {
                        index,
                        category,
                        reason,
                    });
                }
                Err(Step::Abort(e)) => {
                    tracing::error!(index, committed = report.committed, error = %e, "Ingestion aborted");
                    return Err(e.into());
                }
            }
            progress.update(Progress {
                current: index + 1,
                total,
            });
        }

        self.store.rebuild_index().await?;

        tracing::info!(
            committed = report.committed,
            failed = report.failed(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Ingestion complete"
        );
        Ok(report)
    }

    async fn load_one(&self, record: SourceRecord) -> Result<i64, Step> {
        let resume = record.map_err(|e| Step::Skip {
            category: None,
            reason: e.to_string(),
        })?;
        let skip = |reason: String| Step::Skip {
            category: Some(resume.category.clone()),
            reason,
        };

        resume.validate().map_err(|e| skip(e.to_string()))?;

        let embedding = encode_with_timeout(self.encoder.as_ref(), &resume.text, self.encode_timeout)
            .await
            .map_err(|e| skip(e.to_string()))?;

        match self
            .store
            .insert(&resume, &embedding, self.encoder.model_name())
            .await
        {
            Ok(id) => Ok(id),
            Err(e) if e.is_record_level() => Err(skip(e.to_string())),
            Err(e) => Err(Step::Abort(e)),
        }
    }
}

//! In-process résumé store
//!
//! Exact nearest-neighbor scan over a `Vec`. Same ordering, id and
//! validation rules as [`crate::pg_store::PgResumeStore`], so the pipeline
//! and the HTTP layer can be exercised without Postgres.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{NewResume, ResumeRecord, ScoredResume};
use crate::store::{check_dimensions, ResumeStore, StoreError};

struct StoredRow {
    record: ResumeRecord,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<StoredRow>,
    last_id: i64,
}

pub struct MemoryResumeStore {
    dimensions: usize,
    inner: RwLock<Inner>,
    writer: AtomicBool,
}

impl MemoryResumeStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            inner: RwLock::new(Inner::default()),
            writer: AtomicBool::new(false),
        }
    }
}

/// `1 - cos(a, b)`. A zero-norm side has no direction; it is treated as
/// orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn recreate_schema(&self) -> Result<(), StoreError> {
        *self.inner.write().await = Inner::default();
        Ok(())
    }

    async fn truncate(&self) -> Result<(), StoreError> {
        self.inner.write().await.rows.clear();
        Ok(())
    }

    async fn insert(
        &self,
        resume: &NewResume,
        embedding: &[f32],
        model_name: &str,
    ) -> Result<i64, StoreError> {
        resume.validate()?;
        check_dimensions(self.dimensions, embedding)?;

        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let now = Utc::now();
        let record = ResumeRecord {
            id: inner.last_id,
            category: resume.category.clone(),
            text: resume.text.clone(),
            model_name: model_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let id = record.id;
        inner.rows.push(StoredRow {
            record,
            embedding: embedding.to_vec(),
        });
        Ok(id)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.rows.len() as u64)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResume>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        check_dimensions(self.dimensions, query)?;

        let inner = self.inner.read().await;
        let mut scored: Vec<ScoredResume> = inner
            .rows
            .iter()
            .map(|row| ScoredResume {
                record: row.record.clone(),
                distance: cosine_distance(query, &row.embedding),
            })
            .collect();
        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.record.id.cmp(&b.record.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn embedding_of(&self, id: i64) -> Result<Option<Vec<f32>>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .rows
            .iter()
            .find(|row| row.record.id == id)
            .map(|row| row.embedding.clone()))
    }

    async fn rebuild_index(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn try_acquire_writer(&self) -> Result<bool, StoreError> {
        Ok(self
            .writer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    async fn release_writer(&self) -> Result<(), StoreError> {
        self.writer.store(false, Ordering::Release);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

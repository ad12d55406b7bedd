//! Postgres + pgvector résumé store
//!
//! One table, one IVFFlat index over `vector_cosine_ops`. Nearest-neighbor
//! reads run inside a short transaction so `SET LOCAL ivfflat.probes` applies
//! to exactly that query.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgPool, Postgres};
use tokio::sync::Mutex;

use crate::config::StoreConfig;
use crate::models::{NewResume, ResumeRecord, ScoredResume};
use crate::store::{check_dimensions, ResumeStore, StoreError};

pub const DEFAULT_TABLE: &str = "resumes";

#[derive(sqlx::FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    record: ResumeRecord,
    distance: f64,
}

pub struct PgResumeStore {
    pool: PgPool,
    table: String,
    dimensions: usize,
    lists: u32,
    probes: u32,
    query_timeout: Duration,
    /// Connection holding the session-level advisory lock while this process
    /// is the writer. Returning it to the pool would leak the lock.
    writer: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PgResumeStore {
    pub fn new(pool: PgPool, config: &StoreConfig, dimensions: usize) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
            dimensions,
            lists: config.ivfflat_lists,
            probes: config.ivfflat_probes,
            query_timeout: Duration::from_secs(config.query_timeout_seconds),
            writer: Mutex::new(None),
        }
    }

    /// Point the store at another table. Used to keep test runs apart.
    pub fn with_table(mut self, table: &str) -> Result<Self, StoreError> {
        let valid = table
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
            && table
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(StoreError::InvalidIdentifier(table.to_string()));
        }
        self.table = table.to_string();
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn index_name(&self) -> String {
        format!("{}_embedding_idx", self.table)
    }

    fn lock_name(&self) -> String {
        format!("compass:{}", self.table)
    }

    /// Probes for a query asking for `k` of `stored` rows. An IVFFlat scan
    /// only sees rows in the probed lists, so a request for the whole table
    /// probes every list.
    fn probes_for(&self, k: usize, stored: u64) -> u32 {
        if k as u64 >= stored {
            self.lists.max(self.probes)
        } else {
            self.probes
        }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.query_timeout)),
        }
    }

    async fn create_objects(&self) -> Result<(), StoreError> {
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
        {
            // Concurrent CREATE EXTENSION can lose the race even with IF NOT EXISTS.
            if crate::db::check_pgvector(&self.pool).await.is_err() {
                return Err(e.into());
            }
        }

        let table_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                category TEXT NOT NULL CHECK (length(btrim(category)) > 0),
                resume_text TEXT NOT NULL CHECK (length(btrim(resume_text)) > 0),
                embedding vector({dims}) NOT NULL,
                model_name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            table = self.table,
            dims = self.dimensions,
        );
        sqlx::query(&table_ddl).execute(&self.pool).await?;

        let index_ddl = format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {table} \
             USING ivfflat (embedding vector_cosine_ops) WITH (lists = {lists})",
            index = self.index_name(),
            table = self.table,
            lists = self.lists,
        );
        sqlx::query(&index_ddl).execute(&self.pool).await?;

        tracing::info!(
            "Schema ready: table {} vector({}) ivfflat lists={}",
            self.table,
            self.dimensions,
            self.lists
        );
        Ok(())
    }
}

#[async_trait]
impl ResumeStore for PgResumeStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.timed(self.create_objects()).await
    }

    async fn recreate_schema(&self) -> Result<(), StoreError> {
        self.timed(async {
            sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", self.table))
                .execute(&self.pool)
                .await?;
            tracing::warn!("Dropped table {}", self.table);
            self.create_objects().await
        })
        .await
    }

    async fn truncate(&self) -> Result<(), StoreError> {
        self.timed(async {
            sqlx::query(&format!("TRUNCATE TABLE {}", self.table))
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn insert(
        &self,
        resume: &NewResume,
        embedding: &[f32],
        model_name: &str,
    ) -> Result<i64, StoreError> {
        resume.validate()?;
        check_dimensions(self.dimensions, embedding)?;
        let vector = Vector::from(embedding.to_vec());

        self.timed(async {
            let mut tx = self.pool.begin().await?;
            let id: i64 = sqlx::query_scalar(&format!(
                r#"
                INSERT INTO {} (category, resume_text, embedding, model_name)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
                self.table
            ))
            .bind(&resume.category)
            .bind(&resume.text)
            .bind(&vector)
            .bind(model_name)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(id)
        })
        .await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.timed(async {
            let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
                .fetch_one(&self.pool)
                .await?;
            Ok(n.max(0) as u64)
        })
        .await
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResume>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        check_dimensions(self.dimensions, query)?;
        let vector = Vector::from(query.to_vec());
        let limit = i64::try_from(k).unwrap_or(i64::MAX);

        self.timed(async {
            let mut tx = self.pool.begin().await?;
            let stored: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
                .fetch_one(&mut *tx)
                .await?;
            let probes = self.probes_for(k, stored.max(0) as u64);
            sqlx::query(&format!("SET LOCAL ivfflat.probes = {}", probes))
                .execute(&mut *tx)
                .await?;

            let rows = sqlx::query_as::<_, ScoredRow>(&format!(
                r#"
                SELECT id, category, resume_text, model_name, created_at, updated_at,
                       (embedding <=> $1::vector) AS distance
                FROM {}
                ORDER BY embedding <=> $1::vector, id
                LIMIT $2
                "#,
                self.table
            ))
            .bind(&vector)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;

            Ok(rows
                .into_iter()
                .map(|row| ScoredResume {
                    record: row.record,
                    distance: row.distance,
                })
                .collect())
        })
        .await
    }

    async fn embedding_of(&self, id: i64) -> Result<Option<Vec<f32>>, StoreError> {
        self.timed(async {
            let row: Option<(Vector,)> =
                sqlx::query_as(&format!("SELECT embedding FROM {} WHERE id = $1", self.table))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(v,)| v.to_vec()))
        })
        .await
    }

    async fn rebuild_index(&self) -> Result<(), StoreError> {
        // REINDEX on a large table can legitimately outlast the query timeout.
        sqlx::query(&format!("REINDEX INDEX {}", self.index_name()))
            .execute(&self.pool)
            .await?;
        tracing::info!("Rebuilt index {}", self.index_name());
        Ok(())
    }

    async fn try_acquire_writer(&self) -> Result<bool, StoreError> {
        let mut slot = self.writer.lock().await;
        if slot.is_some() {
            return Ok(false);
        }

        let mut conn = self.pool.acquire().await?;
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(self.lock_name())
            .fetch_one(&mut *conn)
            .await?;
        if locked {
            tracing::debug!("Acquired writer lease {}", self.lock_name());
            *slot = Some(conn);
        }
        Ok(locked)
    }

    async fn release_writer(&self) -> Result<(), StoreError> {
        let Some(mut conn) = self.writer.lock().await.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(self.lock_name())
            .fetch_one(&mut *conn)
            .await;
        match unlocked {
            Ok(_) => {
                tracing::debug!("Released writer lease {}", self.lock_name());
                Ok(())
            }
            Err(e) => {
                // Closing the session drops every advisory lock it holds.
                let _ = conn.detach().close().await;
                Err(e.into())
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.timed(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}

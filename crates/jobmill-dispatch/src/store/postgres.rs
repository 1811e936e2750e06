//! Postgres-backed job store
//!
//! Uniqueness comes from the `job_records_job_hash_key` constraint and
//! conflicting inserts are skipped with `ON CONFLICT DO NOTHING`, so two
//! dispatchers admitting the same job at once cannot both create it.
//! Inserts are chunked to stay well under the 65,535 bind parameter limit.
//!
//! Payloads are bound as text and cast to `json`, which stores the input
//! verbatim, and read back with `::text`. A `jsonb` round trip would rewrite
//! numbers such as `1e16` or `-0.0`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobmill_common::types::{JobRecord, JobStatus, JobUnit};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use tracing::debug;

use super::{InsertOutcome, JobStore, Page};
use crate::db::{DbError, DbResult};

/// Rows per INSERT statement
const INSERT_CHUNK_SIZE: usize = 1_000;

#[derive(Debug, FromRow)]
struct JobRecordRow {
    id: i64,
    job_hash: String,
    job_unit: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRecordRow> for JobRecord {
    type Error = DbError;

    fn try_from(row: JobRecordRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row
            .status
            .parse()
            .map_err(|e: jobmill_common::JobmillError| DbError::decode(row.id, e.to_string()))?;
        let job_unit: JobUnit = serde_json::from_str(&row.job_unit)
            .map_err(|e| DbError::decode(row.id, format!("job_unit: {e}")))?;

        Ok(JobRecord {
            id: row.id,
            job_hash: row.job_hash,
            job_unit,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn status_strings(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Job store over the `job_records` table
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_chunk(&self, chunk: &[JobUnit]) -> DbResult<InsertOutcome> {
        let payloads = chunk
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO job_records (job_hash, job_unit, status) ");

        query_builder.push_values(chunk.iter().zip(payloads), |mut b, (unit, payload)| {
            b.push_bind(&unit.job_hash)
                .push_bind(payload)
                .push_unseparated("::json")
                .push_bind(JobStatus::Pending.as_str());
        });
        query_builder.push(" ON CONFLICT (job_hash) DO NOTHING RETURNING job_hash");

        let rows = query_builder.build().fetch_all(&self.pool).await?;

        let mut created = HashSet::with_capacity(rows.len());
        for row in rows {
            let hash: String = row.try_get("job_hash")?;
            created.insert(hash);
        }

        // A hash repeated within the chunk is created once; later copies conflict
        let mut outcome = InsertOutcome::default();
        for unit in chunk {
            if created.remove(&unit.job_hash) {
                outcome.inserted.push(unit.job_hash.clone());
            } else {
                outcome.conflicts.push(unit.job_hash.clone());
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find_by_hash(&self, hashes: &[String]) -> DbResult<Vec<JobRecord>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<JobRecordRow> = sqlx::query_as(
            r#"
            SELECT id, job_hash, job_unit::text AS job_unit, status, created_at, updated_at
            FROM job_records
            WHERE job_hash = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(hashes)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
        cursor: Option<i64>,
        page_size: usize,
    ) -> DbResult<Page> {
        let rows: Vec<JobRecordRow> = sqlx::query_as(
            r#"
            SELECT id, job_hash, job_unit::text AS job_unit, status, created_at, updated_at
            FROM job_records
            WHERE status = ANY($1) AND id > $2
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(status_strings(statuses))
        .bind(cursor.unwrap_or(0))
        .bind(page_size as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(JobRecord::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        let next_cursor = records.last().map(|record| record.id);

        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn insert_many(&self, units: &[JobUnit]) -> DbResult<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        if units.is_empty() {
            return Ok(outcome);
        }

        let total_chunks = units.len().div_ceil(INSERT_CHUNK_SIZE);
        for (chunk_idx, chunk) in units.chunks(INSERT_CHUNK_SIZE).enumerate() {
            let chunk_outcome = self.insert_chunk(chunk).await?;
            debug!(
                chunk = chunk_idx + 1,
                total_chunks,
                inserted = chunk_outcome.inserted.len(),
                conflicts = chunk_outcome.conflicts.len(),
                "Inserted job record chunk"
            );
            outcome.merge(chunk_outcome);
        }

        Ok(outcome)
    }

    async fn update_status_where(
        &self,
        statuses: &[JobStatus],
        new_status: JobStatus,
    ) -> DbResult<u64> {
        // Single statement, so the status predicate is re-checked per row
        // under the row lock taken by UPDATE
        let result = sqlx::query(
            r#"
            UPDATE job_records
            SET status = $1, updated_at = NOW()
            WHERE status = ANY($2)
            "#,
        )
        .bind(new_status.as_str())
        .bind(status_strings(statuses))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> DbResult<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }
}

//! In-process job store
//!
//! Same contract as the Postgres store, held behind a mutex. Used by tests
//! and by embedders that want a dispatcher without a database. Transient
//! failures can be injected to exercise the retry paths.

use async_trait::async_trait;
use chrono::Utc;
use jobmill_common::types::{JobRecord, JobStatus, JobUnit};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{InsertOutcome, JobStore, Page};
use crate::db::{DbError, DbResult};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    records: BTreeMap<i64, JobRecord>,
    ids_by_hash: HashMap<String, i64>,
    pending_failures: u32,
    calls: u64,
}

/// Job store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` store calls fail with a transient error
    pub fn fail_next(&self, n: u32) {
        self.lock().pending_failures = n;
    }

    /// Number of store calls made so far, failed ones included
    pub fn calls(&self) -> u64 {
        self.lock().calls
    }

    /// Force a record's status, as the downstream pipeline would
    pub fn set_status(&self, job_hash: &str, status: JobStatus) -> bool {
        let mut state = self.lock();
        let Some(id) = state.ids_by_hash.get(job_hash).copied() else {
            return false;
        };
        match state.records.get_mut(&id) {
            Some(record) => {
                record.status = status;
                record.updated_at = Utc::now();
                true
            },
            None => false,
        }
    }

    /// Snapshot of a record by hash
    pub fn get(&self, job_hash: &str) -> Option<JobRecord> {
        let state = self.lock();
        let id = state.ids_by_hash.get(job_hash)?;
        state.records.get(id).cloned()
    }

    /// Overwrite a stored payload without touching its hash
    pub fn corrupt_payload(&self, job_hash: &str, input_ref: &str) -> bool {
        let mut state = self.lock();
        let Some(id) = state.ids_by_hash.get(job_hash).copied() else {
            return false;
        };
        match state.records.get_mut(&id) {
            Some(record) => {
                record.job_unit.input_ref = input_ref.to_string();
                true
            },
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep using it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and consume one injected failure, if any
    fn enter(&self, operation: &str) -> DbResult<std::sync::MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        state.calls += 1;
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(DbError::Unavailable(format!("injected failure in {operation}")));
        }
        Ok(state)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn find_by_hash(&self, hashes: &[String]) -> DbResult<Vec<JobRecord>> {
        let state = self.enter("find_by_hash")?;
        let mut ids: Vec<i64> = hashes
            .iter()
            .filter_map(|hash| state.ids_by_hash.get(hash).copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();

        Ok(ids
            .into_iter()
            .filter_map(|id| state.records.get(&id).cloned())
            .collect())
    }

    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
        cursor: Option<i64>,
        page_size: usize,
    ) -> DbResult<Page> {
        let state = self.enter("find_by_status")?;
        let after = cursor.unwrap_or(0);

        let records: Vec<JobRecord> = state
            .records
            .range(after + 1..)
            .map(|(_, record)| record)
            .filter(|record| statuses.contains(&record.status))
            .take(page_size)
            .cloned()
            .collect();

        let next_cursor = records.last().map(|record| record.id);
        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn insert_many(&self, units: &[JobUnit]) -> DbResult<InsertOutcome> {
        let mut state = self.enter("insert_many")?;
        let mut outcome = InsertOutcome::default();
        let now = Utc::now();

        for unit in units {
            if state.ids_by_hash.contains_key(&unit.job_hash) {
                outcome.conflicts.push(unit.job_hash.clone());
                continue;
            }

            state.next_id += 1;
            let id = state.next_id;
            state.ids_by_hash.insert(unit.job_hash.clone(), id);
            state.records.insert(
                id,
                JobRecord {
                    id,
                    job_hash: unit.job_hash.clone(),
                    job_unit: unit.clone(),
                    status: JobStatus::Pending,
                    created_at: now,
                    updated_at: now,
                },
            );
            outcome.inserted.push(unit.job_hash.clone());
        }

        Ok(outcome)
    }

    async fn update_status_where(
        &self,
        statuses: &[JobStatus],
        new_status: JobStatus,
    ) -> DbResult<u64> {
        let mut state = self.enter("update_status_where")?;
        let now = Utc::now();
        let mut updated = 0;

        for record in state.records.values_mut() {
            if statuses.contains(&record.status) {
                record.status = new_status;
                record.updated_at = now;
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn count(&self) -> DbResult<u64> {
        let state = self.enter("count")?;
        Ok(state.records.len() as u64)
    }
}

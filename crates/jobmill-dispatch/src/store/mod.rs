//! Job store interface
//!
//! The store is the durable, queryable collection of job records. It owns the
//! two serialization primitives the dispatcher relies on: a uniqueness
//! constraint on `job_hash`, and a conditional bulk status update that is
//! evaluated atomically per record.

pub mod backoff;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use jobmill_common::types::{JobRecord, JobStatus, JobUnit};

use crate::db::DbResult;

pub use backoff::{with_retry, RetryPolicy};
pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// One page of records ordered by store id
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<JobRecord>,
    /// Id of the last record in this page; pass it back to continue
    pub next_cursor: Option<i64>,
}

/// Per-record result of a batched insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Hashes that produced a new record
    pub inserted: Vec<String>,
    /// Hashes rejected by the uniqueness constraint
    pub conflicts: Vec<String>,
}

impl InsertOutcome {
    pub fn merge(&mut self, other: InsertOutcome) {
        self.inserted.extend(other.inserted);
        self.conflicts.extend(other.conflicts);
    }
}

/// Persistent record of admitted jobs and their status
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Records whose hash is in `hashes`
    async fn find_by_hash(&self, hashes: &[String]) -> DbResult<Vec<JobRecord>>;

    /// Up to `page_size` records with a status in `statuses` and an id
    /// greater than `cursor`, in id order
    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
        cursor: Option<i64>,
        page_size: usize,
    ) -> DbResult<Page>;

    /// Insert one `pending` record per unit; hash conflicts are reported
    /// per record, not raised
    async fn insert_many(&self, units: &[JobUnit]) -> DbResult<InsertOutcome>;

    /// Set `new_status` on every record whose status is in `statuses`,
    /// returning the number of records changed
    async fn update_status_where(
        &self,
        statuses: &[JobStatus],
        new_status: JobStatus,
    ) -> DbResult<u64>;

    /// Total number of records
    async fn count(&self) -> DbResult<u64>;
}

/// Resumable walk over records with the given statuses
///
/// Holds at most one page in memory. Stops after the first page that comes
/// back shorter than the page size.
pub struct PageCursor<'a, S: JobStore + ?Sized> {
    store: &'a S,
    statuses: Vec<JobStatus>,
    page_size: usize,
    retry: RetryPolicy,
    cursor: Option<i64>,
    exhausted: bool,
    pages_read: usize,
}

impl<'a, S: JobStore + ?Sized> PageCursor<'a, S> {
    pub fn new(store: &'a S, statuses: &[JobStatus], page_size: usize, retry: RetryPolicy) -> Self {
        Self {
            store,
            statuses: statuses.to_vec(),
            page_size: page_size.max(1),
            retry,
            cursor: None,
            exhausted: false,
            pages_read: 0,
        }
    }

    /// Continue a walk from a previously observed cursor
    pub fn resume_from(mut self, cursor: i64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Id of the last record returned so far
    pub fn position(&self) -> Option<i64> {
        self.cursor
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }

    /// Fetch the next page, or `None` once the walk is complete
    pub async fn next_page(&mut self) -> DbResult<Option<Vec<JobRecord>>> {
        if self.exhausted {
            return Ok(None);
        }

        let store = self.store;
        let statuses = self.statuses.as_slice();
        let cursor = self.cursor;
        let page_size = self.page_size;

        let page = with_retry(&self.retry, "find_by_status", || {
            store.find_by_status(statuses, cursor, page_size)
        })
        .await?;

        self.pages_read += 1;
        if page.records.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(next) = page.next_cursor {
            self.cursor = Some(next);
        }

        tracing::debug!(
            page = self.pages_read,
            records = page.records.len(),
            cursor = ?self.cursor,
            "Fetched job record page"
        );

        if page.records.is_empty() {
            return Ok(None);
        }

        Ok(Some(page.records))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn units(n: usize) -> Vec<JobUnit> {
        (0..n)
            .map(|i| JobUnit::new(format!("{i}.nwb"), json!({ "analysis_name": "fit" })).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_page_cursor_walks_all_records_in_order() {
        let store = MemoryJobStore::new();
        store.insert_many(&units(7)).await.unwrap();

        let mut cursor = PageCursor::new(&store, &[JobStatus::Pending], 3, RetryPolicy::none());
        let mut seen = Vec::new();
        while let Some(page) = cursor.next_page().await.unwrap() {
            assert!(page.len() <= 3);
            seen.extend(page.into_iter().map(|r| r.id));
        }

        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(cursor.pages_read(), 3);
    }

    #[tokio::test]
    async fn test_page_cursor_stops_after_exact_multiple() {
        let store = MemoryJobStore::new();
        store.insert_many(&units(4)).await.unwrap();

        let mut cursor = PageCursor::new(&store, &[JobStatus::Pending], 2, RetryPolicy::none());
        let mut total = 0;
        while let Some(page) = cursor.next_page().await.unwrap() {
            total += page.len();
        }

        // Two full pages, then one empty page ends the walk
        assert_eq!(total, 4);
        assert_eq!(cursor.pages_read(), 3);
    }

    #[tokio::test]
    async fn test_page_cursor_resumes_from_position() {
        let store = MemoryJobStore::new();
        store.insert_many(&units(5)).await.unwrap();

        let mut first = PageCursor::new(&store, &[JobStatus::Pending], 2, RetryPolicy::none());
        first.next_page().await.unwrap();
        let position = first.position().unwrap();

        let mut resumed = PageCursor::new(&store, &[JobStatus::Pending], 10, RetryPolicy::none())
            .resume_from(position);
        let rest = resumed.next_page().await.unwrap().unwrap();
        assert_eq!(rest.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(resumed.next_page().await.unwrap().is_none());
    }

    #[test]
    fn test_insert_outcome_merge() {
        let mut outcome = InsertOutcome {
            inserted: vec!["a".into()],
            conflicts: vec![],
        };
        outcome.merge(InsertOutcome {
            inserted: vec!["b".into()],
            conflicts: vec!["c".into()],
        });
        assert_eq!(outcome.inserted, vec!["a", "b"]);
        assert_eq!(outcome.conflicts, vec!["c"]);
    }
}

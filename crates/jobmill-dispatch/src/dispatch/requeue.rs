//! Selecting jobs eligible for (re-)dispatch
//!
//! `pending` jobs are always eligible. `failed` and `running` jobs are only
//! picked up when asked for, and are then reset to `pending` with a single
//! conditional update so a job that finished in the meantime is left alone.

use jobmill_common::types::{JobStatus, JobUnit};
use jobmill_common::JobmillError;

use super::events::{DispatchEvent, EventSink};
use crate::db::DbResult;
use crate::store::{with_retry, JobStore, PageCursor, RetryPolicy};

/// Which non-pending statuses to retry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequeuePolicy {
    pub retry_failed: bool,
    pub retry_running: bool,
}

impl RequeuePolicy {
    /// Statuses whose jobs will be dispatched, `pending` first
    pub fn eligible_statuses(&self) -> Vec<JobStatus> {
        let mut statuses = vec![JobStatus::Pending];
        statuses.extend(self.reset_statuses());
        statuses
    }

    /// Statuses that get moved back to `pending`
    pub fn reset_statuses(&self) -> Vec<JobStatus> {
        let mut statuses = Vec::new();
        if self.retry_failed {
            statuses.push(JobStatus::Failed);
        }
        if self.retry_running {
            statuses.push(JobStatus::Running);
        }
        statuses
    }
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Eligible jobs in store id order
    pub units: Vec<JobUnit>,
    /// Records moved back to `pending`
    pub reset: u64,
    /// Hashes whose stored payload no longer matches
    pub mismatches: Vec<String>,
}

/// Collect every eligible job and reset retried statuses to `pending`
pub async fn select_eligible<S: JobStore + ?Sized>(
    store: &S,
    policy: RequeuePolicy,
    page_size: usize,
    retry: &RetryPolicy,
    sink: &dyn EventSink,
) -> DbResult<Selection> {
    let mut selection = collect_eligible(store, policy, page_size, retry, sink).await?;

    let reset_statuses = policy.reset_statuses();
    if !reset_statuses.is_empty() {
        let count = with_retry(retry, "update_status_where", || {
            store.update_status_where(&reset_statuses, JobStatus::Pending)
        })
        .await?;

        selection.reset = count;
        sink.emit(DispatchEvent::StatusReset {
            from: reset_statuses.iter().map(|s| s.as_str().to_string()).collect(),
            count,
        });
    }

    sink.emit(DispatchEvent::EligibleSelected {
        count: selection.units.len(),
    });

    Ok(selection)
}

/// Read every eligible job without changing any status
pub async fn collect_eligible<S: JobStore + ?Sized>(
    store: &S,
    policy: RequeuePolicy,
    page_size: usize,
    retry: &RetryPolicy,
    sink: &dyn EventSink,
) -> DbResult<Selection> {
    let mut selection = Selection::default();
    let mut cursor = PageCursor::new(store, &policy.eligible_statuses(), page_size, *retry);

    while let Some(page) = cursor.next_page().await? {
        for record in page {
            match record.job_unit.verify_hash() {
                Ok(()) if record.job_unit.job_hash == record.job_hash => {
                    selection.units.push(record.job_unit)
                },
                Ok(()) => {
                    sink.emit(DispatchEvent::IdentityMismatch {
                        job_hash: record.job_hash.clone(),
                        computed: record.job_unit.job_hash.clone(),
                    });
                    selection.mismatches.push(record.job_hash);
                },
                Err(err) => {
                    let computed = match err {
                        JobmillError::HashMismatch { computed, .. } => computed,
                        other => other.to_string(),
                    };
                    sink.emit(DispatchEvent::IdentityMismatch {
                        job_hash: record.job_hash.clone(),
                        computed,
                    });
                    selection.mismatches.push(record.job_hash);
                },
            }
        }
    }

    Ok(selection)
}

//! Committing new jobs to the store

use jobmill_common::types::JobUnit;

use super::events::{DispatchEvent, EventSink};
use crate::db::DbResult;
use crate::store::{with_retry, JobStore, RetryPolicy};

/// What admission did with the units it was given
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionOutcome {
    pub admitted: Vec<String>,
    /// Hashes another writer created between dedup and insert
    pub conflicts: Vec<String>,
}

/// Insert every unit as a `pending` record
///
/// Uniqueness conflicts are soft: they are reported, never raised. A retried
/// write whose first attempt was committed reports its rows as conflicts.
pub async fn admit<S: JobStore + ?Sized>(
    store: &S,
    units: &[JobUnit],
    retry: &RetryPolicy,
    sink: &dyn EventSink,
) -> DbResult<AdmissionOutcome> {
    if units.is_empty() {
        sink.emit(DispatchEvent::AdmissionCompleted {
            admitted: 0,
            conflicts: 0,
        });
        return Ok(AdmissionOutcome::default());
    }

    let outcome = with_retry(retry, "insert_many", || store.insert_many(units)).await?;

    for job_hash in &outcome.conflicts {
        sink.emit(DispatchEvent::AdmissionConflict {
            job_hash: job_hash.clone(),
        });
    }
    sink.emit(DispatchEvent::AdmissionCompleted {
        admitted: outcome.inserted.len(),
        conflicts: outcome.conflicts.len(),
    });

    Ok(AdmissionOutcome {
        admitted: outcome.inserted,
        conflicts: outcome.conflicts,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dispatch::events::MemorySink;
    use crate::store::MemoryJobStore;
    use jobmill_common::types::JobStatus;
    use serde_json::json;

    fn unit(input: &str) -> JobUnit {
        JobUnit::new(input, json!({ "analysis_name": "fit" })).unwrap()
    }

    #[tokio::test]
    async fn test_admits_as_pending() {
        let store = MemoryJobStore::new();
        let sink = MemorySink::new();
        let outcome = admit(&store, &[unit("a.nwb"), unit("b.nwb")], &RetryPolicy::none(), &sink)
            .await
            .unwrap();

        assert_eq!(outcome.admitted.len(), 2);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(store.get(&unit("b.nwb").job_hash).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_concurrent_admission_is_a_soft_conflict() {
        let store = MemoryJobStore::new();
        // Another dispatcher got there first
        store.insert_many(&[unit("a.nwb")]).await.unwrap();

        let sink = MemorySink::new();
        let outcome = admit(&store, &[unit("a.nwb"), unit("b.nwb")], &RetryPolicy::none(), &sink)
            .await
            .unwrap();

        assert_eq!(outcome.admitted, vec![unit("b.nwb").job_hash]);
        assert_eq!(outcome.conflicts, vec![unit("a.nwb").job_hash]);
        assert_eq!(sink.count(|e| matches!(e, DispatchEvent::AdmissionConflict { .. })), 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_nothing_to_admit() {
        let store = MemoryJobStore::new();
        let outcome = admit(&store, &[], &RetryPolicy::none(), &MemorySink::new()).await.unwrap();
        assert_eq!(outcome, AdmissionOutcome::default());
        assert_eq!(store.calls(), 0);
    }
}

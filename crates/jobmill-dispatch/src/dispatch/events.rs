//! Structured dispatch events
//!
//! Stages report what they did through an injected [`EventSink`] rather than
//! logging directly, so embedders and tests can observe a pass.

use std::sync::{Arc, Mutex};

/// Something notable that happened during a dispatch pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A spec failed validation for one input and was skipped
    SpecRejected {
        input_ref: String,
        spec: String,
        reason: String,
    },
    CandidatesGenerated {
        inputs: usize,
        specs: usize,
        candidates: usize,
    },
    /// Two catalog entries produced the same job
    DuplicateCandidate { job_hash: String },
    DedupCompleted {
        strategy: &'static str,
        new: usize,
        existing: usize,
    },
    /// The store already held a hash that dedup considered new
    AdmissionConflict { job_hash: String },
    AdmissionCompleted { admitted: usize, conflicts: usize },
    StatusReset { from: Vec<String>, count: u64 },
    /// A stored record's payload no longer hashes to its key
    IdentityMismatch {
        job_hash: String,
        computed: String,
    },
    EligibleSelected { count: usize },
    ShardWritten {
        worker: usize,
        jobs: usize,
        path: String,
    },
    /// Nothing to assign; no output was produced
    NothingToAssign,
}

/// Receiver of dispatch events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DispatchEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: DispatchEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: DispatchEvent) {
        match event {
            DispatchEvent::SpecRejected {
                input_ref,
                spec,
                reason,
            } => {
                tracing::warn!(input_ref = %input_ref, spec = %spec, reason = %reason, "Skipping malformed analysis spec")
            },
            DispatchEvent::CandidatesGenerated {
                inputs,
                specs,
                candidates,
            } => tracing::info!(inputs, specs, candidates, "Generated candidate jobs"),
            DispatchEvent::DuplicateCandidate { job_hash } => {
                tracing::debug!(job_hash = %job_hash, "Collapsed duplicate candidate")
            },
            DispatchEvent::DedupCompleted {
                strategy,
                new,
                existing,
            } => tracing::info!(strategy, new, existing, "Deduplicated against job store"),
            DispatchEvent::AdmissionConflict { job_hash } => {
                tracing::warn!(job_hash = %job_hash, "Job admitted concurrently, skipping")
            },
            DispatchEvent::AdmissionCompleted {
                admitted,
                conflicts,
            } => tracing::info!(admitted, conflicts, "Admitted new jobs"),
            DispatchEvent::StatusReset { from, count } => {
                tracing::info!(from = ?from, count, "Reset jobs to pending")
            },
            DispatchEvent::IdentityMismatch { job_hash, computed } => {
                tracing::error!(job_hash = %job_hash, computed = %computed, "Stored job does not match its hash, skipping")
            },
            DispatchEvent::EligibleSelected { count } => {
                tracing::info!(count, "Selected eligible jobs")
            },
            DispatchEvent::ShardWritten { worker, jobs, path } => {
                tracing::debug!(worker, jobs, path = %path, "Wrote worker shard")
            },
            DispatchEvent::NothingToAssign => tracing::info!("No eligible jobs, nothing to assign"),
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DispatchEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DispatchEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(*event)).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: DispatchEvent) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(DispatchEvent::NothingToAssign);
        sink.emit(DispatchEvent::EligibleSelected { count: 3 });

        assert_eq!(
            sink.events(),
            vec![DispatchEvent::NothingToAssign, DispatchEvent::EligibleSelected { count: 3 }]
        );
        assert_eq!(sink.count(|e| matches!(e, DispatchEvent::NothingToAssign)), 1);
    }

    #[test]
    fn test_arc_sink_forwards() {
        let sink = Arc::new(MemorySink::new());
        let shared: Arc<dyn EventSink> = sink.clone();
        shared.emit(DispatchEvent::NothingToAssign);
        assert_eq!(sink.events().len(), 1);
    }
}

//! One full dispatch pass
//!
//! generate → dedup → admit → select eligible → assign shards
//!
//! Every stage is idempotent with respect to the store, so a pass that fails
//! part-way can simply be run again.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::admission::admit;
use super::dedup::{DedupStrategy, Deduplicator};
use super::events::{DispatchEvent, EventSink, TracingSink};
use super::generator::{generate, Generated};
use super::requeue::{collect_eligible, select_eligible, RequeuePolicy};
use super::shard::{plan_shards, Assignment, ShardWriter};
use super::sources::{AnalysisCatalog, InputLister};
use super::stats::RunSummary;
use crate::config::{Config, DEFAULT_PAGE_SIZE, DEFAULT_WORKERS};
use crate::error::{DispatchError, DispatchResult};
use crate::store::{JobStore, RetryPolicy};

/// Knobs for a dispatch pass
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub workers: usize,
    pub output_dir: PathBuf,
    pub requeue: RequeuePolicy,
    pub dedup: Deduplicator,
    pub page_size: usize,
    pub retry: RetryPolicy,
    /// Stop before writing to the store or the output directory
    pub dry_run: bool,
    /// The store is a stand-in for one that could not be reached
    pub store_unreachable: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            output_dir: PathBuf::from(crate::config::DEFAULT_OUTPUT_DIR),
            requeue: RequeuePolicy::default(),
            dedup: Deduplicator::default(),
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            dry_run: false,
            store_unreachable: false,
        }
    }
}

impl From<&Config> for DispatchOptions {
    fn from(config: &Config) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let dispatch = &config.dispatch;
        Self {
            workers: dispatch.workers,
            output_dir: dispatch.output_dir.clone(),
            requeue: RequeuePolicy {
                retry_failed: dispatch.retry_failed,
                retry_running: dispatch.retry_running,
            },
            dedup: Deduplicator::new(
                dispatch.dedup_strategy,
                dispatch.dedup_batch_size,
                dispatch.page_size,
                retry,
            ),
            page_size: dispatch.page_size,
            retry,
            dry_run: false,
            store_unreachable: false,
        }
    }
}

impl DispatchOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_requeue(mut self, requeue: RequeuePolicy) -> Self {
        self.requeue = requeue;
        self
    }

    pub fn with_dedup_strategy(mut self, strategy: DedupStrategy) -> Self {
        self.dedup.strategy = strategy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.dedup.retry = retry;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Mark the summary as computed without the real store
    pub fn with_store_unreachable(mut self, unreachable: bool) -> Self {
        self.store_unreachable = unreachable;
        self
    }
}

/// Outcome of a full pass
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub summary: RunSummary,
    /// `None` for a dry run or when nothing was eligible
    pub assignment: Option<Assignment>,
}

/// Wires the stages to a store, an input lister and a catalog
pub struct DispatchPipeline {
    store: Arc<dyn JobStore>,
    inputs: Arc<dyn InputLister>,
    catalog: Arc<dyn AnalysisCatalog>,
    sink: Arc<dyn EventSink>,
    options: DispatchOptions,
}

impl DispatchPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        inputs: Arc<dyn InputLister>,
        catalog: Arc<dyn AnalysisCatalog>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            store,
            inputs,
            catalog,
            sink: Arc::new(TracingSink),
            options,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// List inputs and specs and build the candidate set, touching nothing
    pub async fn generate(&self) -> DispatchResult<(RunSummary, Generated)> {
        let inputs = self.inputs.list_inputs().await?;
        let specs = self.catalog.analysis_specs().await?;
        let generated = generate(&inputs, &specs, self.sink.as_ref());

        let mut summary = RunSummary::new(Uuid::new_v4());
        summary.inputs = inputs.len();
        summary.specs = specs.len();
        summary.generated = generated.candidates.len();
        summary.rejected = generated.rejected.len();
        summary.duplicates = generated.duplicates;

        Ok((summary, generated))
    }

    /// Run every stage and write the worker shards
    #[instrument(skip(self), fields(workers = self.options.workers, dry_run = self.options.dry_run))]
    pub async fn run(&self) -> DispatchResult<DispatchReport> {
        if self.options.workers == 0 {
            return Err(DispatchError::InvalidWorkerCount(0));
        }

        let store = self.store.as_ref();
        let sink = self.sink.as_ref();
        let (mut summary, generated) = self.generate().await?;
        summary.dry_run = self.options.dry_run;
        summary.store_unreachable = self.options.store_unreachable;

        let deduped = self.options.dedup.partition(store, generated.candidates).await?;
        summary.new = deduped.new.len();
        summary.already_existing = deduped.existing.len();
        sink.emit(DispatchEvent::DedupCompleted {
            strategy: deduped
                .strategy
                .unwrap_or(self.options.dedup.strategy)
                .as_str(),
            new: summary.new,
            existing: summary.already_existing,
        });

        if self.options.dry_run {
            // Report what would be dispatched without writing anywhere
            let pending =
                collect_eligible(store, self.options.requeue, self.options.page_size, &self.options.retry, sink)
                    .await?;
            summary.eligible = pending.units.len() + deduped.new.len();
            summary.identity_mismatches = pending.mismatches.len();
            summary.assigned = summary.eligible;
            summary.shards = self.options.workers.min(summary.eligible);

            info!(summary = %summary, "Dry run complete");
            return Ok(DispatchReport {
                summary,
                assignment: None,
            });
        }

        let admission = admit(store, &deduped.new, &self.options.retry, sink).await?;
        summary.admitted = admission.admitted.len();
        summary.conflicts = admission.conflicts.len();

        let selection =
            select_eligible(store, self.options.requeue, self.options.page_size, &self.options.retry, sink)
                .await?;
        summary.eligible = selection.units.len();
        summary.reset = selection.reset;
        summary.identity_mismatches = selection.mismatches.len();

        let shards = plan_shards(selection.units, self.options.workers)?;
        let writer = ShardWriter::new(&self.options.output_dir);
        let assignment = writer.write(&shards, summary.run_id, sink).await?;

        if let Some(assignment) = &assignment {
            summary.assigned = assignment.total_jobs();
            summary.shards = assignment.workers;
        }

        info!(
            run_id = %summary.run_id,
            generated = summary.generated,
            new = summary.new,
            admitted = summary.admitted,
            eligible = summary.eligible,
            assigned = summary.assigned,
            shards = summary.shards,
            "Dispatch pass complete"
        );

        Ok(DispatchReport {
            summary,
            assignment,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dispatch::events::MemorySink;
    use crate::dispatch::sources::{StaticCatalog, StaticInputs};
    use crate::store::MemoryJobStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn pipeline(store: Arc<MemoryJobStore>, dir: &TempDir, options: DispatchOptions) -> DispatchPipeline {
        DispatchPipeline::new(
            store,
            Arc::new(StaticInputs::new(["a.nwb", "b.nwb", "c.nwb"])),
            Arc::new(StaticCatalog::new(vec![json!({ "analysis_name": "fit" })])),
            options
                .with_output_dir(dir.path())
                .with_retry(RetryPolicy::none()),
        )
        .with_sink(Arc::new(MemorySink::new()))
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let report = pipeline(store.clone(), &dir, DispatchOptions::default().dry_run(true))
            .run()
            .await
            .unwrap();

        assert!(report.summary.dry_run);
        assert_eq!(report.summary.new, 3);
        assert_eq!(report.summary.eligible, 3);
        assert!(report.assignment.is_none());
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_flags_unreachable_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let options = DispatchOptions::default()
            .dry_run(true)
            .with_store_unreachable(true);
        let report = pipeline(store, &dir, options).run().await.unwrap();

        assert!(report.summary.store_unreachable);
        assert!(report.summary.to_string().contains("store unreachable"));
    }

    #[tokio::test]
    async fn test_zero_workers_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let err = pipeline(store, &dir, DispatchOptions::default().with_workers(0))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidWorkerCount(0)));
    }

    #[tokio::test]
    async fn test_generate_counts_candidates() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let (summary, generated) = pipeline(store.clone(), &dir, DispatchOptions::default())
            .generate()
            .await
            .unwrap();

        assert_eq!(summary.generated, 3);
        assert_eq!(generated.candidates.len(), 3);
        assert_eq!(store.calls(), 0);
    }
}

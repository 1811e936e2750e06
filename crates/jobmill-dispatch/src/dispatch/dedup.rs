//! Reconciling candidates against the job store
//!
//! Two ways to learn which hashes the store already holds: ask for the
//! candidates' hashes in batches, or walk every record page by page. The
//! first costs one query per batch of candidates, the second one query per
//! page of store records; `Auto` picks whichever side is smaller.

use clap::ValueEnum;
use jobmill_common::types::{JobStatus, JobUnit};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use crate::config::{DEFAULT_DEDUP_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::db::DbResult;
use crate::store::{with_retry, JobStore, PageCursor, RetryPolicy};

/// How the deduplicator queries the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DedupStrategy {
    /// One membership query per batch of candidate hashes
    Batched,
    /// Walk every stored record in id order
    PagedScan,
    /// Scan when the store is no larger than the candidate set
    ///
    /// A scan reads every stored record, so it only beats batched lookups
    /// while the store is small. Against a store much larger than the
    /// candidate set, `Auto` resolves to `Batched`. Pick `PagedScan`
    /// explicitly to walk a large store anyway, for instance when the
    /// backend handles big `ANY` lists badly.
    #[default]
    Auto,
}

impl DedupStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupStrategy::Batched => "batched",
            DedupStrategy::PagedScan => "paged-scan",
            DedupStrategy::Auto => "auto",
        }
    }
}

impl FromStr for DedupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "batched" | "batch" => Ok(DedupStrategy::Batched),
            "paged-scan" | "paged_scan" | "scan" => Ok(DedupStrategy::PagedScan),
            "auto" => Ok(DedupStrategy::Auto),
            other => Err(format!(
                "unknown dedup strategy '{other}', expected batched, paged-scan or auto"
            )),
        }
    }
}

impl std::fmt::Display for DedupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidates split by whether the store already knows them
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub new: Vec<JobUnit>,
    pub existing: Vec<JobUnit>,
    /// Strategy actually used, after resolving `Auto`
    pub strategy: Option<DedupStrategy>,
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    pub strategy: DedupStrategy,
    pub batch_size: usize,
    pub page_size: usize,
    pub retry: RetryPolicy,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self {
            strategy: DedupStrategy::Auto,
            batch_size: DEFAULT_DEDUP_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl Deduplicator {
    pub fn new(strategy: DedupStrategy, batch_size: usize, page_size: usize, retry: RetryPolicy) -> Self {
        Self {
            strategy,
            batch_size: batch_size.max(1),
            page_size: page_size.max(1),
            retry,
        }
    }

    /// Split `candidates` into those absent from and present in the store
    ///
    /// Candidate order is preserved on both sides.
    pub async fn partition<S: JobStore + ?Sized>(
        &self,
        store: &S,
        candidates: Vec<JobUnit>,
    ) -> DbResult<DedupOutcome> {
        if candidates.is_empty() {
            return Ok(DedupOutcome::default());
        }

        let strategy = self.resolve(store, candidates.len()).await?;
        let known = match strategy {
            DedupStrategy::PagedScan => self.scan_known(store).await?,
            _ => self.batched_known(store, &candidates).await?,
        };

        let (existing, new): (Vec<JobUnit>, Vec<JobUnit>) = candidates
            .into_iter()
            .partition(|unit| known.contains(&unit.job_hash));

        Ok(DedupOutcome {
            new,
            existing,
            strategy: Some(strategy),
        })
    }

    async fn resolve<S: JobStore + ?Sized>(&self, store: &S, candidates: usize) -> DbResult<DedupStrategy> {
        if self.strategy != DedupStrategy::Auto {
            return Ok(self.strategy);
        }

        let stored = with_retry(&self.retry, "count", || store.count()).await?;
        let strategy = if stored <= candidates as u64 {
            DedupStrategy::PagedScan
        } else {
            DedupStrategy::Batched
        };
        debug!(stored, candidates, strategy = %strategy, "Resolved dedup strategy");
        Ok(strategy)
    }

    /// Hashes among `candidates` that the store holds
    async fn batched_known<S: JobStore + ?Sized>(
        &self,
        store: &S,
        candidates: &[JobUnit],
    ) -> DbResult<HashSet<String>> {
        let hashes: Vec<String> = candidates.iter().map(|unit| unit.job_hash.clone()).collect();
        let mut known = HashSet::new();

        for (batch_idx, batch) in hashes.chunks(self.batch_size).enumerate() {
            let records = with_retry(&self.retry, "find_by_hash", || store.find_by_hash(batch)).await?;
            debug!(batch = batch_idx + 1, size = batch.len(), found = records.len(), "Checked hash batch");
            known.extend(records.into_iter().map(|record| record.job_hash));
        }

        Ok(known)
    }

    /// Every hash the store holds, whatever its status
    async fn scan_known<S: JobStore + ?Sized>(&self, store: &S) -> DbResult<HashSet<String>> {
        let mut cursor = PageCursor::new(store, &JobStatus::ALL, self.page_size, self.retry);
        let mut known = HashSet::new();

        while let Some(page) = cursor.next_page().await? {
            known.extend(page.into_iter().map(|record| record.job_hash));
        }

        debug!(pages = cursor.pages_read(), known = known.len(), "Scanned job store");
        Ok(known)
    }
}

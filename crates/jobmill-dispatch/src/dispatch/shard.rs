//! Partitioning eligible jobs across workers
//!
//! Shards are contiguous slices of the eligible list whose sizes differ by
//! at most one. Each shard is materialized as a `worker_<index>` directory
//! holding one pretty-printed JSON file per job, named by its hash.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use jobmill_common::types::JobUnit;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Serializer;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::events::{DispatchEvent, EventSink};
use crate::error::{DispatchError, DispatchResult};

/// Prefix of per-worker output directories
pub const WORKER_DIR_PREFIX: &str = "worker_";

/// Name of the manifest written next to the worker directories
pub const MANIFEST_FILE: &str = "assignment.json";

/// Split `units` into at most `requested` contiguous, near-equal shards
///
/// The first `len % shards` shards get one extra job. No shard is empty, so
/// fewer jobs than workers yields one shard per job.
pub fn plan_shards(units: Vec<JobUnit>, requested: usize) -> DispatchResult<Vec<Vec<JobUnit>>> {
    if requested == 0 {
        return Err(DispatchError::InvalidWorkerCount(requested));
    }
    if units.is_empty() {
        return Ok(Vec::new());
    }

    let workers = requested.min(units.len());
    let base = units.len() / workers;
    let extra = units.len() % workers;

    let mut shards = Vec::with_capacity(workers);
    let mut remaining = units.into_iter();
    for index in 0..workers {
        let size = base + usize::from(index < extra);
        shards.push(remaining.by_ref().take(size).collect());
    }

    Ok(shards)
}

/// Record of one materialized assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub workers: usize,
    pub shards: Vec<ShardManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub worker: usize,
    pub directory: String,
    pub job_hashes: Vec<String>,
}

impl Assignment {
    pub fn total_jobs(&self) -> usize {
        self.shards.iter().map(|shard| shard.job_hashes.len()).sum()
    }
}

/// Serialize with four-space indentation
pub fn to_pretty_json<T: Serialize>(value: &T) -> DispatchResult<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Write one JSON file per job unit into `dir`, named `<job_hash>.json`
pub async fn write_job_files(dir: &Path, units: &[JobUnit]) -> DispatchResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DispatchError::output(dir, e))?;

    for unit in units {
        let path = dir.join(format!("{}.json", unit.job_hash));
        let body = to_pretty_json(unit)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| DispatchError::output(&path, e))?;
    }

    Ok(())
}

/// Materializes shards under an output root
#[derive(Debug, Clone)]
pub struct ShardWriter {
    root: PathBuf,
}

impl ShardWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn worker_dir(&self, index: usize) -> PathBuf {
        self.root.join(format!("{WORKER_DIR_PREFIX}{index}"))
    }

    /// Replace any previous assignment with `shards`
    ///
    /// With no shards the previous assignment is retracted: old worker
    /// directories and the manifest are removed and `None` is returned. A
    /// missing output root is left missing.
    pub async fn write(
        &self,
        shards: &[Vec<JobUnit>],
        run_id: Uuid,
        sink: &dyn EventSink,
    ) -> DispatchResult<Option<Assignment>> {
        if shards.is_empty() {
            if tokio::fs::try_exists(&self.root).await? {
                self.clear_previous().await?;
                self.remove_manifest().await?;
            }
            sink.emit(DispatchEvent::NothingToAssign);
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DispatchError::output(&self.root, e))?;
        self.clear_previous().await?;

        let writes = shards.iter().enumerate().map(|(index, shard)| async move {
            let dir = self.worker_dir(index);
            write_job_files(&dir, shard).await?;
            sink.emit(DispatchEvent::ShardWritten {
                worker: index,
                jobs: shard.len(),
                path: dir.display().to_string(),
            });
            Ok::<_, DispatchError>(ShardManifest {
                worker: index,
                directory: format!("{WORKER_DIR_PREFIX}{index}"),
                job_hashes: shard.iter().map(|unit| unit.job_hash.clone()).collect(),
            })
        });
        let manifests = try_join_all(writes).await?;

        let assignment = Assignment {
            run_id,
            created_at: Utc::now(),
            workers: manifests.len(),
            shards: manifests,
        };
        let manifest_path = self.root.join(MANIFEST_FILE);
        tokio::fs::write(&manifest_path, to_pretty_json(&assignment)?)
            .await
            .map_err(|e| DispatchError::output(&manifest_path, e))?;

        Ok(Some(assignment))
    }

    /// Remove `worker_*` directories left by an earlier run
    async fn clear_previous(&self) -> DispatchResult<()> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_worker_dir = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(WORKER_DIR_PREFIX));
            if is_worker_dir && entry.file_type().await?.is_dir() {
                let path = entry.path();
                tokio::fs::remove_dir_all(&path)
                    .await
                    .map_err(|e| DispatchError::output(&path, e))?;
                debug!(path = %path.display(), "Removed previous worker directory");
            }
        }
        Ok(())
    }

    async fn remove_manifest(&self) -> DispatchResult<()> {
        let path = self.root.join(MANIFEST_FILE);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed previous assignment manifest");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DispatchError::output(&path, e)),
        }
    }
}

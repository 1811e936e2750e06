//! Shared fixtures for jobmill-dispatch integration tests
//!
//! Job unit builders, a pipeline wired to an in-memory store, and a
//! PostgreSQL test container with migrations applied for the store tests
//! that need a real database (Docker required).
#![allow(dead_code)]

use anyhow::{Context, Result};
use jobmill_common::types::JobUnit;
use jobmill_dispatch::dispatch::{
    DispatchOptions, DispatchPipeline, MemorySink, StaticCatalog, StaticInputs,
};
use jobmill_dispatch::store::{MemoryJobStore, RetryPolicy};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

// ============================================================================
// Job fixtures
// ============================================================================

pub fn fit_spec() -> Value {
    json!({
        "analysis_name": "MLE fitting",
        "analysis_ver": "first version @ 0.10.0",
        "analysis_args": { "agent_class": "ForagerQLearning" },
    })
}

pub fn unit(input_ref: &str) -> JobUnit {
    JobUnit::new(input_ref, fit_spec()).unwrap()
}

pub fn units(count: usize) -> Vec<JobUnit> {
    (0..count).map(|i| unit(&format!("session_{i:04}.nwb"))).collect()
}

/// Pipeline over a memory store with retries disabled
pub fn memory_pipeline(
    store: Arc<MemoryJobStore>,
    sink: Arc<MemorySink>,
    inputs: &[&str],
    specs: Vec<Value>,
    output_dir: &Path,
    options: DispatchOptions,
) -> DispatchPipeline {
    DispatchPipeline::new(
        store,
        Arc::new(StaticInputs::new(inputs.iter().copied())),
        Arc::new(StaticCatalog::new(specs)),
        options
            .with_output_dir(output_dir)
            .with_retry(RetryPolicy::none()),
    )
    .with_sink(sink)
}

/// Names of the `worker_*` directories under `root`, sorted
pub fn worker_dirs(root: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_dir())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.starts_with("worker_"))
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

/// Number of job files in each worker directory, in worker order
pub fn shard_sizes(root: &Path) -> Vec<usize> {
    worker_dirs(root)
        .iter()
        .map(|dir| std::fs::read_dir(root.join(dir)).map(|e| e.count()).unwrap_or(0))
        .collect()
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the job_records migration applied
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;
        let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        jobmill_dispatch::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { container, pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,jobmill_dispatch=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

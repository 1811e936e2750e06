//! jobmill Dispatch Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Job admission and work distribution in front of an analysis pipeline.
//!
//! # Overview
//!
//! A dispatch pass crosses every input dataset with every analysis spec,
//! identifies each pairing by a content hash, admits the ones the job store
//! has never seen, and fans the currently eligible jobs out to a fixed
//! number of worker directories.
//!
//! - **Store**: the [`store::JobStore`] trait with Postgres and in-memory
//!   implementations, paged reads, and retry of transient errors
//! - **Dispatch**: generation, dedup, admission, requeue and sharding stages
//!   driven by [`dispatch::DispatchPipeline`]
//! - **Configuration**: environment-based settings via [`config::Config`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jobmill_dispatch::config::Config;
//! use jobmill_dispatch::dispatch::{DirectoryInputs, DispatchOptions, DispatchPipeline, StaticCatalog};
//! use jobmill_dispatch::{db, store::PgJobStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let pipeline = DispatchPipeline::new(
//!         Arc::new(PgJobStore::new(pool)),
//!         Arc::new(DirectoryInputs::new(&config.dispatch.input_dir, "nwb")),
//!         Arc::new(StaticCatalog::builtin()),
//!         DispatchOptions::from(&config),
//!     );
//!     let report = pipeline.run().await?;
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use error::{DispatchError, DispatchResult};

//! jobmill Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, hashing, and error handling for the jobmill workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`JobmillError`] and the [`Result`] alias
//! - **Checksums**: canonical JSON encoding and content hashing of job units
//! - **Types**: `JobUnit`, `JobRecord`, `JobStatus`
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use jobmill_common::types::JobUnit;
//! use serde_json::json;
//!
//! fn main() -> jobmill_common::Result<()> {
//!     let spec = json!({ "analysis_name": "MLE fitting", "analysis_ver": "0.10.0" });
//!     let unit = JobUnit::new("a.nwb", spec)?;
//!     println!("job hash: {}", unit.job_hash);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{JobmillError, Result};

//! Job admission and work distribution
//!
//! The stages of a dispatch pass, leaf-first: candidate generation, dedup
//! against the store, admission of new jobs, selection of eligible jobs, and
//! assignment of those jobs to worker shards. [`pipeline::DispatchPipeline`]
//! runs them in order.

pub mod admission;
pub mod dedup;
pub mod events;
pub mod generator;
pub mod pipeline;
pub mod requeue;
pub mod shard;
pub mod sources;
pub mod stats;

pub use dedup::{DedupStrategy, Deduplicator};
pub use events::{DispatchEvent, EventSink, MemorySink, TracingSink};
pub use pipeline::{DispatchOptions, DispatchPipeline, DispatchReport};
pub use requeue::RequeuePolicy;
pub use sources::{AnalysisCatalog, DirectoryInputs, InputLister, JsonFileCatalog, StaticCatalog, StaticInputs};
pub use stats::RunSummary;

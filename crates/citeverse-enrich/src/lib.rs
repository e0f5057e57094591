//! Enrichment pipeline: rate-limited fetching, source adapters, and the
//! batch passes that fill missing paper attributes.
//!
//! Every pass is an idempotent, resumable batch job: select rows whose
//! target attribute is still missing, fetch replacements from external
//! sources with fallbacks, write back with fill-if-absent semantics, and
//! report counts. Re-running after an interruption picks up exactly the
//! unsatisfied remainder.

pub mod annotate;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod sources;

pub use fetcher::{FetchError, Fetcher, RetryPolicy};
pub use models::{AttributeGroup, PartialRecord, SourceTag};
pub use pipeline::{EnrichmentConfig, RunSummary};

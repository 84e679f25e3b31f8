//! # textgate-ingest
//!
//! The secure ingestion and containment pipeline: the part of textgate
//! that decides whether an input is safe to process, bounds the resources
//! it may consume, and expands nested content under strict limits.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`sniff`] | True content type from magic bytes; type-forgery detection |
//! | [`sanitize`] | Hostile paths mapped to safe, collision-free names |
//! | [`unpack`] | Recursive archive expansion under budget |
//! | [`pipeline`] | Orchestration: strategy selection, watchdog, reporting |
//!
//! ## Guard model
//!
//! Every byte decompressed, every nesting level entered, and every second
//! spent is charged against the request's [`ResourceBudget`]
//! (re-exported from `textgate-core`). Guard violations abort the whole
//! request; only per-unit extraction failures are partial.

pub mod pipeline;
pub mod sanitize;
pub mod sniff;
pub mod unpack;

pub use pipeline::{IngestionPipeline, PipelineConfig};
pub use sanitize::PathSanitizer;
pub use sniff::{declared_kind, sniff, verify_consistency};
pub use unpack::ArchiveUnpacker;

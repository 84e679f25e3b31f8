//! # textgate-core
//!
//! Core types and traits for textgate, a secure file-to-text ingestion
//! service.
//!
//! This crate provides the foundational abstractions used throughout
//! textgate:
//!
//! - **Resource Budgets**: [`ResourceBudget`] and [`ExpansionState`] bound
//!   every byte, depth level and wall-clock second a request may consume
//! - **Content Units**: [`ContentUnit`] is one sanitized leaf piece of
//!   extractable content (a file, an archive entry, a web image)
//! - **Format Extraction**: [`FormatExtractor`] trait consumed by the
//!   pipeline for per-format text extraction
//! - **Page Rendering**: [`PageRenderer`] / [`BrowserSession`] traits
//!   hiding the headless-browser engine behind a narrow seam
//!
//! ## Architecture
//!
//! ```text
//! Input → TypeSniffer → {ArchiveUnpacker | RemoteFetcher | passthrough}
//!       → PathSanitizer → budget checks → ContentUnit sequence
//!       → FormatExtractor → IngestReport
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ResourceBudget`] | Immutable per-request limits |
//! | [`ExpansionState`] | Mutable per-request expansion accounting |
//! | [`ContentUnit`] | One sanitized piece of extractable content |
//! | [`ContentKind`] | Sniffed/declared content classification |
//! | [`IngestSource`] | Upload, base64 payload or URL input |
//! | [`IngestReport`] | Ordered per-unit extraction results |
//! | [`IngestError`] | Guard-failure taxonomy with stable status codes |
//!
//! ## Related Crates
//!
//! - `textgate-ingest`: sniffing, sanitizing, unpacking, orchestration
//! - `textgate-fetch`: SSRF-guarded remote fetching and JS rendering
//! - `textgate-extract`: `FormatExtractor` implementations

pub mod budget;
pub mod error;
pub mod traits;
pub mod types;

pub use budget::{ExpansionState, ResourceBudget};
pub use error::{ExtractError, IngestError, Result};
pub use traits::*;
pub use types::*;

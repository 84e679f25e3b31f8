//! # textgate-extract
//!
//! `FormatExtractor` implementations for the textgate pipeline.
//!
//! The pipeline treats extraction as an external capability: it hands a
//! sniffed, sanitized [`ContentUnit`](textgate_core::ContentUnit) to the
//! registry and gets text (or a per-unit error) back. Everything here is
//! a thin call into a mature parsing library; the adversarial-input
//! engineering lives upstream in `textgate-ingest`.
//!
//! ## Extractors
//!
//! | Extractor | Kinds | Notes |
//! |-----------|-------|-------|
//! | [`TextExtractor`] | plain text, markdown, xml, rtf-lite | UTF-8 → WINDOWS-1251 → LATIN-1 fallback |
//! | [`HtmlExtractor`] | html | script/style stripped, whitespace collapsed |
//! | [`JsonExtractor`] | json | recursive string harvest with dotted paths |
//! | [`PdfExtractor`] | pdf | text layer only |

pub mod html;
pub mod json;
pub mod pdf;
pub mod registry;
pub mod text;

pub use html::HtmlExtractor;
pub use json::JsonExtractor;
pub use pdf::PdfExtractor;
pub use registry::ExtractorRegistry;
pub use text::TextExtractor;

//! Core types for textgate.
//!
//! ## Content classification
//! - [`ContentKind`]: what a piece of content actually is (sniffed) or
//!   claims to be (declared)
//! - [`ArchiveKind`]: supported container formats
//! - [`ExtractorFamily`]: coarse grouping used for type-forgery checks
//!
//! ## Request flow
//! - [`IngestSource`]: the three accepted input shapes
//! - [`FetchOptions`]: per-URL fetch/render knobs
//! - [`ContentUnit`]: one sanitized leaf ready for extraction
//! - [`IngestReport`] / [`UnitReport`]: the ordered result shape

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Content classification
// ============================================================================

/// Supported archive container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Zip,
    Tar,
    /// Gzip-compressed tar stream. Detected by extension only; magic bytes
    /// cannot tell `.tar.gz` from `.gz` without decompressing.
    TarGz,
    /// Standalone gzip member (single inner file).
    Gzip,
}

/// Content classification, from magic bytes or from a claimed extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PlainText,
    Markdown,
    Html,
    Json,
    Xml,
    Rtf,
    Pdf,
    /// DOCX/XLSX/PPTX family (zip container with `[Content_Types].xml`).
    OfficeOpenXml,
    /// ODT/ODS/ODP family.
    OpenDocument,
    Image,
    Archive(ArchiveKind),
    Executable,
    /// Unrecognized binary. Not an error: unknown is not evidence of
    /// anything.
    OctetStream,
}

/// Coarse extractor family used for declared-vs-sniffed comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorFamily {
    Text,
    Document,
    Image,
    Archive,
    Binary,
}

impl ContentKind {
    /// The extractor family this kind routes to.
    #[must_use]
    pub fn family(self) -> ExtractorFamily {
        match self {
            Self::PlainText | Self::Markdown | Self::Html | Self::Json | Self::Xml | Self::Rtf => {
                ExtractorFamily::Text
            }
            Self::Pdf | Self::OfficeOpenXml | Self::OpenDocument => ExtractorFamily::Document,
            Self::Image => ExtractorFamily::Image,
            Self::Archive(_) => ExtractorFamily::Archive,
            Self::Executable | Self::OctetStream => ExtractorFamily::Binary,
        }
    }

    /// MIME-ish label used in reports and logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Rtf => "application/rtf",
            Self::Pdf => "application/pdf",
            Self::OfficeOpenXml => "application/vnd.openxmlformats-officedocument",
            Self::OpenDocument => "application/vnd.oasis.opendocument",
            Self::Image => "image/*",
            Self::Archive(ArchiveKind::Zip) => "application/zip",
            Self::Archive(ArchiveKind::Tar) => "application/x-tar",
            Self::Archive(ArchiveKind::TarGz) => "application/x-gtar",
            Self::Archive(ArchiveKind::Gzip) => "application/gzip",
            Self::Executable => "application/x-executable",
            Self::OctetStream => "application/octet-stream",
        }
    }

    #[must_use]
    pub fn is_archive(self) -> bool {
        matches!(self, Self::Archive(_))
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Request inputs
// ============================================================================

/// Per-URL fetch and render options, supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOptions {
    /// User-Agent header to present upstream.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Drive a headless browser instead of a static GET.
    #[serde(default)]
    pub render_js: bool,
    /// Scroll-to-bottom loop for lazy-loading pages (rendered mode only).
    #[serde(default)]
    pub assist_lazy_load: bool,
    /// Decode base64 `data:` images embedded in the page.
    #[serde(default)]
    pub include_inline_images: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            render_js: false,
            assist_lazy_load: false,
            include_inline_images: false,
        }
    }
}

/// One ingestion input.
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// Direct upload: raw bytes plus the untrusted client filename.
    /// `declared_len` is the transport-level size header, when present.
    Upload {
        name: String,
        bytes: Vec<u8>,
        declared_len: Option<u64>,
    },
    /// Base64-encoded payload plus the untrusted client filename.
    Base64 { name: String, payload: String },
    /// Remote URL with fetch options.
    Url { url: String, options: FetchOptions },
}

impl IngestSource {
    /// The untrusted display name of the input, for logging and reports.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Upload { name, .. } | Self::Base64 { name, .. } => name,
            Self::Url { url, .. } => url,
        }
    }
}

// ============================================================================
// Content units
// ============================================================================

/// One sanitized leaf piece of extractable content.
///
/// Invariant: `sniffed` is always computed from `bytes` before the unit is
/// handed to extraction; `declared` comes from the untrusted name and is
/// only ever used for mismatch reporting.
#[derive(Debug, Clone)]
pub struct ContentUnit {
    /// Safe, collision-free name, unique within one request.
    pub sanitized_path: String,
    /// The untrusted original name (archive entry path, filename, URL).
    pub original_name: String,
    /// Owned content bytes.
    pub bytes: Vec<u8>,
    /// Kind claimed by the name/extension, if any.
    pub declared: Option<ContentKind>,
    /// Kind determined from the bytes.
    pub sniffed: ContentKind,
}

impl ContentUnit {
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// ============================================================================
// Result shapes
// ============================================================================

/// Extraction outcome for one content unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    /// Sanitized path, unique within the request.
    pub path: String,
    /// Untrusted original name.
    pub original_name: String,
    /// Size of the unit in bytes.
    pub size_bytes: u64,
    /// Sniffed type label.
    pub sniffed_type: String,
    /// Extracted text. `None` when extraction failed for this unit.
    pub text: Option<String>,
    /// Per-unit extraction error detail, if any.
    pub error: Option<String>,
}

/// Overall result of one ingestion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Request correlation id.
    pub request_id: Uuid,
    /// Always `"success"` here; guard failures never produce a report.
    pub status: String,
    /// Untrusted display name of the input.
    pub source_name: String,
    /// Per-unit results in production order.
    pub units: Vec<UnitReport>,
    /// Wall-clock processing time.
    pub elapsed_ms: u64,
    /// Completion timestamp.
    pub finished_at: DateTime<Utc>,
}

impl IngestReport {
    /// Total extracted text length across all units.
    #[must_use]
    pub fn total_text_len(&self) -> usize {
        self.units
            .iter()
            .filter_map(|u| u.text.as_ref().map(String::len))
            .sum()
    }
}

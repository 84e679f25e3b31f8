//! Error types for textgate.
//!
//! Two layers, deliberately separate:
//!
//! - [`IngestError`]: safety-guard failures. Any of these aborts the whole
//!   request; partial results are never mixed with one.
//! - [`ExtractError`]: per-unit extraction quality failures. Recorded on
//!   the unit's report entry without aborting sibling units.

use thiserror::Error;

/// Guard-failure taxonomy for one ingestion request.
///
/// Every variant maps to a stable status code via [`IngestError::status`],
/// and to a caller-safe message via `Display`. Internal details (paths,
/// io chains) belong in logs, not in these messages.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Input (declared or actual) exceeds the configured size cap.
    #[error("input of {size} bytes exceeds the maximum of {max} bytes")]
    InputTooLarge { size: u64, max: u64 },

    /// Zero-byte input.
    #[error("input is empty")]
    EmptyInput,

    /// Base64 payload could not be decoded.
    #[error("payload is not valid base64")]
    InvalidBase64,

    /// Declared extension and sniffed content map to different extractor
    /// families.
    #[error("declared type {declared} does not match sniffed content {sniffed}")]
    TypeMismatch { declared: String, sniffed: String },

    /// Cumulative decompressed output exceeded the expansion cap.
    #[error("expansion exceeded the {max} byte budget")]
    ResourceExceeded { max: u64 },

    /// Recursion was attempted past the nesting cap.
    #[error("archive nesting exceeds {max} levels")]
    NestingTooDeep { max: u32 },

    /// A sanitized path would have resolved outside the working root.
    #[error("entry path escapes the working directory")]
    PathTraversalAttempt,

    /// URL resolved to a blocked address or hostname.
    #[error("target address is not allowed")]
    SsrfBlocked,

    /// A deadline fired: the watchdog, the fetch transfer, or the unpack
    /// loop.
    #[error("processing exceeded the {seconds}s time limit")]
    Timeout { seconds: u64 },

    /// The container could not be parsed as the sniffed archive format.
    #[error("archive is corrupted or not a supported container")]
    MalformedArchive,

    /// The upstream server misbehaved: network failure, non-success
    /// status, redirect, or missing length header.
    #[error("upstream fetch failed: {reason}")]
    UpstreamFetchFailed { reason: String },

    /// Normalization catch-all. Never constructed from caller input
    /// directly; anything that does not fit the taxonomy lands here with
    /// internals kept out of the message.
    #[error("internal error")]
    Internal,
}

impl IngestError {
    /// Stable machine-readable status code for the response shape.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::InputTooLarge { .. } => "input_too_large",
            Self::EmptyInput => "empty_input",
            Self::InvalidBase64 => "invalid_base64",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::ResourceExceeded { .. } => "resource_exceeded",
            Self::NestingTooDeep { .. } => "nesting_too_deep",
            Self::PathTraversalAttempt => "path_traversal_attempt",
            Self::SsrfBlocked => "ssrf_blocked",
            Self::Timeout { .. } => "timeout",
            Self::MalformedArchive => "malformed_archive",
            Self::UpstreamFetchFailed { .. } => "upstream_fetch_failed",
            Self::Internal => "internal_error",
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(_: std::io::Error) -> Self {
        // Io failures inside the pipeline carry host paths; normalize.
        Self::Internal
    }
}

/// Per-unit extraction errors.
///
/// These are quality failures, not safety failures: one unit failing to
/// extract does not invalidate its siblings.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no extractor registered for {0}")]
    Unsupported(String),

    #[error("content could not be decoded: {0}")]
    Decode(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Result type alias for pipeline operations. The error parameter
/// defaults to [`IngestError`]; per-unit paths override it with
/// [`ExtractError`].
pub type Result<T, E = IngestError> = std::result::Result<T, E>;

//! Trait seams between the pipeline and its external collaborators.
//!
//! - [`FormatExtractor`]: converts one content unit's bytes into text.
//!   The pipeline knows nothing about per-format internals.
//! - [`PageRenderer`] / [`BrowserSession`]: narrow interface over a
//!   headless-browser engine, so the fetch layer is independent of which
//!   rendering engine (if any) is deployed.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ExtractError;
use crate::types::{ContentKind, ContentUnit};

// ============================================================================
// Format extraction
// ============================================================================

/// Converts one content unit into plain text.
///
/// Implementations must not block indefinitely; the pipeline additionally
/// wraps extraction in its request watchdog.
#[async_trait]
pub trait FormatExtractor: Send + Sync {
    /// The content kinds this extractor handles.
    fn supported_kinds(&self) -> &[ContentKind];

    /// Check whether this extractor can handle the given kind.
    fn can_extract(&self, kind: ContentKind) -> bool {
        self.supported_kinds().contains(&kind)
    }

    /// Extract text from the unit's bytes.
    async fn extract(&self, unit: &ContentUnit) -> Result<String, ExtractError>;
}

// ============================================================================
// Page rendering
// ============================================================================

/// Failures inside the rendering engine.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("renderer is not available")]
    Unavailable,
}

/// One live page inside a headless browser.
///
/// Sessions are opened per render call and must not leak state (cookies,
/// storage) into later sessions.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to the URL and start loading.
    async fn goto(&mut self, url: &str) -> Result<(), RenderError>;

    /// Wait until network activity settles, up to `timeout`.
    async fn wait_network_idle(&mut self, timeout: Duration) -> Result<(), RenderError>;

    /// Current serialized DOM.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Current document height in CSS pixels. Used by the scroll loop to
    /// detect stabilization.
    async fn page_height(&mut self) -> Result<u64, RenderError>;

    /// Scroll to the bottom of the document.
    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError>;
}

/// Factory for browser sessions. Process-wide; acquire one session per
/// render call and drop it when done.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, RenderError>;
}

//! Rendered-page control loop.
//!
//! The headless browser itself lives behind the narrow
//! [`PageRenderer`]/[`BrowserSession`] traits from `textgate-core`; this
//! module owns the *control* logic: idle waiting, the settle delay, and
//! the bounded lazy-load scroll loop.
//!
//! # Invariants
//! - The scroll loop runs at most `max_scroll_attempts` iterations, no
//!   matter what the page height does. This is mandatory: endless-feed
//!   pages never stabilize.
//! - One browser session per render call; the session is dropped before
//!   returning on every path.

use std::time::Duration;

use tracing::{debug, warn};

use textgate_core::{FetchOptions, IngestError, PageRenderer, ResourceBudget, Result};

/// Pause between scroll iterations, long enough for lazy loaders to kick
/// off their requests.
const SCROLL_PAUSE: Duration = Duration::from_millis(250);

/// Load `url` in a fresh browser session and return the settled DOM.
pub async fn render_page(
    renderer: &dyn PageRenderer,
    url: &str,
    options: &FetchOptions,
    budget: &ResourceBudget,
) -> Result<String> {
    let mut session = renderer
        .open()
        .await
        .map_err(|e| IngestError::UpstreamFetchFailed {
            reason: format!("renderer: {e}"),
        })?;

    session
        .goto(url)
        .await
        .map_err(|e| IngestError::UpstreamFetchFailed {
            reason: format!("navigation: {e}"),
        })?;

    // Best effort: a page that never goes network-idle is still worth
    // scraping once the wait expires.
    if let Err(e) = session.wait_network_idle(budget.js_render_timeout).await {
        warn!(url, error = %e, "network-idle wait failed; continuing");
    }

    // Late script execution after the network settles.
    tokio::time::sleep(budget.render_settle_delay).await;

    if options.assist_lazy_load {
        let mut prev_height = session.page_height().await.unwrap_or(0);
        for attempt in 1..=budget.max_scroll_attempts {
            if session.scroll_to_bottom().await.is_err() {
                break;
            }
            tokio::time::sleep(SCROLL_PAUSE).await;
            let height = session.page_height().await.unwrap_or(prev_height);
            debug!(url, attempt, height, prev_height, "scroll iteration");
            if height == prev_height {
                break;
            }
            prev_height = height;
        }
    }

    session
        .content()
        .await
        .map_err(|e| IngestError::UpstreamFetchFailed {
            reason: format!("content: {e}"),
        })
}

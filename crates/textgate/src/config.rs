//! Configuration handling for textgate.
//!
//! Every limit the pipeline enforces comes from here; nothing is
//! hardcoded in pipeline logic. Defaults mirror the production service
//! (20 MiB inputs, 300 s processing window).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use textgate_core::ResourceBudget;
use textgate_fetch::SsrfPolicy;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Remote fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// JS rendering configuration
    #[serde(default)]
    pub render: RenderConfig,
}

/// Resource-limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum input size (bytes)
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,

    /// Maximum compressed archive size (bytes)
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    /// Maximum cumulative decompressed output (bytes)
    #[serde(default = "default_max_expanded_bytes")]
    pub max_expanded_bytes: u64,

    /// Maximum archive nesting depth
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: u32,

    /// Maximum entries visited per archive
    #[serde(default = "default_max_entries_per_archive")]
    pub max_entries_per_archive: u32,

    /// Whole-request watchdog (seconds)
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
}

fn default_max_input_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_max_archive_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_max_expanded_bytes() -> u64 {
    200 * 1024 * 1024
}

fn default_max_nesting_depth() -> u32 {
    3
}

fn default_max_entries_per_archive() -> u32 {
    1_000
}

fn default_processing_timeout_secs() -> u64 {
    300
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            max_archive_bytes: default_max_archive_bytes(),
            max_expanded_bytes: default_max_expanded_bytes(),
            max_nesting_depth: default_max_nesting_depth(),
            max_entries_per_archive: default_max_entries_per_archive(),
            processing_timeout_secs: default_processing_timeout_secs(),
        }
    }
}

/// Remote-fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Transfer timeout (seconds), independent of connect/DNS
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Blocked CIDR ranges, checked after DNS resolution
    #[serde(default = "default_blocked_networks")]
    pub blocked_networks: Vec<String>,

    /// Blocked hostnames (exact, case-insensitive)
    #[serde(default)]
    pub blocked_hosts: Vec<String>,

    /// Maximum embedded images harvested per page
    #[serde(default = "default_max_images_per_page")]
    pub max_images_per_page: u32,
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_blocked_networks() -> Vec<String> {
    SsrfPolicy::default_ranges()
}

fn default_max_images_per_page() -> u32 {
    16
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            blocked_networks: default_blocked_networks(),
            blocked_hosts: Vec::new(),
            max_images_per_page: default_max_images_per_page(),
        }
    }
}

/// Rendered-fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Network-idle wait (milliseconds)
    #[serde(default = "default_js_render_timeout_ms")]
    pub js_render_timeout_ms: u64,

    /// Post-idle settle delay (milliseconds)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Hard bound on the lazy-load scroll loop
    #[serde(default = "default_max_scroll_attempts")]
    pub max_scroll_attempts: u32,
}

fn default_js_render_timeout_ms() -> u64 {
    20_000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_max_scroll_attempts() -> u32 {
    8
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            js_render_timeout_ms: default_js_render_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            max_scroll_attempts: default_max_scroll_attempts(),
        }
    }
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// The per-request budget template derived from this config.
    #[must_use]
    pub fn budget(&self) -> ResourceBudget {
        ResourceBudget {
            max_input_bytes: self.limits.max_input_bytes,
            max_archive_bytes: self.limits.max_archive_bytes,
            max_expanded_bytes: self.limits.max_expanded_bytes,
            max_nesting_depth: self.limits.max_nesting_depth,
            max_entries_per_archive: self.limits.max_entries_per_archive,
            processing_timeout: Duration::from_secs(self.limits.processing_timeout_secs),
            fetch_timeout: Duration::from_secs(self.fetch.fetch_timeout_secs),
            js_render_timeout: Duration::from_millis(self.render.js_render_timeout_ms),
            render_settle_delay: Duration::from_millis(self.render.settle_delay_ms),
            max_images_per_page: self.fetch.max_images_per_page,
            max_scroll_attempts: self.render.max_scroll_attempts,
        }
    }

    /// The process-wide SSRF policy derived from this config.
    pub fn ssrf_policy(&self) -> anyhow::Result<SsrfPolicy> {
        Ok(SsrfPolicy::new(
            &self.fetch.blocked_networks,
            &self.fetch.blocked_hosts,
        )?)
    }
}

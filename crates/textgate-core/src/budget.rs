//! Resource budgets and per-request expansion accounting.
//!
//! # Invariants
//! - [`ResourceBudget`] is immutable for the lifetime of one request.
//! - [`ExpansionState`] is owned by exactly one request; it is never
//!   shared across requests.
//! - Byte accounting is saturating and checked incrementally: a charge
//!   that crosses the cap fails on that charge, never "at the end".
//! - Depth is capped *before* recursing, not after.

use std::time::{Duration, Instant};

use crate::error::IngestError;

/// Immutable set of limits applied to one ingestion request.
///
/// Created from process-wide configuration at request start. Defaults
/// mirror the service's production settings (20 MiB inputs, 300 s
/// processing window).
#[derive(Debug, Clone)]
pub struct ResourceBudget {
    /// Maximum size of the top-level input (upload, decoded base64, or
    /// remote body).
    pub max_input_bytes: u64,
    /// Maximum compressed size of an archive before any entry is read.
    pub max_archive_bytes: u64,
    /// Maximum cumulative decompressed output for the whole request.
    pub max_expanded_bytes: u64,
    /// Maximum archive-within-archive depth.
    pub max_nesting_depth: u32,
    /// Maximum number of entries visited per archive.
    pub max_entries_per_archive: u32,
    /// Wall-clock watchdog for the whole request.
    pub processing_timeout: Duration,
    /// Transfer timeout for one remote fetch, independent of connect/DNS.
    pub fetch_timeout: Duration,
    /// Network-idle wait for rendered pages.
    pub js_render_timeout: Duration,
    /// Fixed post-idle delay for late script execution.
    pub render_settle_delay: Duration,
    /// Maximum embedded images harvested per page.
    pub max_images_per_page: u32,
    /// Hard bound on the lazy-load scroll loop.
    pub max_scroll_attempts: u32,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            max_input_bytes: 20 * 1024 * 1024,
            max_archive_bytes: 20 * 1024 * 1024,
            max_expanded_bytes: 200 * 1024 * 1024,
            max_nesting_depth: 3,
            max_entries_per_archive: 1_000,
            processing_timeout: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(60),
            js_render_timeout: Duration::from_secs(20),
            render_settle_delay: Duration::from_millis(500),
            max_images_per_page: 16,
            max_scroll_attempts: 8,
        }
    }
}

/// Mutable expansion accounting, scoped to one top-level ingestion call.
///
/// Exactly one of these exists per request; the pipeline creates it and
/// threads it through all recursive unpacking and fetching.
#[derive(Debug)]
pub struct ExpansionState {
    bytes_expanded: u64,
    depth: u32,
    units_produced: u32,
    deadline: Instant,
}

impl ExpansionState {
    /// Start accounting for a new request under `budget`.
    #[must_use]
    pub fn new(budget: &ResourceBudget) -> Self {
        Self {
            bytes_expanded: 0,
            depth: 0,
            units_produced: 0,
            deadline: Instant::now() + budget.processing_timeout,
        }
    }

    #[must_use]
    pub fn bytes_expanded(&self) -> u64 {
        self.bytes_expanded
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn units_produced(&self) -> u32 {
        self.units_produced
    }

    /// Charge decompressed output bytes against the expansion cap.
    ///
    /// Must be called for every decompressed chunk, not per entry: the
    /// zip-bomb guard has to fire mid-stream.
    pub fn charge(&mut self, bytes: u64, budget: &ResourceBudget) -> Result<(), IngestError> {
        self.bytes_expanded = self.bytes_expanded.saturating_add(bytes);
        if self.bytes_expanded > budget.max_expanded_bytes {
            return Err(IngestError::ResourceExceeded {
                max: budget.max_expanded_bytes,
            });
        }
        Ok(())
    }

    /// Whether one more nesting level may be entered.
    #[must_use]
    pub fn can_recurse(&self, budget: &ResourceBudget) -> bool {
        self.depth < budget.max_nesting_depth
    }

    /// Enter a nested archive scope. Fails if the cap would be exceeded;
    /// callers should check [`Self::can_recurse`] first and treat the
    /// nested archive as an opaque leaf instead of calling this.
    pub fn enter_archive(&mut self, budget: &ResourceBudget) -> Result<(), IngestError> {
        if self.depth >= budget.max_nesting_depth {
            return Err(IngestError::NestingTooDeep {
                max: budget.max_nesting_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave the current archive scope.
    pub fn exit_archive(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Record one produced content unit.
    pub fn note_unit(&mut self) {
        self.units_produced = self.units_produced.saturating_add(1);
    }

    /// Fail if the request deadline has passed.
    ///
    /// Cheap; call between entries and between decompressed chunks so a
    /// stuck decoder cannot outlive the watchdog by much.
    pub fn check_deadline(&self, budget: &ResourceBudget) -> Result<(), IngestError> {
        if Instant::now() >= self.deadline {
            return Err(IngestError::Timeout {
                seconds: budget.processing_timeout.as_secs(),
            });
        }
        Ok(())
    }
}

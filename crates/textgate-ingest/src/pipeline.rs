//! The ingestion orchestrator.
//!
//! # Guarantees
//! - Preconditions (emptiness, size, type forgery) are checked before any
//!   expansion work starts.
//! - Exactly one [`ExpansionState`] exists per top-level call and is
//!   threaded through all recursive work.
//! - A watchdog deadline wraps the whole request, independent of every
//!   inner timeout.
//! - Guard failures are all-or-nothing: the caller gets a single terminal
//!   error and no partial report. Per-unit extraction failures are the
//!   one sanctioned partial outcome.
//! - The request's working directory is private and reclaimed on every
//!   exit path, including watchdog cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use textgate_core::{
    ContentUnit, ExpansionState, FetchOptions, IngestError, IngestReport, IngestSource,
    ResourceBudget, Result, UnitReport,
};
use textgate_extract::ExtractorRegistry;
use textgate_fetch::{FetchedResource, RemoteFetcher, ResourceOrigin};

use crate::sanitize::{contained_path, PathSanitizer};
use crate::sniff::{declared_kind, sniff, verify_consistency};
use crate::unpack::{effective_archive_kind, ArchiveUnpacker};

/// Pipeline construction parameters.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Budget template; cloned into every request.
    pub budget: ResourceBudget,
}

/// The ingestion pipeline: one instance serves many concurrent requests,
/// each with its own expansion state and working directory.
pub struct IngestionPipeline {
    extractors: Arc<ExtractorRegistry>,
    fetcher: Arc<RemoteFetcher>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        extractors: Arc<ExtractorRegistry>,
        fetcher: Arc<RemoteFetcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractors,
            fetcher,
            config,
        }
    }

    /// Ingest one source into an ordered report.
    ///
    /// All-or-nothing: any guard failure aborts the request with a single
    /// terminal error.
    pub async fn ingest(&self, source: IngestSource) -> Result<IngestReport> {
        let request_id = Uuid::new_v4();
        let source_name = source.display_name().to_string();
        let budget = self.config.budget.clone();
        let started = Instant::now();

        info!(%request_id, source = %source_name, "ingestion started");

        // The watchdog is independent of every inner timeout: even a
        // component with a stuck internal wait gets cancelled here. The
        // workdir lives inside `run`, so cancellation drops it and
        // reclaims temporary storage.
        let outcome = tokio::time::timeout(
            budget.processing_timeout,
            self.run(source, &budget, request_id),
        )
        .await
        .unwrap_or(Err(IngestError::Timeout {
            seconds: budget.processing_timeout.as_secs(),
        }));

        match outcome {
            Ok(units) => {
                let report = IngestReport {
                    request_id,
                    status: "success".to_string(),
                    source_name,
                    units,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    finished_at: chrono::Utc::now(),
                };
                info!(
                    %request_id,
                    units = report.units.len(),
                    text_len = report.total_text_len(),
                    elapsed_ms = report.elapsed_ms,
                    "ingestion finished"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(
                    %request_id,
                    guard = err.status(),
                    source = %source_name,
                    "ingestion aborted"
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        source: IngestSource,
        budget: &ResourceBudget,
        request_id: Uuid,
    ) -> Result<Vec<UnitReport>> {
        let workdir = TempDir::new().map_err(|_| IngestError::Internal)?;
        let mut state = ExpansionState::new(budget);
        let mut sanitizer = PathSanitizer::new();

        let units = match source {
            IngestSource::Upload {
                name,
                bytes,
                declared_len,
            } => {
                if let Some(len) = declared_len {
                    check_input_size(len, budget)?;
                }
                self.expand_payload(
                    name, bytes, budget, &mut state, &mut sanitizer, workdir.path(), true,
                )
                .await?
            }
            IngestSource::Base64 { name, payload } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload.trim())
                    .map_err(|_| IngestError::InvalidBase64)?;
                self.expand_payload(
                    name, bytes, budget, &mut state, &mut sanitizer, workdir.path(), true,
                )
                .await?
            }
            IngestSource::Url { url, options } => {
                self.expand_url(
                    &url,
                    &options,
                    budget,
                    &mut state,
                    &mut sanitizer,
                    workdir.path(),
                )
                .await?
            }
        };

        debug!(
            %request_id,
            units = units.len(),
            expanded = state.bytes_expanded(),
            "expansion complete"
        );

        self.extract_units(units, budget, &state).await
    }

    /// Expand one in-memory payload: archive strategies recurse, anything
    /// else passes through as a single unit.
    #[allow(clippy::too_many_arguments)]
    async fn expand_payload(
        &self,
        name: String,
        bytes: Vec<u8>,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
        strict_type_check: bool,
    ) -> Result<Vec<ContentUnit>> {
        if bytes.is_empty() {
            return Err(IngestError::EmptyInput);
        }
        check_input_size(bytes.len() as u64, budget)?;

        let sniffed = sniff(&bytes);
        let declared = declared_kind(&name);
        if strict_type_check {
            verify_consistency(declared, sniffed)?;
        }

        if let Some(kind) = effective_archive_kind(&name, sniffed) {
            // Decompression is CPU/IO-bound; keep it off the async
            // threads. State and sanitizer travel into the closure and
            // back out.
            let bytes_owned = bytes;
            let name_owned = name;
            let budget_owned = budget.clone();
            let workdir_owned = workdir.to_path_buf();
            let mut state_owned = std::mem::replace(state, ExpansionState::new(budget));
            let mut sanitizer_owned = std::mem::take(sanitizer);

            let (result, state_back, sanitizer_back) =
                tokio::task::spawn_blocking(move || {
                    let result = ArchiveUnpacker::unpack(
                        &bytes_owned,
                        kind,
                        &name_owned,
                        &budget_owned,
                        &mut state_owned,
                        &mut sanitizer_owned,
                        &workdir_owned,
                    );
                    (result, state_owned, sanitizer_owned)
                })
                .await
                .map_err(|_| IngestError::Internal)?;

            *state = state_back;
            *sanitizer = sanitizer_back;
            return result;
        }

        let unit = materialize_unit(name, bytes, sanitizer, workdir, state).await?;
        Ok(vec![unit])
    }

    /// Fetch a URL and expand what comes back: HTML decomposes into page
    /// plus images; a non-HTML body goes through the normal payload
    /// strategies (so a fetched archive is still unpacked under budget).
    async fn expand_url(
        &self,
        url: &str,
        options: &FetchOptions,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
    ) -> Result<Vec<ContentUnit>> {
        let resources = self.fetcher.fetch(url, options, budget, state).await?;

        let mut units = Vec::new();
        for resource in resources {
            let FetchedResource {
                name,
                bytes,
                origin,
            } = resource;
            if bytes.is_empty() {
                debug!(resource = %name, "skipping empty fetched resource");
                continue;
            }
            match origin {
                ResourceOrigin::Page => {
                    // Fetched names are derived, not caller claims: a
                    // mismatch is the upstream's misbehavior and is
                    // logged by the sniffing path, not fatal.
                    units.extend(
                        self.expand_payload(
                            name, bytes, budget, state, sanitizer, workdir, false,
                        )
                        .await?,
                    );
                }
                ResourceOrigin::InlineImage | ResourceOrigin::RemoteImage => {
                    check_input_size(bytes.len() as u64, budget)?;
                    let unit = materialize_unit(name, bytes, sanitizer, workdir, state).await?;
                    units.push(unit);
                }
            }
        }
        Ok(units)
    }

    /// Extract every unit in production order. Extraction failures are
    /// per-unit outcomes, never request failures.
    async fn extract_units(
        &self,
        units: Vec<ContentUnit>,
        budget: &ResourceBudget,
        state: &ExpansionState,
    ) -> Result<Vec<UnitReport>> {
        let mut reports = Vec::with_capacity(units.len());
        for unit in &units {
            state.check_deadline(budget)?;
            let (text, error) = match self.extractors.extract(unit).await {
                Ok(text) => (Some(text), None),
                Err(e) => {
                    warn!(
                        unit = %unit.sanitized_path,
                        kind = %unit.sniffed,
                        error = %e,
                        "unit extraction failed"
                    );
                    (None, Some(e.to_string()))
                }
            };
            reports.push(UnitReport {
                path: unit.sanitized_path.clone(),
                original_name: unit.original_name.clone(),
                size_bytes: unit.size_bytes(),
                sniffed_type: unit.sniffed.label().to_string(),
                text,
                error,
            });
        }
        Ok(reports)
    }
}

fn check_input_size(size: u64, budget: &ResourceBudget) -> Result<()> {
    if size > budget.max_input_bytes {
        return Err(IngestError::InputTooLarge {
            size,
            max: budget.max_input_bytes,
        });
    }
    Ok(())
}

/// Sanitize, sniff, and write one leaf unit into the working directory.
async fn materialize_unit(
    name: String,
    bytes: Vec<u8>,
    sanitizer: &mut PathSanitizer,
    workdir: &Path,
    state: &mut ExpansionState,
) -> Result<ContentUnit> {
    let sanitized = sanitizer.sanitize(&name);
    if sanitized.had_traversal {
        warn!(original = %name, contained_as = %sanitized.name, "traversal attempt in input name");
    }
    let dest: PathBuf = contained_path(workdir, &sanitized.name)?;
    tokio::fs::write(&dest, &bytes)
        .await
        .map_err(IngestError::from)?;

    state.note_unit();
    let sniffed = sniff(&bytes);
    Ok(ContentUnit {
        sanitized_path: sanitized.name,
        original_name: name.clone(),
        bytes,
        declared: declared_kind(&name),
        sniffed,
    })
}

//! SSRF-guarded remote fetching.
//!
//! # State machine (one fetch)
//! Resolving → {Blocked | Allowed} → Fetching → {TimedOut | SizeExceeded
//! | Fetched} → [Rendering → ScrollLoop → Stable] → Done
//!
//! # Invariants
//! - Address checks run after DNS resolution; the HTTP client is pinned
//!   to the vetted address so the connection cannot re-resolve
//!   (DNS-rebinding defense).
//! - Redirects are never followed: a redirect would escape the pinned
//!   resolution.
//! - A size header is required before any body byte is read; the body
//!   stream is additionally bounded by declared-vs-actual comparison and
//!   its own transfer deadline.
//! - Sub-resource fetches (page images) pass through the same policy
//!   and size gates as the top-level fetch; a blocked sub-resource
//!   aborts the request, a merely-failing one is skipped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use reqwest::redirect;
use reqwest::Url;
use scraper::{Html, Selector};
use tokio::net::lookup_host;
use tracing::{debug, info, warn};

use textgate_core::{
    ExpansionState, FetchOptions, IngestError, PageRenderer, ResourceBudget, Result,
};

use crate::guard::SsrfPolicy;
use crate::render::render_page;

/// Default User-Agent when the caller supplies none.
const DEFAULT_USER_AGENT: &str = "textgate/0.3";

/// Connect timeout, separate from the transfer deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One resolved-and-vetted fetch destination. Created per attempt,
/// discarded after.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub host: String,
    pub resolved: SocketAddr,
    pub is_allowed: bool,
}

/// One fetched payload, before sanitization and sniffing (the pipeline
/// owns both).
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Untrusted name derived from the URL or data URI.
    pub name: String,
    pub bytes: Vec<u8>,
    pub origin: ResourceOrigin,
}

/// Where a fetched resource came from, for ordering and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOrigin {
    /// The primary page or file body.
    Page,
    /// A base64 `data:` image inlined in the page.
    InlineImage,
    /// An `<img>` fetched over the network.
    RemoteImage,
}

/// SSRF-guarded URL fetcher with optional JS rendering.
pub struct RemoteFetcher {
    policy: Arc<SsrfPolicy>,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl RemoteFetcher {
    #[must_use]
    pub fn new(policy: Arc<SsrfPolicy>) -> Self {
        Self {
            policy,
            renderer: None,
        }
    }

    /// Attach a rendering engine for `render_js` requests.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Fetch a URL into an ordered resource sequence: page body first,
    /// then up to `max_images_per_page` images in document order.
    pub async fn fetch(
        &self,
        url_str: &str,
        options: &FetchOptions,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
    ) -> Result<Vec<FetchedResource>> {
        let url = parse_url(url_str)?;
        let target = self.resolve_target(&url).await?;
        info!(url = url_str, ip = %target.resolved.ip(), "fetch target allowed");

        let body = if options.render_js {
            let renderer =
                self.renderer
                    .as_deref()
                    .ok_or_else(|| IngestError::UpstreamFetchFailed {
                        reason: "JS rendering requested but no renderer is configured".to_string(),
                    })?;
            render_page(renderer, url.as_str(), options, budget)
                .await?
                .into_bytes()
        } else {
            self.download(&url, &target, options, budget).await?
        };

        let mut resources = vec![FetchedResource {
            name: page_name(&url),
            bytes: body,
            origin: ResourceOrigin::Page,
        }];

        if looks_like_html(&resources[0].bytes) {
            let html = String::from_utf8_lossy(&resources[0].bytes).into_owned();
            let images = self
                .collect_images(&html, &url, options, budget, state)
                .await?;
            resources.extend(images);
        }

        Ok(resources)
    }

    /// Resolve the URL host and check every address against the policy.
    async fn resolve_target(&self, url: &Url) -> Result<FetchTarget> {
        let host = url
            .host_str()
            .ok_or_else(|| IngestError::UpstreamFetchFailed {
                reason: "url has no host".to_string(),
            })?
            .to_string();

        if self.policy.blocks_host(&host) {
            warn!(host, "fetch blocked: hostname on blocklist");
            return Err(IngestError::SsrfBlocked);
        }

        let port = url.port_or_known_default().unwrap_or(443);
        let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), port))
            .await
            .map_err(|_| IngestError::UpstreamFetchFailed {
                reason: format!("could not resolve {host}"),
            })?
            .collect();

        check_addrs(&self.policy, &host, &addrs)
    }

    /// Static GET against a vetted target, streaming the body under the
    /// size and time bounds.
    async fn download(
        &self,
        url: &Url,
        target: &FetchTarget,
        options: &FetchOptions,
        budget: &ResourceBudget,
    ) -> Result<Vec<u8>> {
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(budget.fetch_timeout)
            .resolve(&target.host, target.resolved)
            .user_agent(
                options
                    .user_agent
                    .as_deref()
                    .unwrap_or(DEFAULT_USER_AGENT),
            )
            .build()
            .map_err(|_| IngestError::Internal)?;

        let resp = client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout {
                    seconds: budget.fetch_timeout.as_secs(),
                }
            } else {
                IngestError::UpstreamFetchFailed {
                    reason: "request failed".to_string(),
                }
            }
        })?;

        let status = resp.status();
        if status.is_redirection() {
            warn!(url = %url, status = %status, "redirect refused");
            return Err(IngestError::UpstreamFetchFailed {
                reason: format!("upstream redirected ({status})"),
            });
        }
        if !status.is_success() {
            return Err(IngestError::UpstreamFetchFailed {
                reason: format!("upstream returned {status}"),
            });
        }

        let declared = resp
            .content_length()
            .ok_or_else(|| IngestError::UpstreamFetchFailed {
                reason: "upstream sent no Content-Length".to_string(),
            })?;
        if declared > budget.max_input_bytes {
            warn!(declared, max = budget.max_input_bytes, "fetch over size cap");
            return Err(IngestError::InputTooLarge {
                size: declared,
                max: budget.max_input_bytes,
            });
        }

        // The transfer gets its own deadline, independent of connect/DNS.
        let body = tokio::time::timeout(budget.fetch_timeout, async {
            let mut resp = resp;
            let mut buf: Vec<u8> = Vec::with_capacity(declared as usize);
            while let Some(chunk) = resp.chunk().await.map_err(|_| {
                IngestError::UpstreamFetchFailed {
                    reason: "body read failed".to_string(),
                }
            })? {
                buf.extend_from_slice(&chunk);
                if buf.len() as u64 > declared {
                    return Err(IngestError::UpstreamFetchFailed {
                        reason: "body exceeds declared Content-Length".to_string(),
                    });
                }
            }
            Ok(buf)
        })
        .await
        .map_err(|_| IngestError::Timeout {
            seconds: budget.fetch_timeout.as_secs(),
        })??;

        debug!(url = %url, bytes = body.len(), "fetched");
        Ok(body)
    }

    /// Harvest up to `max_images_per_page` images in document order.
    async fn collect_images(
        &self,
        html: &str,
        base: &Url,
        options: &FetchOptions,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
    ) -> Result<Vec<FetchedResource>> {
        let srcs = image_sources(html);
        let mut out = Vec::new();

        for (idx, src) in srcs.into_iter().enumerate() {
            if out.len() as u32 >= budget.max_images_per_page {
                debug!(max = budget.max_images_per_page, "image cap reached");
                break;
            }
            state.check_deadline(budget)?;

            if let Some(rest) = src.strip_prefix("data:") {
                if !options.include_inline_images {
                    continue;
                }
                if let Some(resource) = decode_inline_image(rest, idx) {
                    state.charge(resource.bytes.len() as u64, budget)?;
                    out.push(resource);
                }
                continue;
            }

            let Some(img_url) = base.join(&src).ok().filter(is_fetchable) else {
                continue;
            };
            match self.fetch_image(&img_url, options, budget).await {
                Ok(bytes) => {
                    state.charge(bytes.len() as u64, budget)?;
                    out.push(FetchedResource {
                        name: resource_name(&img_url),
                        bytes,
                        origin: ResourceOrigin::RemoteImage,
                    });
                }
                // Policy and size violations are guard failures and abort
                // the request; a merely unreachable image is not.
                Err(e @ (IngestError::SsrfBlocked | IngestError::InputTooLarge { .. })) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(src = %img_url, error = %e, "skipping embedded image");
                }
            }
        }
        Ok(out)
    }

    async fn fetch_image(
        &self,
        url: &Url,
        options: &FetchOptions,
        budget: &ResourceBudget,
    ) -> Result<Vec<u8>> {
        let target = self.resolve_target(url).await?;
        self.download(url, &target, options, budget).await
    }
}

/// Policy check over every resolved address. Split out so rebinding
/// scenarios are testable without DNS.
pub fn check_addrs(
    policy: &SsrfPolicy,
    host: &str,
    addrs: &[SocketAddr],
) -> Result<FetchTarget> {
    let Some(first) = addrs.first() else {
        return Err(IngestError::UpstreamFetchFailed {
            reason: format!("{host} resolved to no addresses"),
        });
    };
    for addr in addrs {
        if policy.blocks_ip(addr.ip()) {
            warn!(host, ip = %addr.ip(), "fetch blocked: resolved address in blocked range");
            return Err(IngestError::SsrfBlocked);
        }
    }
    Ok(FetchTarget {
        host: host.to_string(),
        resolved: *first,
        is_allowed: true,
    })
}

fn parse_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|_| IngestError::UpstreamFetchFailed {
        reason: "invalid url".to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => {
            // file://, gopher:// and friends are SSRF vectors, not
            // fetchable content.
            warn!(scheme = other, "fetch blocked: unsupported scheme");
            Err(IngestError::SsrfBlocked)
        }
    }
}

fn is_fetchable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Cheap HTML check for deciding whether to decompose the body into
/// page-plus-images. Routing for extraction happens later, on the
/// sniffed kind.
fn looks_like_html(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    let lower = head.trim_start().to_ascii_lowercase();
    lower.starts_with("<!doctype html") || lower.starts_with("<html")
}

/// `<img src>` values in document order.
fn image_sources(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("img") else {
        return Vec::new();
    };
    doc.select(&selector)
        .filter_map(|el| el.value().attr("src"))
        .map(str::to_string)
        .collect()
}

/// Decode a `data:image/...;base64,...` URI into a resource.
fn decode_inline_image(rest: &str, idx: usize) -> Option<FetchedResource> {
    let (meta, data) = rest.split_once(',')?;
    if !meta.contains("base64") {
        return None;
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .ok()?;
    let subtype = meta
        .split('/')
        .nth(1)
        .and_then(|s| s.split(';').next())
        .filter(|s| !s.is_empty() && s.chars().all(char::is_alphanumeric))
        .unwrap_or("bin");
    Some(FetchedResource {
        name: format!("inline_{}.{}", idx + 1, subtype),
        bytes,
        origin: ResourceOrigin::InlineImage,
    })
}

/// Untrusted display name for the page body.
fn page_name(url: &Url) -> String {
    let host = url.host_str().unwrap_or("page");
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty());
    match last {
        Some(seg) if seg.contains('.') => format!("{host}_{seg}"),
        Some(seg) => format!("{host}_{seg}.html"),
        None => format!("{host}.html"),
    }
}

/// Untrusted display name for a sub-resource.
fn resource_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_resource", url.host_str().unwrap_or("remote")))
}

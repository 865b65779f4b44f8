//! Site collection with graceful degradation.
//!
//! A site's markup is fetched via one of two strategies — a headless render
//! service or a plain HTTP GET — under a timeout. Failure handling is part
//! of the contract: hosts on the known-bad list and transient failures
//! (timeouts, lost renderer contexts) degrade to a deterministic synthetic
//! substitute; only hard failures propagate to the caller, which records a
//! failed sample and moves on.
//!
//! The transient/hard split is a tagged decision made inside the strategy,
//! never by matching error message text upstream.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::CollectorConfig;
use crate::models::{CandidateSite, CollectionMethod};
use crate::synthetic;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("navigation timed out after {0:?}")]
    Timeout(Duration),
    #[error("renderer context lost: {0}")]
    RendererLost(String),
    #[error("host '{0}' is on the known-bad list")]
    BlockedHost(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
}

impl CollectError {
    /// Transient failures degrade to synthetic generation; everything else
    /// is a hard per-site failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollectError::Timeout(_) | CollectError::RendererLost(_) | CollectError::BlockedHost(_)
        )
    }
}

/// A successfully obtained page (live or synthetic).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    pub html: String,
    pub css: String,
    pub method: CollectionMethod,
    pub load_time_ms: u64,
}

/// A page returned by a collection strategy before method tagging.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub css: String,
}

/// The headless render collaborator. May fail with navigation timeouts or
/// context-destroyed errors; the implementation tags those as transient.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, CollectError>;
}

/// Client for an HTTP render service (`POST { url }` → rendered page).
pub struct HttpRenderEngine {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct RenderResponse {
    #[serde(default)]
    html: String,
    #[serde(default)]
    computed_styles: String,
    #[serde(default)]
    error: Option<RenderError>,
}

#[derive(Deserialize)]
struct RenderError {
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpRenderEngine {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, CollectError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectError::Fetch(format!("failed to build render client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl RenderEngine for HttpRenderEngine {
    async fn render(&self, url: &str) -> Result<RenderedPage, CollectError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollectError::RendererLost("render service did not respond".to_string())
                } else {
                    CollectError::Fetch(format!("render service request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectError::Fetch(format!(
                "render service returned {}",
                status
            )));
        }

        let body: RenderResponse = response
            .json()
            .await
            .map_err(|e| CollectError::Fetch(format!("bad render service payload: {}", e)))?;

        // Structured renderer errors carry a code; the known transient ones
        // map to tagged variants here, inside the strategy.
        if let Some(err) = body.error {
            return Err(match err.code.as_str() {
                "navigation_timeout" => CollectError::Timeout(Duration::ZERO),
                "context_destroyed" | "frame_detached" => CollectError::RendererLost(err.message),
                _ => CollectError::Fetch(format!("renderer error {}: {}", err.code, err.message)),
            });
        }

        Ok(RenderedPage {
            html: body.html,
            css: body.computed_styles,
        })
    }
}

/// Plain HTTP GET strategy: the response body is the markup, and inline
/// `<style>` blocks stand in for computed styles.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CollectError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("siteminer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CollectError::Fetch(format!("failed to build fetch client: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<RenderedPage, CollectError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CollectError::Timeout(Duration::ZERO)
            } else {
                CollectError::Fetch(format!("GET {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectError::Fetch(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CollectError::Fetch(format!("failed to read body from {}: {}", url, e)))?;
        let css = extract_inline_css(&html);

        Ok(RenderedPage { html, css })
    }
}

/// Concatenate the contents of all `<style>` blocks in a document.
pub fn extract_inline_css(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    let selector = match scraper::Selector::parse("style") {
        Ok(selector) => selector,
        Err(_) => return String::new(),
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<String>>()
        .join("\n")
}

/// Which strategy a collector uses for live collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Browser,
    Http,
}

pub struct Collector {
    strategy: Strategy,
    render: std::sync::Arc<dyn RenderEngine>,
    fetcher: HttpFetcher,
    timeout: Duration,
    known_bad_hosts: Vec<String>,
}

impl Collector {
    pub fn new(
        strategy: Strategy,
        render: std::sync::Arc<dyn RenderEngine>,
        timeout: Duration,
        known_bad_hosts: Vec<String>,
    ) -> Result<Self, CollectError> {
        Ok(Self {
            strategy,
            render,
            fetcher: HttpFetcher::new(timeout)?,
            timeout,
            known_bad_hosts,
        })
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self, CollectError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let strategy = match config.strategy.as_str() {
            "browser" => Strategy::Browser,
            _ => Strategy::Http,
        };
        let render = std::sync::Arc::new(HttpRenderEngine::new(&config.render_endpoint, timeout)?);
        Self::new(strategy, render, timeout, config.known_bad_hosts.clone())
    }

    fn blocked_host(&self, url: &str) -> Option<String> {
        let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
        self.known_bad_hosts
            .iter()
            .any(|bad| {
                let bad = bad.to_lowercase();
                host == bad || host.ends_with(&format!(".{}", bad))
            })
            .then_some(host)
    }

    /// Collect a site's markup, degrading to a synthetic substitute on
    /// known-bad hosts and transient failures. Hard failures propagate.
    pub async fn collect(&self, site: &CandidateSite) -> Result<Collected, CollectError> {
        if let Some(host) = self.blocked_host(&site.url) {
            info!("host {} is known-bad, using synthetic substitute", host);
            return Ok(synthetic::synthetic_page(&site.url, &site.business_type));
        }
        if Url::parse(&site.url).is_err() {
            return Err(CollectError::InvalidUrl(site.url.clone()));
        }

        let started = Instant::now();
        let attempt = match self.strategy {
            Strategy::Browser => {
                tokio::time::timeout(self.timeout, self.render.render(&site.url)).await
            }
            Strategy::Http => {
                tokio::time::timeout(self.timeout, self.fetcher.fetch(&site.url)).await
            }
        };

        let outcome = match attempt {
            Ok(result) => result,
            Err(_elapsed) => Err(CollectError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(page) => Ok(Collected {
                html: page.html,
                css: page.css,
                method: match self.strategy {
                    Strategy::Browser => CollectionMethod::Browser,
                    Strategy::Http => CollectionMethod::Http,
                },
                load_time_ms: started.elapsed().as_millis() as u64,
            }),
            Err(e) if e.is_transient() => {
                warn!("collection of {} degraded to synthetic: {}", site.url, e);
                Ok(synthetic::synthetic_page(&site.url, &site.business_type))
            }
            Err(e) => Err(e),
        }
    }
}

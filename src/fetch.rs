//! Page loading.
//!
//! A [`BrowserLauncher`] opens one [`PageFetcher`] session per fetcher kind at the
//! start of a run; the run closes every session it opened before returning.
//! Each `fetch` loads one URL in its own tab and closes that tab on every path.

pub mod chromium;
pub mod http;

pub use chromium::{ChromiumFetcher, ChromiumOptions};
pub use http::HttpFetcher;

use crate::error::Result;
use crate::registry::{FetcherKind, SourceConfig};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    /// Element that marks the page as rendered; `None` waits for page load only.
    pub ready_selector: Option<&'a str>,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
}

impl<'a> FetchRequest<'a> {
    pub fn for_source(source: &'a SourceConfig) -> Self {
        Self {
            url: &source.url,
            ready_selector: source.ready_selector.as_deref(),
            navigation_timeout: Duration::from_millis(source.navigation_timeout_ms),
            selector_timeout: Duration::from_millis(source.selector_timeout_ms),
        }
    }
}

/// Snapshot of a loaded page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects, used to resolve relative links
    pub url: String,
    pub html: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fails with `FetchTimeout` or `Navigation`; the caller decides whether to skip.
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<RenderedPage>;

    /// Release the session and anything it spawned
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, kind: FetcherKind) -> Result<Box<dyn PageFetcher>>;
}

/// Launches headless Chromium or a plain HTTP client depending on the source
#[derive(Debug, Clone, Default)]
pub struct DefaultLauncher {
    pub chromium: ChromiumOptions,
}

impl DefaultLauncher {
    pub fn new(chromium: ChromiumOptions) -> Self {
        Self { chromium }
    }
}

#[async_trait]
impl BrowserLauncher for DefaultLauncher {
    async fn launch(&self, kind: FetcherKind) -> Result<Box<dyn PageFetcher>> {
        match kind {
            FetcherKind::Chromium => Ok(Box::new(ChromiumFetcher::launch(&self.chromium).await?)),
            FetcherKind::Http => Ok(Box::new(HttpFetcher::new()?)),
        }
    }
}

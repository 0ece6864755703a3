use super::{FetchRequest, PageFetcher, RenderedPage};
use crate::constants::{CHROME_ARGS, SELECTOR_POLL_INTERVAL_MS, USER_AGENT};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChromiumOptions {
    /// Chrome/Chromium binary; found on `PATH` when unset
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

/// One headless Chromium process, one tab per fetch
pub struct ChromiumFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumFetcher {
    pub async fn launch(options: &ChromiumOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder().arg(format!("--user-agent={USER_AGENT}"));
        for arg in CHROME_ARGS {
            builder = builder.arg(arg);
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ScraperError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScraperError::BrowserLaunch(e.to_string()))?;

        // the CDP connection only progresses while its handler is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        info!("Launched headless browser");
        Ok(Self { browser, handler })
    }
}

fn navigation_error(url: &str, e: impl std::fmt::Display) -> ScraperError {
    ScraperError::Navigation {
        url: url.to_string(),
        message: e.to_string(),
    }
}

async fn load(page: &Page, request: &FetchRequest<'_>) -> Result<RenderedPage> {
    // `goto` resolves once the page has loaded
    let navigation = async {
        page.goto(request.url).await?;
        Ok::<_, chromiumoxide::error::CdpError>(())
    };
    match tokio::time::timeout(request.navigation_timeout, navigation).await {
        Err(_) => {
            return Err(ScraperError::FetchTimeout {
                url: request.url.to_string(),
                what: "navigation".into(),
                timeout_ms: request.navigation_timeout.as_millis() as u64,
            })
        }
        Ok(Err(e)) => return Err(navigation_error(request.url, e)),
        Ok(Ok(())) => {}
    }

    if let Some(selector) = request.ready_selector {
        wait_for_selector(page, request, selector).await?;
    }

    let html = page
        .content()
        .await
        .map_err(|e| navigation_error(request.url, e))?;
    let url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| request.url.to_string());
    Ok(RenderedPage { url, html })
}

async fn wait_for_selector(page: &Page, request: &FetchRequest<'_>, selector: &str) -> Result<()> {
    let started = Instant::now();
    loop {
        if page.find_element(selector).await.is_ok() {
            debug!("Ready selector '{}' present after {:?}", selector, started.elapsed());
            return Ok(());
        }
        if started.elapsed() >= request.selector_timeout {
            return Err(ScraperError::FetchTimeout {
                url: request.url.to_string(),
                what: format!("selector '{selector}'"),
                timeout_ms: request.selector_timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(Duration::from_millis(SELECTOR_POLL_INTERVAL_MS)).await;
    }
}

#[async_trait]
impl PageFetcher for ChromiumFetcher {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<RenderedPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| navigation_error(request.url, e))?;

        let result = load(&page, request).await;
        if let Err(e) = page.close().await {
            warn!("Failed to close tab for {}: {}", request.url, e);
        }
        result
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        let closed = this.browser.close().await;
        if let Err(e) = this.browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        this.handler.abort();
        info!("Closed headless browser");
        closed
            .map(|_| ())
            .map_err(|e| ScraperError::Browser(e.to_string()))
    }
}

use super::{FetchRequest, PageFetcher, RenderedPage};
use crate::constants::USER_AGENT;
use crate::error::{Result, ScraperError};
use crate::registry::parse_selector;
use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use tracing::{debug, instrument};

/// Fetches server-rendered pages without a browser
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

fn contains_selector(html: &str, selector: &str) -> Result<bool> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<RenderedPage> {
        let response = self
            .client
            .get(request.url)
            .timeout(request.navigation_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScraperError::FetchTimeout {
                        url: request.url.to_string(),
                        what: "navigation".into(),
                        timeout_ms: request.navigation_timeout.as_millis() as u64,
                    }
                } else {
                    ScraperError::Navigation {
                        url: request.url.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Navigation {
                url: request.url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        let url = response.url().to_string();
        let html = response.text().await?;
        debug!("Fetched {} bytes from {}", html.len(), url);

        if let Some(selector) = request.ready_selector {
            if !contains_selector(&html, selector)? {
                return Err(ScraperError::Navigation {
                    url,
                    message: format!("ready selector '{selector}' not present"),
                });
            }
        }
        Ok(RenderedPage { url, html })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

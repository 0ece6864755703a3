use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sydney_events::error::{Result, ScraperError};
use sydney_events::fetch::{BrowserLauncher, FetchRequest, PageFetcher, RenderedPage};
use sydney_events::normalize::Normalizer;
use sydney_events::pipeline::{Pipeline, PipelineState, RunStatus, SourceStatus, Trigger};
use sydney_events::registry::{FetcherKind, SourceConfig, SourceRegistry};
use sydney_events::storage::{InMemoryStorage, Storage};

const CARDS_HTML: &str = r#"
<html><body>
  <div class="card">
    <h3><a href="/events/vivid">Vivid Sydney</a></h3>
    <span class="when">Sat, 15 Mar 2025, 7:30 PM</span>
    <span class="where">Circular Quay</span>
    <img src="https://img.test/vivid.jpg">
  </div>
  <div class="card">
    <h3><a href="/events/jazz">Jazz in the Domain</a></h3>
    <span class="when">1 Feb 2025</span>
  </div>
  <div class="card">
    <h3><a href="/events/markets">Night Markets</a></h3>
    <span class="when">Every Thursday</span>
    <span class="price">$10</span>
  </div>
</body></html>
"#;

enum Canned {
    Page(&'static str),
    Timeout,
}

struct FakeFetcher {
    pages: Arc<HashMap<String, Canned>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<RenderedPage> {
        match self.pages.get(request.url) {
            Some(Canned::Page(html)) => Ok(RenderedPage {
                url: request.url.to_string(),
                html: html.to_string(),
            }),
            Some(Canned::Timeout) => Err(ScraperError::FetchTimeout {
                url: request.url.to_string(),
                what: "navigation".into(),
                timeout_ms: request.navigation_timeout.as_millis() as u64,
            }),
            None => Err(ScraperError::Navigation {
                url: request.url.to_string(),
                message: "HTTP 404".into(),
            }),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeLauncher {
    pages: Arc<HashMap<String, Canned>>,
    refuse: Option<FetcherKind>,
    launches: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeLauncher {
    fn new(pages: HashMap<String, Canned>) -> Self {
        Self {
            pages: Arc::new(pages),
            refuse: None,
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn launched(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, kind: FetcherKind) -> Result<Box<dyn PageFetcher>> {
        if self.refuse == Some(kind) {
            return Err(ScraperError::BrowserLaunch("chrome not found".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeFetcher {
            pages: self.pages.clone(),
            closes: self.closes.clone(),
        }))
    }
}

fn source(name: &str, url: &str, fetcher: &str) -> SourceConfig {
    serde_json::from_value(json!({
        "name": name,
        "url": url,
        "fetcher": fetcher,
        "item_selector": ".card",
        "fields": {
            "title": { "selectors": ["h3"], "required": true },
            "date": { "selectors": [".when"] },
            "location": { "selectors": [".where"] },
            "price": { "selectors": [".price"] },
            "image_url": { "selectors": ["img"], "attr": "src" },
            "source_url": { "selectors": ["a"], "attr": "href" }
        }
    }))
    .unwrap()
}

fn registry(configs: Vec<SourceConfig>) -> Arc<SourceRegistry> {
    Arc::new(SourceRegistry::from_configs(configs).unwrap())
}

fn pipeline(
    storage: Arc<dyn Storage>,
    registry: Arc<SourceRegistry>,
    launcher: Arc<FakeLauncher>,
) -> Pipeline {
    Pipeline::new(storage, registry, launcher)
        .with_normalizer(Normalizer::new(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()))
}

fn two_source_pages() -> HashMap<String, Canned> {
    HashMap::from([
        ("https://slow.test/".to_string(), Canned::Timeout),
        ("https://cards.test/whats-on".to_string(), Canned::Page(CARDS_HTML)),
    ])
}

#[tokio::test]
async fn test_timed_out_source_is_skipped_and_others_are_stored() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let launcher = Arc::new(FakeLauncher::new(two_source_pages()));
    let pipeline = pipeline(
        storage.clone(),
        registry(vec![
            source("slow", "https://slow.test/", "chromium"),
            source("cards", "https://cards.test/whats-on", "chromium"),
        ]),
        launcher.clone(),
    );

    let report = pipeline.run(Trigger::Manual).await.unwrap();

    assert_eq!(report.status, RunStatus::PartiallyFailed);
    assert_eq!(report.skipped().collect::<Vec<_>>(), vec!["slow"]);
    assert_eq!(report.merged, 3);
    assert_eq!(report.counts.inserted, 3);
    assert!(matches!(
        report.sources[1].status,
        SourceStatus::Scraped { events: 3, dropped: 0 }
    ));

    let events = storage.list_ordered_by_date().await.unwrap();
    let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Jazz in the Domain", "Vivid Sydney", "Night Markets"]);

    let vivid = &events[1];
    assert_eq!(vivid.date, NaiveDate::from_ymd_opt(2025, 3, 15));
    assert_eq!(vivid.time, "7:30 PM");
    assert_eq!(vivid.location, "Circular Quay");
    assert_eq!(vivid.source_url, "https://cards.test/events/vivid");
    assert_eq!(vivid.image_url.as_deref(), Some("https://img.test/vivid.jpg"));

    let markets = &events[2];
    assert_eq!(markets.date, None);
    assert_eq!(markets.date_text, "Every Thursday");
    assert_eq!(markets.price, "$10");
    assert_eq!(markets.location, "Sydney");

    // one session for the shared fetcher kind, closed even though a source failed
    assert_eq!(launcher.launched(), 1);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn test_rerun_updates_in_place() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let launcher = Arc::new(FakeLauncher::new(two_source_pages()));
    let pipeline = pipeline(
        storage.clone(),
        registry(vec![source("cards", "https://cards.test/whats-on", "chromium")]),
        launcher.clone(),
    );

    let first = pipeline.run(Trigger::Scheduled).await.unwrap();
    assert_eq!(first.status, RunStatus::Completed);
    let ids_before: Vec<_> = storage
        .list_ordered_by_date()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();

    let second = pipeline.run(Trigger::Scheduled).await.unwrap();
    assert_eq!(second.counts.inserted, 0);
    assert_eq!(second.counts.updated, 3);

    let ids_after: Vec<_> = storage
        .list_ordered_by_date()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids_before, ids_after);
    assert_eq!(launcher.launched(), 2);
    assert_eq!(launcher.closed(), 2);
}

#[tokio::test]
async fn test_launch_failure_aborts_run_and_closes_opened_sessions() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let mut launcher = FakeLauncher::new(two_source_pages());
    launcher.refuse = Some(FetcherKind::Http);
    let launcher = Arc::new(launcher);
    let pipeline = pipeline(
        storage.clone(),
        registry(vec![
            source("cards", "https://cards.test/whats-on", "chromium"),
            source("static", "https://static.test/", "http"),
        ]),
        launcher.clone(),
    );

    let err = pipeline.run(Trigger::Manual).await.unwrap_err();
    assert!(matches!(err, ScraperError::BrowserLaunch(_)));
    assert_eq!(launcher.launched(), 1);
    assert_eq!(launcher.closed(), 1);
    assert!(storage.list_ordered_by_date().await.unwrap().is_empty());
    assert!(matches!(pipeline.state(), PipelineState::Failed { .. }));
}

#[tokio::test]
async fn test_named_sources_only() {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let launcher = Arc::new(FakeLauncher::new(two_source_pages()));
    let pipeline = pipeline(
        storage.clone(),
        registry(vec![
            source("slow", "https://slow.test/", "chromium"),
            source("cards", "https://cards.test/whats-on", "chromium"),
        ]),
        launcher.clone(),
    );

    let names = vec!["cards".to_string()];
    let report = pipeline
        .run_sources(Trigger::Cli, Some(&names))
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.sources.len(), 1);

    let unknown = vec!["nope".to_string()];
    let err = pipeline
        .run_sources(Trigger::Cli, Some(&unknown))
        .await
        .unwrap_err();
    assert!(matches!(err, ScraperError::UnknownSource(_)));
    assert_eq!(launcher.launched(), 1);
}

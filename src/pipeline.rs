use crate::error::{Result, ScraperError};
use crate::extract::extract;
use crate::fetch::{BrowserLauncher, FetchRequest, PageFetcher};
use crate::normalize::Normalizer;
use crate::registry::{FetcherKind, Source, SourceRegistry};
use crate::storage::Storage;
use crate::types::{NormalizedEvent, UpsertCounts};
use crate::upsert::Upserter;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use scraper::Html;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
    Cli,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
            Trigger::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Scraped { events: usize, dropped: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    #[serde(flatten)]
    pub status: SourceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    PartiallyFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub trigger: Trigger,
    pub status: RunStatus,
    pub sources: Vec<SourceOutcome>,
    pub merged: usize,
    pub counts: UpsertCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().filter_map(|o| match o.status {
            SourceStatus::Skipped { .. } => Some(o.source.as_str()),
            SourceStatus::Scraped { .. } => None,
        })
    }
}

/// Lifecycle of the most recent run, `Idle -> Running -> {Completed, PartiallyFailed}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Running {
        trigger: Trigger,
        started_at: DateTime<Utc>,
    },
    Finished {
        report: RunReport,
    },
    Failed {
        trigger: Trigger,
        error: String,
        finished_at: DateTime<Utc>,
    },
}

/// Scrapes every selected source in turn, then upserts the merged result once.
///
/// Runs may overlap (schedule plus manual trigger). Nothing serializes them;
/// the per-row upsert makes the final store state last-write-wins per title.
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    registry: Arc<SourceRegistry>,
    launcher: Arc<dyn BrowserLauncher>,
    normalizer: Option<Normalizer>,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<SourceRegistry>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            storage,
            registry,
            launcher,
            normalizer: None,
            state: Mutex::new(PipelineState::Idle),
        }
    }

    /// Pin the normalizer instead of using today's date on every run
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn state(&self) -> PipelineState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_state(&self, state: PipelineState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Run every enabled source
    pub async fn run(&self, trigger: Trigger) -> Result<RunReport> {
        self.run_sources(trigger, None).await
    }

    pub async fn run_sources(&self, trigger: Trigger, names: Option<&[String]>) -> Result<RunReport> {
        let started_at = Utc::now();
        let span = info_span!("pipeline_run", trigger = trigger.as_str());
        let result = self
            .run_inner(trigger, names, started_at)
            .instrument(span)
            .await;

        match &result {
            Ok(report) => self.set_state(PipelineState::Finished {
                report: report.clone(),
            }),
            Err(e) => {
                counter!("pipeline_runs_failed_total", "trigger" => trigger.as_str()).increment(1);
                self.set_state(PipelineState::Failed {
                    trigger,
                    error: e.to_string(),
                    finished_at: Utc::now(),
                });
            }
        }
        result
    }

    async fn run_inner(
        &self,
        trigger: Trigger,
        names: Option<&[String]>,
        started_at: DateTime<Utc>,
    ) -> Result<RunReport> {
        let sources = self.registry.select(names)?;
        self.set_state(PipelineState::Running { trigger, started_at });
        counter!("pipeline_runs_total", "trigger" => trigger.as_str()).increment(1);
        info!("Starting event scraping for {} sources", sources.len());

        let sessions = self.open_sessions(&sources).await?;
        let normalizer = self.normalizer.unwrap_or_else(Normalizer::today);

        let mut merged = Vec::new();
        let mut outcomes = Vec::with_capacity(sources.len());
        for source in &sources {
            let Some(fetcher) = session_for(&sessions, source.config.fetcher) else {
                continue;
            };
            let span = info_span!("source", source = source.name());
            let status = match self
                .scrape_source(fetcher, source, &normalizer)
                .instrument(span)
                .await
            {
                Ok((events, dropped)) => {
                    info!("Scraped {} events from {}", events.len(), source.config.label());
                    let status = SourceStatus::Scraped {
                        events: events.len(),
                        dropped,
                    };
                    merged.extend(events);
                    status
                }
                Err(e) => {
                    if e.is_source_local() {
                        warn!("Skipping {}: {}", source.config.label(), e);
                    } else {
                        error!("Skipping {}: {}", source.config.label(), e);
                    }
                    counter!("source_skipped_total", "source" => source.name().to_string()).increment(1);
                    SourceStatus::Skipped {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(SourceOutcome {
                source: source.name().to_string(),
                status,
            });
        }

        close_sessions(sessions).await;
        info!("Total events scraped: {}", merged.len());

        let counts = Upserter::new(self.storage.clone()).upsert(&merged).await;
        let any_skipped = outcomes
            .iter()
            .any(|o| matches!(o.status, SourceStatus::Skipped { .. }));
        let status = if any_skipped || counts.failed > 0 {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        };

        Ok(RunReport {
            trigger,
            status,
            sources: outcomes,
            merged: merged.len(),
            counts,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// One session per fetcher kind the selected sources need. A launch
    /// failure closes whatever already opened and aborts the run.
    async fn open_sessions(
        &self,
        sources: &[Arc<Source>],
    ) -> Result<Vec<(FetcherKind, Box<dyn PageFetcher>)>> {
        let mut kinds: Vec<FetcherKind> = Vec::new();
        for source in sources {
            if !kinds.contains(&source.config.fetcher) {
                kinds.push(source.config.fetcher);
            }
        }

        let mut sessions = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.launcher.launch(kind).await {
                Ok(session) => sessions.push((kind, session)),
                Err(e) => {
                    error!("Failed to launch {:?} fetcher: {}", kind, e);
                    close_sessions(sessions).await;
                    return Err(match e {
                        ScraperError::BrowserLaunch(_) => e,
                        other => ScraperError::BrowserLaunch(other.to_string()),
                    });
                }
            }
        }
        Ok(sessions)
    }

    async fn scrape_source(
        &self,
        fetcher: &dyn PageFetcher,
        source: &Source,
        normalizer: &Normalizer,
    ) -> Result<(Vec<NormalizedEvent>, usize)> {
        info!("Scraping {}...", source.config.label());
        let started = Instant::now();
        let page = fetcher.fetch(&FetchRequest::for_source(&source.config)).await?;
        histogram!("fetch_duration_seconds", "source" => source.name().to_string())
            .record(started.elapsed().as_secs_f64());

        // parsed and dropped before the next await; the document is not Send
        let (raw, dropped) = {
            let document = Html::parse_document(&page.html);
            let mut extraction = extract(&document, &source.rules, source.name(), &page.url);
            let raw: Vec<_> = extraction.by_ref().collect();
            (raw, extraction.dropped())
        };

        let events: Vec<NormalizedEvent> = raw.into_iter().map(|r| normalizer.normalize(r)).collect();
        counter!("events_scraped_total", "source" => source.name().to_string())
            .increment(events.len() as u64);
        Ok((events, dropped))
    }
}

fn session_for(
    sessions: &[(FetcherKind, Box<dyn PageFetcher>)],
    kind: FetcherKind,
) -> Option<&dyn PageFetcher> {
    sessions
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, session)| session.as_ref())
}

async fn close_sessions(sessions: Vec<(FetcherKind, Box<dyn PageFetcher>)>) {
    for (kind, session) in sessions {
        if let Err(e) = session.close().await {
            warn!("Failed to close {:?} fetcher: {}", kind, e);
        }
    }
}

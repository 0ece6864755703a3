use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use sydney_events::config::Config;
use sydney_events::fetch::DefaultLauncher;
use sydney_events::pipeline::{Pipeline, RunReport, SourceStatus, Trigger};
use sydney_events::server::{start_server, AppState};
use sydney_events::service::EventService;
use sydney_events::storage::{open_storage, Storage};
use sydney_events::{logging, metrics, scheduler};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sydney_events")]
#[command(about = "Sydney event listings scraper and API")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the scrape schedule
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one scrape and print the report
    Scrape {
        /// Specific sources to run (comma-separated). Defaults to every enabled source
        #[arg(long)]
        sources: Option<String>,
    },
    /// List configured sources
    Sources,
    /// Print stored events in date order
    Events,
}

fn build_pipeline(config: &Config, storage: Arc<dyn Storage>) -> anyhow::Result<Arc<Pipeline>> {
    let registry = config.registry().context("failed to load source registry")?;
    let launcher = DefaultLauncher::new(config.chromium.clone());
    Ok(Arc::new(Pipeline::new(
        storage,
        Arc::new(registry),
        Arc::new(launcher),
    )))
}

fn print_report(report: &RunReport) {
    println!("\n📊 Scrape results ({:?}):", report.status);
    for outcome in &report.sources {
        match &outcome.status {
            SourceStatus::Scraped { events, dropped } => {
                println!("   {}: {} events ({} listings dropped)", outcome.source, events, dropped)
            }
            SourceStatus::Skipped { reason } => println!("   {}: skipped ({})", outcome.source, reason),
        }
    }
    println!("   Merged: {}", report.merged);
    println!("   Inserted: {}", report.counts.inserted);
    println!("   Updated: {}", report.counts.updated);
    println!("   Failed: {}", report.counts.failed);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging("logs");

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env()?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            metrics::init_metrics();
            let interval = config.scrape_interval()?;
            let storage = open_storage(&config.database_url)?;
            let pipeline = build_pipeline(&config, storage.clone())?;

            let _scheduler = scheduler::spawn_scheduler(
                pipeline.clone(),
                interval,
                config.scrape.on_start,
            );

            let state = AppState {
                service: Arc::new(EventService::new(storage)),
                pipeline,
            };
            let port = port.unwrap_or(config.server.port);
            start_server(state, port, &config.server.allowed_origin).await?;
        }
        Commands::Scrape { sources } => {
            let names: Option<Vec<String>> = sources.map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });
            let storage = open_storage(&config.database_url)?;
            let pipeline = build_pipeline(&config, storage)?;

            println!("🔄 Running scrape...");
            match pipeline.run_sources(Trigger::Cli, names.as_deref()).await {
                Ok(report) => print_report(&report),
                Err(e) => {
                    error!("Scrape failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Sources => {
            let registry = config.registry()?;
            for source in registry.all() {
                let state = if source.config.enabled { "enabled" } else { "disabled" };
                println!(
                    "{:<20} {:<9} {:<8} {}",
                    source.name(),
                    state,
                    format!("{:?}", source.config.fetcher),
                    source.config.url
                );
            }
        }
        Commands::Events => {
            let storage = open_storage(&config.database_url)?;
            let events = EventService::new(storage).list_events().await?;
            info!("Listing {} stored events", events.len());
            for event in &events {
                let date = event
                    .date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| event.date_text.clone());
                println!("{:<12} {:<10} {} ({})", date, event.time, event.title, event.source);
            }
        }
    }
    Ok(())
}

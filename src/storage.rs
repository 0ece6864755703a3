pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

use crate::error::{Result, ScraperError};
use crate::types::{Event, NormalizedEvent, Subscription, UpsertOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Persistence port shared by the pipeline and the HTTP service.
///
/// Each method is atomic on its own; nothing spans calls. Overlapping writers to
/// the same title resolve last-write-wins.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_by_title(&self, title: &str) -> Result<Option<Event>>;

    /// Overwrite the row with this title, keeping its id, or insert a new one.
    async fn upsert_by_title(&self, event: &NormalizedEvent) -> Result<(Event, UpsertOutcome)>;

    async fn get_event(&self, id: &str) -> Result<Option<Event>>;

    /// Date ascending, undated rows last, title as tie-break
    async fn list_ordered_by_date(&self) -> Result<Vec<Event>>;

    async fn find_subscription(&self, email: &str, event_id: &str) -> Result<Option<Subscription>>;

    /// Fails with [`ScraperError::AlreadySubscribed`] if the pair exists.
    async fn insert_subscription(&self, email: &str, event_id: &str) -> Result<Subscription>;

    async fn count_subscriptions(&self) -> Result<usize>;
}

/// Open the store named by a connection string.
///
/// `memory://` is the in-process document store, `sqlite::memory:` a throwaway
/// SQLite database, and `sqlite://<path>` (or a bare path) a SQLite file.
pub fn open_storage(url: &str) -> Result<Arc<dyn Storage>> {
    let url = url.trim();
    let storage: Arc<dyn Storage> = if url == "memory://" {
        Arc::new(InMemoryStorage::new())
    } else if url == "sqlite::memory:" {
        Arc::new(SqliteStorage::open_in_memory()?)
    } else if let Some(path) = url.strip_prefix("sqlite://") {
        Arc::new(SqliteStorage::open(path)?)
    } else if !url.is_empty() && !url.contains("://") {
        Arc::new(SqliteStorage::open(url)?)
    } else {
        return Err(ScraperError::Config(format!(
            "unsupported DATABASE_URL: {}",
            url
        )));
    };
    info!("Opened store {}", url);
    Ok(storage)
}

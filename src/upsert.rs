use crate::storage::Storage;
use crate::types::{NormalizedEvent, UpsertCounts};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Writes normalized events keyed by title.
///
/// Rows are written one at a time in input order, so a title repeated within a
/// batch ends with the last occurrence's fields. A failed row is logged and
/// counted; the rest of the batch still runs.
pub struct Upserter {
    storage: Arc<dyn Storage>,
}

impl Upserter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, events), fields(events = events.len()))]
    pub async fn upsert(&self, events: &[NormalizedEvent]) -> UpsertCounts {
        let mut counts = UpsertCounts::default();
        for event in events {
            match self.storage.upsert_by_title(event).await {
                Ok((stored, outcome)) => {
                    debug!("{:?} {} ({})", outcome, stored.title, stored.id);
                    counts.record(outcome);
                }
                Err(e) => {
                    warn!("Failed to upsert event '{}': {}", event.title, e);
                    counts.failed += 1;
                }
            }
        }

        counter!("events_upserted_total", "outcome" => "inserted").increment(counts.inserted as u64);
        counter!("events_upserted_total", "outcome" => "updated").increment(counts.updated as u64);
        counter!("events_upserted_total", "outcome" => "failed").increment(counts.failed as u64);
        info!(
            "Upserted events: {} inserted, {} updated, {} failed",
            counts.inserted, counts.updated, counts.failed
        );
        counts
    }
}

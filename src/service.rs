use crate::error::{Result, ScraperError};
use crate::storage::Storage;
use crate::types::Event;
use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument};

/// Read side of the store plus email capture
pub struct EventService {
    storage: Arc<dyn Storage>,
}

impl EventService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// All stored events, dated ones first by ascending date
    pub async fn list_events(&self) -> Result<Vec<Event>> {
        self.storage.list_ordered_by_date().await
    }

    /// Records a subscription and returns the event's source URL to redirect to.
    ///
    /// Checks run in a fixed order: blank fields, existing subscription,
    /// unknown event. A store-level uniqueness violation also reports
    /// `AlreadySubscribed`, so concurrent duplicates leave a single row.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, email: &str, event_id: &str) -> Result<String> {
        let email = email.trim();
        let event_id = event_id.trim();
        if email.is_empty() || event_id.is_empty() {
            return Err(ScraperError::MissingFields);
        }

        if self.storage.find_subscription(email, event_id).await?.is_some() {
            return Err(ScraperError::AlreadySubscribed);
        }

        let event = self
            .storage
            .get_event(event_id)
            .await?
            .ok_or(ScraperError::EventNotFound)?;

        self.storage.insert_subscription(email, event_id).await?;

        counter!("subscriptions_total").increment(1);
        info!("New subscription for event {}", event_id);
        Ok(event.source_url)
    }
}

use super::Storage;
use crate::error::{Result, ScraperError};
use crate::types::{sort_by_date, Event, NormalizedEvent, Subscription, UpsertOutcome};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Document-style store keeping whole records in maps, for development and tests
pub struct InMemoryStorage {
    events: Arc<Mutex<HashMap<String, Event>>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ScraperError::Store("in-memory store lock poisoned".into()))
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_by_title(&self, title: &str) -> Result<Option<Event>> {
        let events = lock(&self.events)?;
        Ok(events.values().find(|e| e.title == title).cloned())
    }

    async fn upsert_by_title(&self, event: &NormalizedEvent) -> Result<(Event, UpsertOutcome)> {
        // one lock for lookup and write keeps the pair atomic
        let mut events = lock(&self.events)?;
        let existing = events
            .values()
            .find(|e| e.title == event.title)
            .map(|e| e.id.clone());

        let (id, outcome) = match existing {
            Some(id) => (id, UpsertOutcome::Updated),
            None => (Uuid::new_v4().to_string(), UpsertOutcome::Inserted),
        };
        let stored = Event::from_normalized(id.clone(), event, Utc::now());
        events.insert(id, stored.clone());

        debug!("{:?} event: {} with id {}", outcome, stored.title, stored.id);
        Ok((stored, outcome))
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let events = lock(&self.events)?;
        Ok(events.get(id).cloned())
    }

    async fn list_ordered_by_date(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = lock(&self.events)?.values().cloned().collect();
        sort_by_date(&mut events);
        Ok(events)
    }

    async fn find_subscription(&self, email: &str, event_id: &str) -> Result<Option<Subscription>> {
        let subscriptions = lock(&self.subscriptions)?;
        Ok(subscriptions
            .iter()
            .find(|s| s.email == email && s.event_id == event_id)
            .cloned())
    }

    async fn insert_subscription(&self, email: &str, event_id: &str) -> Result<Subscription> {
        let mut subscriptions = lock(&self.subscriptions)?;
        if subscriptions
            .iter()
            .any(|s| s.email == email && s.event_id == event_id)
        {
            return Err(ScraperError::AlreadySubscribed);
        }
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            event_id: event_id.to_string(),
            created_at: Utc::now(),
        };
        subscriptions.push(subscription.clone());

        debug!("Created subscription {} for event {}", subscription.id, event_id);
        Ok(subscription)
    }

    async fn count_subscriptions(&self) -> Result<usize> {
        Ok(lock(&self.subscriptions)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(title: &str, description: &str) -> NormalizedEvent {
        NormalizedEvent {
            title: title.into(),
            description: description.into(),
            date: None,
            date_text: "Check website".into(),
            time: "Check website".into(),
            location: "Sydney".into(),
            price: "Price varies".into(),
            image_url: None,
            source_url: "https://example.com".into(),
            source: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_id_and_overwrites_fields() {
        let store = InMemoryStorage::new();
        let (first, outcome) = store.upsert_by_title(&normalized("Gig", "old")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let (second, outcome) = store.upsert_by_title(&normalized("Gig", "new")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(first.id, second.id);

        let all = store.list_ordered_by_date().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "new");
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected() {
        let store = InMemoryStorage::new();
        store.insert_subscription("a@x.com", "e1").await.unwrap();
        let err = store.insert_subscription("a@x.com", "e1").await.unwrap_err();
        assert!(matches!(err, ScraperError::AlreadySubscribed));
        store.insert_subscription("a@x.com", "e2").await.unwrap();
        assert_eq!(store.count_subscriptions().await.unwrap(), 2);
    }
}

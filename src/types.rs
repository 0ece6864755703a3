use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One listing as scraped from a page, before defaults and date parsing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub source: String,
    pub title: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
}

/// Event after date parsing and defaults, not yet stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub title: String,
    pub description: String,
    pub date: Option<NaiveDate>,
    pub date_text: String,
    pub time: String,
    pub location: String,
    pub price: String,
    pub image_url: Option<String>,
    pub source_url: String,
    pub source: String,
}

/// Normalized event as stored and served
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    /// `None` when the scraped date text could not be parsed.
    pub date: Option<NaiveDate>,
    pub date_text: String,
    pub time: String,
    pub location: String,
    pub price: String,
    pub image_url: Option<String>,
    pub source_url: String,
    pub source: String,
    pub last_updated: DateTime<Utc>,
}

impl Event {
    pub fn from_normalized(id: String, event: &NormalizedEvent, last_updated: DateTime<Utc>) -> Self {
        Self {
            id,
            title: event.title.clone(),
            description: event.description.clone(),
            date: event.date,
            date_text: event.date_text.clone(),
            time: event.time.clone(),
            location: event.location.clone(),
            price: event.price.clone(),
            image_url: event.image_url.clone(),
            source_url: event.source_url.clone(),
            source: event.source.clone(),
            last_updated,
        }
    }

    /// Field-wise equality ignoring `id` and `last_updated`.
    pub fn same_content(&self, other: &Event) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.date == other.date
            && self.date_text == other.date_text
            && self.time == other.time
            && self.location == other.location
            && self.price == other.price
            && self.image_url == other.image_url
            && self.source_url == other.source_url
            && self.source == other.source
    }
}

/// Orders by date ascending with undated events last, then by title.
pub fn sort_by_date(events: &mut [Event]) {
    events.sort_by(|a, b| match (a.date, b.date) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.title.cmp(&b.title)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.title.cmp(&b.title),
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub email: String,
    pub event_id: String,
    pub created_at: DateTime<Utc>,
}

/// What a single `upsert_by_title` did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

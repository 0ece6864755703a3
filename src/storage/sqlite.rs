use super::Storage;
use crate::error::{Result, ScraperError};
use crate::types::{Event, NormalizedEvent, Subscription, UpsertOutcome};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS events (
        id           TEXT PRIMARY KEY,
        title        TEXT NOT NULL UNIQUE,
        description  TEXT NOT NULL DEFAULT '',
        date         TEXT,
        date_text    TEXT NOT NULL,
        time         TEXT NOT NULL,
        location     TEXT NOT NULL,
        price        TEXT NOT NULL,
        image_url    TEXT,
        source_url   TEXT NOT NULL,
        source       TEXT NOT NULL,
        last_updated TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS events_by_date ON events (date);
    CREATE TABLE IF NOT EXISTS subscribers (
        id         TEXT PRIMARY KEY,
        email      TEXT NOT NULL,
        event_id   TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (email, event_id)
    );
"#;

const EVENT_COLUMNS: &str = "id, title, description, date, date_text, time, location, price, image_url, source_url, source, last_updated";

/// Relational file store
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScraperError::Store("sqlite connection lock poisoned".into()))
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: row.get(3)?,
        date_text: row.get(4)?,
        time: row.get(5)?,
        location: row.get(6)?,
        price: row.get(7)?,
        image_url: row.get(8)?,
        source_url: row.get(9)?,
        source: row.get(10)?,
        last_updated: row.get(11)?,
    })
}

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        email: row.get(1)?,
        event_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_by_title(&self, title: &str) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE title = ?1"),
                params![title],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    async fn upsert_by_title(&self, event: &NormalizedEvent) -> Result<(Event, UpsertOutcome)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM events WHERE title = ?1",
                params![event.title],
                |row| row.get(0),
            )
            .optional()?;

        let now = Utc::now();
        let stored = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE events SET description = ?2, date = ?3, date_text = ?4, time = ?5,
                        location = ?6, price = ?7, image_url = ?8, source_url = ?9, source = ?10,
                        last_updated = ?11
                     WHERE id = ?1",
                    params![
                        id,
                        event.description,
                        event.date,
                        event.date_text,
                        event.time,
                        event.location,
                        event.price,
                        event.image_url,
                        event.source_url,
                        event.source,
                        now,
                    ],
                )?;
                (Event::from_normalized(id, event, now), UpsertOutcome::Updated)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    &format!(
                        "INSERT INTO events ({EVENT_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                    ),
                    params![
                        id,
                        event.title,
                        event.description,
                        event.date,
                        event.date_text,
                        event.time,
                        event.location,
                        event.price,
                        event.image_url,
                        event.source_url,
                        event.source,
                        now,
                    ],
                )?;
                (Event::from_normalized(id, event, now), UpsertOutcome::Inserted)
            }
        };
        tx.commit()?;

        debug!("{:?} event: {} with id {}", stored.1, stored.0.title, stored.0.id);
        Ok(stored)
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![id],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    async fn list_ordered_by_date(&self) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY date IS NULL, date ASC, title ASC"
        ))?;
        let events = stmt
            .query_map([], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    async fn find_subscription(&self, email: &str, event_id: &str) -> Result<Option<Subscription>> {
        let conn = self.conn()?;
        let subscription = conn
            .query_row(
                "SELECT id, email, event_id, created_at FROM subscribers
                 WHERE email = ?1 AND event_id = ?2",
                params![email, event_id],
                row_to_subscription,
            )
            .optional()?;
        Ok(subscription)
    }

    async fn insert_subscription(&self, email: &str, event_id: &str) -> Result<Subscription> {
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            event_id: event_id.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO subscribers (id, email, event_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                subscription.id,
                subscription.email,
                subscription.event_id,
                subscription.created_at
            ],
        ) {
            Ok(_) => {
                debug!("Created subscription {} for event {}", subscription.id, event_id);
                Ok(subscription)
            }
            Err(e) if is_constraint_violation(&e) => Err(ScraperError::AlreadySubscribed),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_subscriptions(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM subscribers", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn normalized(title: &str, date: Option<(i32, u32, u32)>) -> NormalizedEvent {
        NormalizedEvent {
            title: title.into(),
            description: format!("about {title}"),
            date: date.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            date_text: "whenever".into(),
            time: "Check website".into(),
            location: "Sydney".into(),
            price: "Price varies".into(),
            image_url: Some("https://img.example.com/a.jpg".into()),
            source_url: format!("https://example.com/{title}"),
            source: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_round_trips_event_rows() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let (stored, _) = store
            .upsert_by_title(&normalized("Opera", Some((2024, 5, 1))))
            .await
            .unwrap();

        let by_id = store.get_event(&stored.id).await.unwrap().unwrap();
        assert_eq!(by_id.id, stored.id);
        assert!(by_id.same_content(&stored));
        assert_eq!(by_id.date, NaiveDate::from_ymd_opt(2024, 5, 1));
        let by_title = store.get_by_title("Opera").await.unwrap().unwrap();
        assert_eq!(by_title.id, stored.id);
        assert!(store.get_event("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_date_with_undated_last() {
        let store = SqliteStorage::open_in_memory().unwrap();
        for (title, date) in [
            ("May", Some((2024, 5, 1))),
            ("Undated", None),
            ("March", Some((2024, 3, 10))),
            ("April", Some((2024, 4, 20))),
        ] {
            store.upsert_by_title(&normalized(title, date)).await.unwrap();
        }
        let dates: Vec<_> = store
            .list_ordered_by_date()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.date.map(|d| d.to_string()))
            .collect();
        assert_eq!(
            dates,
            vec![
                Some("2024-03-10".to_string()),
                Some("2024-04-20".to_string()),
                Some("2024-05-01".to_string()),
                None
            ]
        );
    }

    #[tokio::test]
    async fn test_subscription_pair_is_unique_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("events.db");
        {
            let store = SqliteStorage::open(&path).unwrap();
            store.insert_subscription("a@x.com", "e1").await.unwrap();
            let err = store.insert_subscription("a@x.com", "e1").await.unwrap_err();
            assert!(matches!(err, ScraperError::AlreadySubscribed));
        }
        let reopened = SqliteStorage::open(&path).unwrap();
        assert_eq!(reopened.count_subscriptions().await.unwrap(), 1);
        assert!(reopened
            .find_subscription("a@x.com", "e1")
            .await
            .unwrap()
            .is_some());
    }
}

/*!
Persistent event store backed by a single SQLite table
*/

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::event::{Event, format_timestamp};

/// Format of the `sent` column once an event has been posted or skipped
pub const SENT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid start timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Settings applied when opening the store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// `PRAGMA journal_mode` value, e.g. `wal`
    pub journal_mode: Option<String>,
    /// Rows starting more than this many days ago are removed on open
    pub retention_days: i64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            journal_mode: Some("wal".to_string()),
            retention_days: 7,
        }
    }
}

pub struct EventStore {
    conn: Connection,
    options: StoreOptions,
}

impl EventStore {
    /// Open (or create) the database file, bootstrap the schema and purge
    /// expired rows.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        if let Some(mode) = options.journal_mode.as_deref() {
            let applied: String =
                conn.pragma_update_and_check(None, "journal_mode", mode, |row| row.get(0))?;
            debug!("SQLite journal mode: {}", applied);
        }

        let store = Self::from_connection(conn, options, Utc::now())?;
        info!("Event store opened: {:?} ({} rows)", path.as_ref(), store.count()?);
        Ok(store)
    }

    /// Wrap an already open connection. Schema bootstrap and the retention
    /// sweep run relative to `now`.
    pub fn from_connection(conn: Connection, options: StoreOptions, now: DateTime<Utc>) -> Result<Self> {
        let store = Self { conn, options };
        store.initialize_schema()?;
        store.purge_expired(now)?;
        Ok(store)
    }

    /// Throwaway store, e.g. for tests
    pub fn open_in_memory(options: StoreOptions, now: DateTime<Utc>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, options, now)
    }

    /// Give the connection back, e.g. to reopen it
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS feed (
                pk TEXT NOT NULL PRIMARY KEY,
                start TEXT NOT NULL,
                sent TEXT,
                id INTEGER NOT NULL,
                lfdnr TEXT NOT NULL,
                thema TEXT NOT NULL,
                von TEXT NOT NULL,
                bis TEXT NOT NULL,
                plz TEXT,
                strasse_nr TEXT,
                aufzugsstrecke TEXT,
                checksum TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_feed_start ON feed(start);
            CREATE INDEX IF NOT EXISTS idx_feed_checksum ON feed(checksum);
            CREATE INDEX IF NOT EXISTS idx_feed_id ON feed(id);
        "#,
        )?;
        Ok(())
    }

    /// Remove rows whose start lies before the retention window
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(self.options.retention_days);
        let deleted = self
            .conn
            .execute("DELETE FROM feed WHERE start < ?1", [format_timestamp(&cutoff)])?;

        if deleted > 0 {
            info!("Purged {} events older than {} days", deleted, self.options.retention_days);
        }
        Ok(deleted)
    }

    /// Store an event. Returns `false` when the same start/subject pair is
    /// already known.
    pub fn insert(&self, event: &Event) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO feed
             (pk, start, id, lfdnr, thema, von, bis, plz, strasse_nr, aufzugsstrecke, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            (
                event.key(),
                format_timestamp(&event.start),
                event.id,
                &event.serial,
                &event.subject,
                &event.from,
                &event.until,
                &event.postal_code,
                &event.street,
                &event.route,
                event.checksum(),
            ),
        )?;

        debug!("Insert event {}: {} row(s)", event.id, inserted);
        Ok(inserted > 0)
    }

    /// The pending event with the lowest id starting within `(now, now + horizon)`
    pub fn next_unsent(&self, now: DateTime<Utc>, horizon: Duration) -> Result<Option<Event>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, lfdnr, start, thema, von, bis, plz, strasse_nr, aufzugsstrecke
                 FROM feed
                 WHERE sent IS NULL AND start > ?1 AND start < ?2
                 ORDER BY id ASC
                 LIMIT 1",
                [format_timestamp(&now), format_timestamp(&(now + horizon))],
                row_to_raw,
            )
            .optional()?;

        row.map(RawEvent::into_event).transpose()
    }

    /// Whether an event with the same checksum has already been posted.
    /// Rows carrying an error message instead of a timestamp do not count.
    pub fn is_duplicate(&self, event: &Event) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT sent FROM feed WHERE sent IS NOT NULL AND checksum = ?1")?;
        let sent_values = stmt.query_map([event.checksum()], |row| row.get::<_, String>(0))?;

        for sent in sent_values {
            if NaiveDateTime::parse_from_str(&sent?, SENT_FORMAT).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Record that the event has been handled. Applies to every row sharing
    /// the source id.
    pub fn mark_sent(&self, event: &Event, now: DateTime<Utc>) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE feed SET sent = ?1 WHERE id = ?2",
            (now.format(SENT_FORMAT).to_string(), event.id),
        )?;
        Ok(updated)
    }

    /// Record a posting failure so the event is skipped on the next run
    pub fn mark_error(&self, event: &Event, message: &str) -> Result<usize> {
        let updated = self
            .conn
            .execute("UPDATE feed SET sent = ?1 WHERE id = ?2", (message, event.id))?;
        Ok(updated)
    }

    /// The `sent` marker of the row with the given key, if any
    pub fn sent_marker(&self, key: &str) -> Result<Option<String>> {
        let marker = self
            .conn
            .query_row("SELECT sent FROM feed WHERE pk = ?1", [key], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(marker.flatten())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM feed", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Row as read from SQLite, before the start column is parsed
struct RawEvent {
    id: i64,
    serial: String,
    start: String,
    subject: String,
    from: String,
    until: String,
    postal_code: Option<String>,
    street: Option<String>,
    route: Option<String>,
}

fn row_to_raw(row: &Row) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        id: row.get(0)?,
        serial: row.get(1)?,
        start: row.get(2)?,
        subject: row.get(3)?,
        from: row.get(4)?,
        until: row.get(5)?,
        postal_code: row.get(6)?,
        street: row.get(7)?,
        route: row.get(8)?,
    })
}

impl RawEvent {
    fn into_event(self) -> Result<Event> {
        let start = DateTime::parse_from_rfc3339(&self.start)
            .map_err(|source| StoreError::Timestamp {
                value: self.start.clone(),
                source,
            })?
            .with_timezone(&Utc);

        Ok(Event {
            id: self.id,
            serial: self.serial,
            start,
            subject: self.subject,
            from: self.from,
            until: self.until,
            postal_code: self.postal_code.unwrap_or_default(),
            street: self.street.unwrap_or_default(),
            route: self.route.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn store() -> EventStore {
        EventStore::open_in_memory(StoreOptions::default(), now()).unwrap()
    }

    fn event(id: i64, hours_ahead: i64, subject: &str) -> Event {
        Event {
            id,
            serial: format!("{:04}", id),
            start: now() + Duration::hours(hours_ahead),
            subject: subject.to_string(),
            from: "12:00".to_string(),
            until: "14:00".to_string(),
            postal_code: "10115".to_string(),
            street: "Invalidenstraße 1".to_string(),
            route: String::new(),
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = store();
        let feed = vec![event(1, 2, "Kundgebung"), event(2, 3, "Mahnwache")];

        let first: Vec<bool> = feed.iter().map(|e| store.insert(e).unwrap()).collect();
        assert_eq!(first, vec![true, true]);

        let second: Vec<bool> = feed.iter().map(|e| store.insert(e).unwrap()).collect();
        assert_eq!(second, vec![false, false]);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_same_event_new_start_is_new_row() {
        let store = store();
        assert!(store.insert(&event(1, 2, "Kundgebung")).unwrap());
        assert!(store.insert(&event(1, 4, "Kundgebung")).unwrap());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_next_unsent_respects_window_and_order() {
        let store = store();
        store.insert(&event(30, -1, "Vorbei")).unwrap();
        store.insert(&event(20, 3, "Zweite")).unwrap();
        store.insert(&event(10, 5, "Erste")).unwrap();
        store.insert(&event(5, 9, "Zu spät")).unwrap();

        let next = store.next_unsent(now(), Duration::hours(8)).unwrap().unwrap();
        assert_eq!(next.id, 10);
        assert_eq!(next.subject, "Erste");
        assert_eq!(next.start, now() + Duration::hours(5));
        assert_eq!(next.street, "Invalidenstraße 1");

        store.mark_sent(&next, now()).unwrap();
        let next = store.next_unsent(now(), Duration::hours(8)).unwrap().unwrap();
        assert_eq!(next.id, 20);

        store.mark_error(&next, "API error (422): invalid").unwrap();
        assert!(store.next_unsent(now(), Duration::hours(8)).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_requires_sent_timestamp() {
        let store = store();
        let first = event(1, 2, "Kundgebung");
        let mut repost = event(2, 26, "Kundgebung");
        repost.serial = "9999".to_string();
        store.insert(&first).unwrap();
        store.insert(&repost).unwrap();

        assert!(!store.is_duplicate(&repost).unwrap());

        store.mark_error(&first, "connection refused").unwrap();
        assert!(!store.is_duplicate(&repost).unwrap());

        store.mark_sent(&first, now()).unwrap();
        assert!(store.is_duplicate(&repost).unwrap());
    }

    #[test]
    fn test_mark_sent_stores_timestamp() {
        let store = store();
        let e = event(1, 2, "Kundgebung");
        store.insert(&e).unwrap();
        assert_eq!(store.sent_marker(&e.key()).unwrap(), None);

        assert_eq!(store.mark_sent(&e, now()).unwrap(), 1);
        assert_eq!(
            store.sent_marker(&e.key()).unwrap().as_deref(),
            Some("2024-05-01 08:00:00")
        );
    }

    #[test]
    fn test_old_rows_purged_on_reopen() {
        let store = store();
        store.insert(&event(1, -24 * 8, "Letzte Woche")).unwrap();
        store.insert(&event(2, -24 * 6, "Vor sechs Tagen")).unwrap();
        store.insert(&event(3, 2, "Heute")).unwrap();
        assert_eq!(store.count().unwrap(), 3);

        let conn = store.into_connection();
        let reopened = EventStore::from_connection(conn, StoreOptions::default(), now()).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert!(reopened.sent_marker(&event(1, -24 * 8, "Letzte Woche").key()).unwrap().is_none());
    }

    #[test]
    fn test_open_file_applies_journal_mode() {
        let path = std::env::temp_dir().join(format!("assembly-store-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let store = EventStore::open(&path, StoreOptions::default()).unwrap();
            assert_eq!(store.count().unwrap(), 0);
        }
        let store = EventStore::open(&path, StoreOptions::default()).unwrap();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        drop(store);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}

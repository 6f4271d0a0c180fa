//! SQLite-backed durable store for ingestion events and blob metadata.
//!
//! Both tables are append-only: rows are only ever inserted, except for the
//! purge operation that removes a blob and everything recorded about it as
//! one transaction. Writes and reads never lock against each other beyond
//! SQLite's own guarantees; readers always re-aggregate from rows.

use crate::model::{BlobMetadataRow, EventKind, EventStatus, IngestQuery, IngestionEvent};
use core_types::{BlobId, IngestId, StoreError};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;

pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    /// Create or open the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::write)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database; used by tests and the CLI's dry-run mode.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::write)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ingestion_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blob_id TEXT NOT NULL,
                ingest_id TEXT NOT NULL,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                details TEXT NOT NULL,
                event_time INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_ingest ON ingestion_events(ingest_id);
            CREATE INDEX IF NOT EXISTS idx_events_blob ON ingestion_events(blob_id);

            CREATE TABLE IF NOT EXISTS blob_metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ingest_id TEXT NOT NULL,
                blob_id TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                path TEXT NOT NULL,
                insert_time INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_metadata_ingest ON blob_metadata(ingest_id);
            CREATE INDEX IF NOT EXISTS idx_metadata_blob ON blob_metadata(blob_id);
            "#,
        )
        .map_err(StoreError::write)
    }

    /// Append one event row. Never overwrites.
    pub fn append_event(&self, event: &IngestionEvent) -> Result<(), StoreError> {
        let details = serde_json::to_string(&event.details).map_err(StoreError::write)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ingestion_events (blob_id, ingest_id, type, status, details, event_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.blob_id.as_str(),
                event.ingest_id.as_str(),
                event.kind.as_str(),
                event.status.as_str(),
                details,
                event.event_time,
            ],
        )
        .map_err(StoreError::write)?;
        Ok(())
    }

    /// Append one metadata row. Never overwrites.
    pub fn append_metadata(&self, row: &BlobMetadataRow) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO blob_metadata (ingest_id, blob_id, file_size, path, insert_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.ingest_id.as_str(),
                row.blob_id.as_str(),
                row.file_size,
                row.path,
                row.insert_time,
            ],
        )
        .map_err(StoreError::write)?;
        Ok(())
    }

    /// All events whose ingest id matches the query, time-ordered (insertion
    /// order breaks same-millisecond ties).
    pub fn events_matching(&self, query: &IngestQuery) -> Result<Vec<IngestionEvent>, StoreError> {
        let (filter, needle) = query_filter(query);
        let sql = format!(
            "SELECT blob_id, ingest_id, type, status, details, event_time
             FROM ingestion_events WHERE {filter} ORDER BY event_time, id"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(StoreError::read)?;
        let rows = stmt
            .query_map(params![needle], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(StoreError::read)?;

        let mut events = Vec::new();
        for row in rows {
            let (blob_id, ingest_id, kind, status, details, event_time) =
                row.map_err(StoreError::read)?;
            events.push(IngestionEvent {
                blob_id: BlobId::new(blob_id),
                ingest_id: IngestId::new(ingest_id),
                kind: EventKind::parse(&kind).ok_or_else(|| malformed("type", &kind))?,
                status: EventStatus::parse(&status).ok_or_else(|| malformed("status", &status))?,
                details: serde_json::from_str(&details).map_err(StoreError::read)?,
                event_time,
            });
        }
        Ok(events)
    }

    /// All metadata rows whose ingest id matches the query.
    pub fn metadata_matching(&self, query: &IngestQuery) -> Result<Vec<BlobMetadataRow>, StoreError> {
        let (filter, needle) = query_filter(query);
        let sql = format!(
            "SELECT ingest_id, blob_id, file_size, path, insert_time
             FROM blob_metadata WHERE {filter} ORDER BY insert_time, id"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(StoreError::read)?;
        let rows = stmt
            .query_map(params![needle], |row| {
                Ok(BlobMetadataRow {
                    ingest_id: IngestId::new(row.get::<_, String>(0)?),
                    blob_id: BlobId::new(row.get::<_, String>(1)?),
                    file_size: row.get::<_, u64>(2)?,
                    path: row.get::<_, String>(3)?,
                    insert_time: row.get::<_, i64>(4)?,
                })
            })
            .map_err(StoreError::read)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::read)
    }

    /// Delete every event and metadata row for a blob as one transaction.
    /// Returns the number of removed rows for confirmation.
    pub fn purge_blob(&self, blob_id: &BlobId) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StoreError::write)?;
        let events = tx
            .execute(
                "DELETE FROM ingestion_events WHERE blob_id = ?1",
                params![blob_id.as_str()],
            )
            .map_err(StoreError::write)?;
        let metadata = tx
            .execute(
                "DELETE FROM blob_metadata WHERE blob_id = ?1",
                params![blob_id.as_str()],
            )
            .map_err(StoreError::write)?;
        tx.commit().map_err(StoreError::write)?;
        let removed = (events + metadata) as u64;
        tracing::info!(blob = %blob_id, removed, "purged blob rows");
        Ok(removed)
    }
}

/// Exact match or string-prefix filter on `ingest_id`.
fn query_filter(query: &IngestQuery) -> (&'static str, String) {
    match query {
        IngestQuery::Exact(id) => ("ingest_id = ?1", id.as_str().to_string()),
        IngestQuery::Prefix(p) => ("substr(ingest_id, 1, length(?1)) = ?1", p.clone()),
    }
}

fn malformed(column: &str, value: &str) -> StoreError {
    StoreError::read(std::io::Error::other(format!(
        "malformed {column} column: {value:?}"
    )))
}

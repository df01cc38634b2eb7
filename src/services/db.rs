use crate::error::Result;
use crate::models::category::Category;
use crate::models::entry::{ArtifactRef, Entry};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Durable store for classification entries, backed by a single SQLite
/// connection. Writes are serialized by the connection mutex; reads
/// return rows ordered newest first.
#[derive(Clone)]
pub struct EntryStore {
    conn: Arc<Mutex<Connection>>,
}

impl EntryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests and previews.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL for concurrent readers; FULL so a successful create() means
        // the row has hit disk.
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = FULL;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                confidence REAL NOT NULL,
                timestamp INTEGER NOT NULL,
                artifact TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Write an entry durably and return its stored form. A nil id is
    /// treated as missing and replaced with a fresh one; the timestamp
    /// is truncated to the millisecond precision of the stored column.
    pub fn create(&self, mut entry: Entry) -> Result<Entry> {
        if entry.id.is_nil() {
            entry.id = Uuid::new_v4();
        }
        let millis = entry.timestamp.timestamp_millis();
        entry.timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or(entry.timestamp);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entries (id, category, confidence, timestamp, artifact)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id.to_string(),
                entry.category.label(),
                entry.confidence as f64,
                millis,
                entry.artifact.as_ref().map(|a| a.as_str()),
            ],
        )?;
        Ok(entry)
    }

    /// Full history, newest first. Ties in timestamp keep a stable
    /// relative order (insertion order via rowid).
    pub fn fetch_all(&self) -> Result<Vec<Entry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, category, confidence, timestamp, artifact
             FROM entries ORDER BY timestamp DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, category, confidence, millis, artifact) = row?;
            let Some(entry) = decode_row(&id, &category, confidence, millis, artifact) else {
                tracing::warn!(id, category, "skipping undecodable entry row");
                continue;
            };
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Entry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, category, confidence, timestamp, artifact FROM entries WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;

        if let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let category: String = row.get(1)?;
            let confidence: f64 = row.get(2)?;
            let millis: i64 = row.get(3)?;
            let artifact: Option<String> = row.get(4)?;
            Ok(decode_row(&id, &category, confidence, millis, artifact))
        } else {
            Ok(None)
        }
    }

    /// Remove an entry. A missing id is a silent no-op.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM entries WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM entries", [])?;
        Ok(())
    }

    /// Reconcile entries introduced by an external actor (e.g. a remote
    /// sync). Field-level merge where the external copy wins: existing
    /// rows have every field overwritten by the remote values, new ids
    /// are inserted. Row identity (rowid) is preserved so tie order in
    /// `fetch_all` stays stable.
    pub fn merge_remote(&self, remote: &[Entry]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entries (id, category, confidence, timestamp, artifact)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     category = excluded.category,
                     confidence = excluded.confidence,
                     timestamp = excluded.timestamp,
                     artifact = excluded.artifact",
            )?;
            for entry in remote {
                stmt.execute(params![
                    entry.id.to_string(),
                    entry.category.label(),
                    entry.confidence as f64,
                    entry.timestamp.timestamp_millis(),
                    entry.artifact.as_ref().map(|a| a.as_str()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Seed demo history: one entry per trailing day, random category,
    /// confidence in 0.85..0.99.
    pub fn seed_sample_data(&self, count: usize) -> Result<()> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let now = Utc::now();
        for i in 0..count {
            let category = Category::ALL[rng.gen_range(0..Category::ALL.len())];
            let confidence = rng.gen_range(0.85f32..0.99);
            let timestamp = now - chrono::Duration::days(i as i64);
            self.create(Entry::new(category, confidence, timestamp, None))?;
        }
        Ok(())
    }
}

fn decode_row(
    id: &str,
    category: &str,
    confidence: f64,
    millis: i64,
    artifact: Option<String>,
) -> Option<Entry> {
    Some(Entry {
        id: Uuid::parse_str(id).ok()?,
        category: Category::from_label(category)?,
        confidence: confidence as f32,
        timestamp: Utc.timestamp_millis_opt(millis).single()?,
        artifact: artifact.map(ArtifactRef::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry_at(category: Category, confidence: f32, days_ago: i64) -> Entry {
        Entry::new(
            category,
            confidence,
            Utc::now() - Duration::days(days_ago),
            None,
        )
    }

    #[test]
    fn create_then_fetch_round_trips() {
        let store = EntryStore::in_memory().unwrap();
        let stored = store
            .create(entry_at(Category::Plastic, 0.92, 0))
            .unwrap();

        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, stored.id);
        assert_eq!(all[0].category, Category::Plastic);
        assert!((all[0].confidence - 0.92).abs() < 1e-6);
        assert_eq!(all[0].timestamp, stored.timestamp);
    }

    #[test]
    fn create_assigns_missing_id() {
        let store = EntryStore::in_memory().unwrap();
        let mut entry = entry_at(Category::Metal, 0.5, 0);
        entry.id = Uuid::nil();
        let stored = store.create(entry).unwrap();
        assert!(!stored.id.is_nil());
    }

    #[test]
    fn fetch_all_is_timestamp_descending() {
        let store = EntryStore::in_memory().unwrap();
        store.create(entry_at(Category::Paper, 0.8, 2)).unwrap();
        store.create(entry_at(Category::Metal, 0.8, 0)).unwrap();
        store.create(entry_at(Category::Trash, 0.8, 1)).unwrap();

        let all = store.fetch_all().unwrap();
        let categories: Vec<Category> = all.iter().map(|e| e.category).collect();
        assert_eq!(
            categories,
            vec![Category::Metal, Category::Trash, Category::Paper]
        );
    }

    #[test]
    fn timestamp_ties_keep_stable_order() {
        let store = EntryStore::in_memory().unwrap();
        let when = Utc::now();
        for category in [Category::Paper, Category::Metal, Category::Trash] {
            store
                .create(Entry::new(category, 0.8, when, None))
                .unwrap();
        }
        let first = store.fetch_all().unwrap();
        let second = store.fetch_all().unwrap();
        assert_eq!(
            first.iter().map(|e| e.id).collect::<Vec<_>>(),
            second.iter().map(|e| e.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn delete_removes_and_missing_id_is_noop() {
        let store = EntryStore::in_memory().unwrap();
        let stored = store.create(entry_at(Category::Clothes, 0.7, 0)).unwrap();

        store.delete(stored.id).unwrap();
        assert!(store.fetch_all().unwrap().is_empty());

        // Deleting again must not error.
        store.delete(stored.id).unwrap();
        store.delete(Uuid::new_v4()).unwrap();
    }

    #[test]
    fn clear_all_empties_the_store() {
        let store = EntryStore::in_memory().unwrap();
        store.seed_sample_data(10).unwrap();
        assert_eq!(store.fetch_all().unwrap().len(), 10);
        store.clear_all().unwrap();
        assert!(store.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn merge_remote_trumps_local_fields() {
        let store = EntryStore::in_memory().unwrap();
        let local = store.create(entry_at(Category::Paper, 0.60, 0)).unwrap();

        let mut remote = local.clone();
        remote.category = Category::Cardboard;
        remote.confidence = 0.95;
        let new_remote = entry_at(Category::Shoes, 0.88, 1);

        store
            .merge_remote(&[remote.clone(), new_remote.clone()])
            .unwrap();

        let all = store.fetch_all().unwrap();
        assert_eq!(all.len(), 2);
        let merged = store.get(local.id).unwrap().unwrap();
        assert_eq!(merged.category, Category::Cardboard);
        assert!((merged.confidence - 0.95).abs() < 1e-6);
        assert!(store.get(new_remote.id).unwrap().is_some());
    }

    #[test]
    fn artifact_ref_survives_the_round_trip() {
        let store = EntryStore::in_memory().unwrap();
        let mut with_artifact = entry_at(Category::Batteries, 0.9, 0);
        with_artifact.artifact = Some(ArtifactRef::new("abc.jpg"));
        let stored = store.create(with_artifact).unwrap();

        let fetched = store.get(stored.id).unwrap().unwrap();
        assert_eq!(fetched.artifact, Some(ArtifactRef::new("abc.jpg")));
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let stored = {
            let store = EntryStore::new(&path).unwrap();
            store.create(entry_at(Category::GreenGlass, 0.9, 0)).unwrap()
        };

        let reopened = EntryStore::new(&path).unwrap();
        let all = reopened.fetch_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, stored.id);
        assert_eq!(all[0].category, Category::GreenGlass);
    }
}

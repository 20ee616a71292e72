use anyhow::Result;
use rusqlite::{Connection, params};

use crate::domain::email::MessageId;
use crate::store::repo::SeenStore;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS seen (
                id        TEXT PRIMARY KEY,
                last_seen INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl SeenStore for SqliteStore {
    fn load(&self) -> Result<Vec<(MessageId, i64)>> {
        let mut stmt = self.conn.prepare(r#"SELECT id, last_seen FROM seen"#)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let id: String = r.get(0)?;
            out.push((MessageId(id), r.get(1)?));
        }
        Ok(out)
    }

    fn record(&self, entries: &[(MessageId, i64)]) -> Result<()> {
        let mut stmt = self.conn.prepare(
            r#"
            INSERT INTO seen (id, last_seen)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET last_seen=excluded.last_seen
            "#,
        )?;
        for (id, last_seen) in entries {
            stmt.execute(params![id.as_str(), last_seen])?;
        }
        Ok(())
    }

    fn evict_older_than(&self, horizon_epoch: i64) -> Result<()> {
        self.conn.execute(
            r#"DELETE FROM seen WHERE last_seen < ?1"#,
            params![horizon_epoch],
        )?;
        Ok(())
    }

    fn get_meta_i64(&self, key: &str) -> Result<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT value FROM meta WHERE key=?1"#)?;
        let mut rows = stmt.query(params![key])?;
        if let Some(r) = rows.next()? {
            Ok(Some(r.get(0)?))
        } else {
            Ok(None)
        }
    }

    fn set_meta_i64(&self, key: &str, value: i64) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_load_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .record(&[(MessageId::from("1:a"), 10), (MessageId::from("1:b"), 20)])
            .unwrap();

        let mut entries = store.load().unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![(MessageId::from("1:a"), 10), (MessageId::from("1:b"), 20)]
        );
    }

    #[test]
    fn re_recording_refreshes_the_last_seen_stamp() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.record(&[(MessageId::from("1:a"), 10)]).unwrap();
        store.record(&[(MessageId::from("1:a"), 50)]).unwrap();

        assert_eq!(store.load().unwrap(), vec![(MessageId::from("1:a"), 50)]);

        // a refreshed stamp keeps the id inside the horizon
        store.evict_older_than(30).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn evict_removes_only_entries_past_the_horizon() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .record(&[
                (MessageId::from("1:old"), 100),
                (MessageId::from("1:edge"), 200),
                (MessageId::from("1:new"), 300),
            ])
            .unwrap();

        store.evict_older_than(200).unwrap();

        let mut ids: Vec<_> = store
            .load()
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.as_str().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, ["1:edge", "1:new"]);
    }

    #[test]
    fn meta_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_meta_i64("last_poll_epoch").unwrap(), None);
        store.set_meta_i64("last_poll_epoch", 42).unwrap();
        store.set_meta_i64("last_poll_epoch", 43).unwrap();
        assert_eq!(store.get_meta_i64("last_poll_epoch").unwrap(), Some(43));
    }
}

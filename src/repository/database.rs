use super::models::TrackingRecord;
use super::traits::{CursorStore, SubscriptionStore};
use super::{CursorRepository, TrackingRepository};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {db_path}"))?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;
        Ok(db)
    }

    /// Locked connection for repository use. A poisoned lock is taken over.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tracking (
                subscriber_id TEXT NOT NULL,
                wallet TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (subscriber_id, wallet)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tracking_wallet
             ON tracking(wallet)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cursors (
                network TEXT PRIMARY KEY,
                last_scanned_block INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

impl SubscriptionStore for Database {
    fn load_all(&self) -> Result<Vec<TrackingRecord>> {
        let conn = self.conn();
        TrackingRepository::new(&conn).list(None)
    }

    fn upsert(&self, record: &TrackingRecord) -> Result<()> {
        let conn = self.conn();
        TrackingRepository::new(&conn).upsert(record)
    }

    fn delete(&self, subscriber_id: &str, wallet: &Address) -> Result<()> {
        let conn = self.conn();
        TrackingRepository::new(&conn).delete(subscriber_id, wallet)?;
        Ok(())
    }
}

impl CursorStore for Database {
    fn load_cursor(&self, network: &str) -> Result<Option<u64>> {
        let conn = self.conn();
        CursorRepository::new(&conn).get_last_scanned_block(network)
    }

    fn save_cursor(&self, network: &str, block: u64) -> Result<()> {
        let conn = self.conn();
        CursorRepository::new(&conn).upsert(network, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn store_round_trips_tracking_and_cursors() {
        let db = Database::new(":memory:").unwrap();
        let wallet = address!("0x00000000000000000000000000000000000000aa");

        db.upsert(&TrackingRecord {
            subscriber_id: "42".to_string(),
            wallet,
            name: "Alice".to_string(),
        })
        .unwrap();
        db.save_cursor("base", 1_000).unwrap();

        let records = db.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Alice");
        assert_eq!(db.load_cursor("base").unwrap(), Some(1_000));
        assert_eq!(db.load_cursor("scroll").unwrap(), None);

        db.delete("42", &wallet).unwrap();
        assert!(db.load_all().unwrap().is_empty());
    }
}

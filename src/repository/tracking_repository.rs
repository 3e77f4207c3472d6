use super::models::TrackingRecord;
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{Row, params};
use std::str::FromStr;

pub struct TrackingRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TrackingRepository<'a> {
    const UPSERT_TRACKING: &'static str =
        "INSERT INTO tracking (subscriber_id, wallet, name) VALUES (?1, ?2, ?3)
         ON CONFLICT(subscriber_id, wallet) DO UPDATE SET name = excluded.name";

    const DELETE_TRACKING: &'static str =
        "DELETE FROM tracking WHERE subscriber_id = ?1 AND wallet = ?2";

    const SELECT_ALL: &'static str =
        "SELECT subscriber_id, wallet, name FROM tracking ORDER BY subscriber_id, wallet";

    const SELECT_BY_SUBSCRIBER: &'static str = "SELECT subscriber_id, wallet, name FROM tracking
         WHERE subscriber_id = ?1 ORDER BY wallet";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, record: &TrackingRecord) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_TRACKING,
            params![
                record.subscriber_id,
                record.wallet.to_checksum(None),
                record.name
            ],
        )?;
        Ok(())
    }

    /// Returns the number of rows removed (0 or 1).
    pub fn delete(&self, subscriber_id: &str, wallet: &Address) -> Result<usize> {
        let removed = self.conn.execute(
            Self::DELETE_TRACKING,
            params![subscriber_id, wallet.to_checksum(None)],
        )?;
        Ok(removed)
    }

    pub fn list(&self, subscriber_id: Option<&str>) -> Result<Vec<TrackingRecord>> {
        let records = match subscriber_id {
            Some(id) => {
                let mut stmt = self.conn.prepare(Self::SELECT_BY_SUBSCRIBER)?;
                stmt.query_map(params![id], Self::row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(Self::SELECT_ALL)?;
                stmt.query_map([], Self::row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    pub fn get_statistics(&self) -> Result<TrackingStats> {
        let (subscribers, rows, distinct_wallets): (usize, usize, usize) = self.conn.query_row(
            "SELECT COUNT(DISTINCT subscriber_id), COUNT(*), COUNT(DISTINCT wallet) FROM tracking",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let cursors: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM cursors", [], |row| row.get(0))?;

        Ok(TrackingStats {
            subscribers,
            tracked_rows: rows,
            distinct_wallets,
            cursors,
        })
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<TrackingRecord> {
        let wallet = Address::from_str(&row.get::<_, String>(1)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(TrackingRecord {
            subscriber_id: row.get(0)?,
            wallet,
            name: row.get(2)?,
        })
    }
}

#[derive(Debug)]
pub struct TrackingStats {
    pub subscribers: usize,
    pub tracked_rows: usize,
    pub distinct_wallets: usize,
    pub cursors: usize,
}

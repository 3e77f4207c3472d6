use super::models::CursorRecord;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CursorRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> CursorRepository<'a> {
    const UPSERT_CURSOR: &'static str =
        "INSERT INTO cursors (network, last_scanned_block, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(network) DO UPDATE SET
            last_scanned_block = excluded.last_scanned_block,
            updated_at = excluded.updated_at";

    const GET_LAST_SCANNED_BLOCK: &'static str =
        "SELECT last_scanned_block FROM cursors WHERE network = ?1";

    const SELECT_ALL: &'static str =
        "SELECT network, last_scanned_block, updated_at FROM cursors ORDER BY network";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get_last_scanned_block(&self, network: &str) -> Result<Option<u64>> {
        let block: Option<u64> = self
            .conn
            .query_row(Self::GET_LAST_SCANNED_BLOCK, params![network], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(block)
    }

    pub fn upsert(&self, network: &str, block_number: u64) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        self.conn
            .execute(Self::UPSERT_CURSOR, params![network, block_number, now])?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<CursorRecord>> {
        let mut stmt = self.conn.prepare(Self::SELECT_ALL)?;
        let cursors = stmt
            .query_map([], |row| {
                Ok(CursorRecord {
                    network: row.get(0)?,
                    last_scanned_block: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cursors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    #[test]
    fn upsert_moves_cursor_forward() {
        let db = Database::new(":memory:").unwrap();
        let conn = db.conn();
        let repo = CursorRepository::new(&conn);

        repo.upsert("arbitrum", 199).unwrap();
        repo.upsert("arbitrum", 299).unwrap();
        repo.upsert("base", 7).unwrap();

        assert_eq!(repo.get_last_scanned_block("arbitrum").unwrap(), Some(299));

        let all = repo.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].network, "arbitrum");
        assert_eq!(all[1].last_scanned_block, 7);
    }
}

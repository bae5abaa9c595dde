//! Persistent "already searched" ledger backed by SQLite.
//!
//! Liveness is evaluated at read time against the caller's TTL, so changing
//! `ttl_hours` between runs immediately changes which records count as recent.
//! Every write is a single autocommit statement, so a killed process never
//! leaves a half-written record behind.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, OpenFlags};

use crate::error::HuntError;
use crate::protocol::WantedKind;

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

pub struct StateLedger {
    conn: Connection,
    read_only: bool,
}

impl StateLedger {
    /// Opens (creating if needed) the ledger file for reading and writing.
    pub fn open(path: &Path) -> Result<Self, HuntError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                HuntError::StateStore(format!(
                    "cannot create state directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let ledger = Self {
            conn,
            read_only: false,
        };
        ledger.initialize_schema()?;
        Ok(ledger)
    }

    /// Opens the ledger without ever touching the file. A missing file or a
    /// file without the ledger table yields an empty in-memory ledger.
    pub fn open_read_only(path: &Path) -> Result<Self, HuntError> {
        if !path.exists() {
            debug!("State ledger {} does not exist yet", path.display());
            return Self::empty_read_only();
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let has_table: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'searched'",
            [],
            |row| row.get(0),
        )?;
        if has_table == 0 {
            return Self::empty_read_only();
        }
        Ok(Self {
            conn,
            read_only: true,
        })
    }

    pub fn open_in_memory() -> Result<Self, HuntError> {
        let ledger = Self {
            conn: Connection::open_in_memory()?,
            read_only: false,
        };
        ledger.initialize_schema()?;
        Ok(ledger)
    }

    fn empty_read_only() -> Result<Self, HuntError> {
        let mut ledger = Self::open_in_memory()?;
        ledger.read_only = true;
        Ok(ledger)
    }

    fn initialize_schema(&self) -> Result<(), HuntError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS searched (
                instance_id TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                searched_at_ms INTEGER NOT NULL,
                PRIMARY KEY (instance_id, item_id, kind)
            )",
            [],
        )?;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), HuntError> {
        if self.read_only {
            return Err(HuntError::StateStore(
                "state ledger is open read-only".to_string(),
            ));
        }
        Ok(())
    }

    fn cutoff_ms(ttl_hours: u32, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis()
            .saturating_sub(i64::from(ttl_hours).saturating_mul(MILLIS_PER_HOUR))
    }

    /// True iff a record for the exact key exists with `now - searched_at < ttl`.
    pub fn is_recently_searched(
        &self,
        instance_id: &str,
        item_id: i64,
        kind: WantedKind,
        ttl_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, HuntError> {
        let live: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM searched
             WHERE instance_id = ?1 AND item_id = ?2 AND kind = ?3 AND searched_at_ms > ?4",
            params![instance_id, item_id, kind.as_str(), Self::cutoff_ms(ttl_hours, now)],
            |row| row.get(0),
        )?;
        Ok(live > 0)
    }

    /// Records a confirmed search. Re-recording a key refreshes its timestamp.
    pub fn record_searched(
        &self,
        instance_id: &str,
        item_id: i64,
        kind: WantedKind,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HuntError> {
        self.ensure_writable()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO searched (instance_id, item_id, kind, searched_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![instance_id, item_id, kind.as_str(), timestamp.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Deletes records that are expired under `ttl_hours`. Returns the count.
    pub fn purge_expired(&self, ttl_hours: u32, now: DateTime<Utc>) -> Result<usize, HuntError> {
        self.ensure_writable()?;
        let purged = self.conn.execute(
            "DELETE FROM searched WHERE searched_at_ms <= ?1",
            params![Self::cutoff_ms(ttl_hours, now)],
        )?;
        Ok(purged)
    }

    pub fn record_count(&self) -> Result<usize, HuntError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM searched", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

//! SQLite catalog store
//!
//! One `Store` owns one connection. Threads open their own store against the
//! same database file; SQLite's locking (with the configured busy timeout)
//! serializes writers.

pub(crate) mod files;
mod schema;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

pub use files::FileRecord;

/// Catalog database handle
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the catalog at `path`.
    ///
    /// `timeout` bounds every lock wait; exceeding it yields `Error::Timeout`.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened catalog");

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Private in-memory catalog (for tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    /// Change the lock timeout for subsequent calls.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction, taking the write lock up front so that
    /// concurrent writers queue instead of failing on upgrade.
    pub(crate) fn write_transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Row counts per table, for status reporting.
    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut counts = Vec::new();
        for table in schema::TABLES {
            let count: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
            counts.push((table, count));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_created() {
        let store = Store::open_in_memory().unwrap();
        let counts = store.table_counts().unwrap();
        assert_eq!(counts.len(), schema::TABLES.len());
        assert!(counts.iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_open_file_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let _a = Store::open(&path, Duration::from_millis(100)).unwrap();
        let b = Store::open(&path, Duration::from_millis(100)).unwrap();
        assert_eq!(b.table_counts().unwrap().len(), schema::TABLES.len());
    }
}

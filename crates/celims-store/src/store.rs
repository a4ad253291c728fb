//! Connection ownership and scoped transactions

use crate::schema;
use crate::{Result, StoreError};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// Default wait for a competing writer to release the database
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Owner of the single SQLite connection.
///
/// Reads go through [`Store::conn`]; every multi-step mutation goes through
/// [`Store::write`], which commits on `Ok` and rolls back on `Err`.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a database file and migrate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(busy_timeout)?;
        tracing::info!(path = %path.as_ref().display(), "opened database");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::configure(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Read access.
    #[inline]
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// The write lock is taken up front so read-then-insert sequences inside
    /// `f` cannot interleave with another writer. Any `Err` from `f` drops the
    /// transaction, which rolls back every statement it ran.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a [`StoreError`] if the transaction
    /// cannot begin or commit.
    pub fn write<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        tracing::debug!("transaction begin");
        let value = match f(&tx) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!("transaction rolled back");
                return Err(err);
            }
        };
        tx.commit().map_err(StoreError::from)?;
        tracing::debug!("transaction commit");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_count(store: &Store) -> i64 {
        store
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap()
    }

    fn insert_user(tx: &Transaction<'_>, name: &str) -> Result<()> {
        tx.execute(
            "INSERT INTO users (username, full_name, role, created_at) VALUES (?1, ?1, 'manager', '')",
            [name],
        )?;
        Ok(())
    }

    #[test]
    fn commits_on_ok() {
        let mut store = Store::open_in_memory().unwrap();
        store.write(|tx| insert_user(tx, "a")).unwrap();
        assert_eq!(user_count(&store), 1);
    }

    #[test]
    fn rolls_back_every_statement_on_err() {
        let mut store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.write(|tx| {
            insert_user(tx, "a")?;
            insert_user(tx, "a")
        });
        assert!(result.is_err());
        assert_eq!(user_count(&store), 0);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = Store::open_in_memory().unwrap();
        let enabled: bool = store
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert!(enabled);
    }

    #[test]
    fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.db");
        {
            let mut store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
            store.write(|tx| insert_user(tx, "persisted")).unwrap();
        }
        let store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(user_count(&store), 1);
    }
}

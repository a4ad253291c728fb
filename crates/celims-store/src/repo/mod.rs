//! Repository functions, one module per aggregate

pub mod assignments;
pub mod audit;
pub mod custody;
pub mod reference;
pub mod results;
pub mod samples;
pub mod stats;

use crate::{Result, StoreError, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Fail with [`StoreError::Referential`] unless `table` holds a live row `id`.
pub(crate) fn require_live(
    conn: &Connection,
    entity: &'static str,
    table: &'static str,
    id: i64,
) -> Result<()> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?1 AND is_deleted = 0");
    let found = conn
        .query_row(&sql, [id], |_| Ok(()))
        .optional()?
        .is_some();
    if found {
        Ok(())
    } else {
        Err(StoreError::Referential { entity, id })
    }
}

/// Fail with [`StoreError::Referential`] unless the user exists.
pub(crate) fn require_user(conn: &Connection, id: UserId) -> Result<()> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |_| Ok(()))
        .optional()?
        .is_some();
    if found {
        Ok(())
    } else {
        Err(StoreError::Referential {
            entity: "user",
            id: id.0,
        })
    }
}

/// Soft-delete a row, returning whether a live row was flagged.
pub(crate) fn soft_delete(
    conn: &Connection,
    table: &'static str,
    id: i64,
    at: DateTime<Utc>,
) -> Result<bool> {
    let sql = format!(
        "UPDATE {table} SET is_deleted = 1, updated_at = ?2 WHERE id = ?1 AND is_deleted = 0"
    );
    Ok(conn.execute(&sql, params![id, at])? == 1)
}

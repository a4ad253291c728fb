//! Append-only, hash-chained audit log

use super::require_user;
use crate::model::{AuditAction, AuditEntry, AuditId, NewAuditEntry, UserId};
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const AUDIT_COLUMNS: &str = "id, table_name, record_id, action, old_values, new_values, \
     changed_by, changed_at, request_id, prev_hash, entry_hash";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get("id")?,
        table_name: row.get("table_name")?,
        record_id: row.get("record_id")?,
        action: row.get("action")?,
        old_values: row.get("old_values")?,
        new_values: row.get("new_values")?,
        changed_by: row.get("changed_by")?,
        changed_at: row.get("changed_at")?,
        request_id: row.get("request_id")?,
        prev_hash: row.get("prev_hash")?,
        entry_hash: row.get("entry_hash")?,
    })
}

struct HashInput<'a> {
    table_name: &'a str,
    record_id: i64,
    action: AuditAction,
    old_values: Option<&'a Value>,
    new_values: Option<&'a Value>,
    changed_by: UserId,
    changed_at: DateTime<Utc>,
    request_id: Option<&'a str>,
    prev_hash: &'a str,
}

fn compute_hash(input: &HashInput<'_>) -> Result<String> {
    let json = |v: Option<&Value>| -> Result<String> {
        Ok(v.map(serde_json::to_string).transpose()?.unwrap_or_default())
    };
    let mut hasher = Sha256::new();
    hasher.update(input.prev_hash.as_bytes());
    hasher.update([0]);
    hasher.update(input.table_name.as_bytes());
    hasher.update([0]);
    hasher.update(input.record_id.to_le_bytes());
    hasher.update(input.action.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(json(input.old_values)?.as_bytes());
    hasher.update([0]);
    hasher.update(json(input.new_values)?.as_bytes());
    hasher.update([0]);
    hasher.update(input.changed_by.0.to_le_bytes());
    hasher.update(
        input
            .changed_at
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            .as_bytes(),
    );
    hasher.update([0]);
    hasher.update(input.request_id.unwrap_or_default().as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Hash of the newest entry, or [`GENESIS_HASH`] for an empty log.
pub fn head(conn: &Connection) -> Result<String> {
    Ok(conn
        .query_row(
            "SELECT entry_hash FROM audit_log ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or_else(|| GENESIS_HASH.to_string()))
}

/// Append one entry, chaining it to the current head.
///
/// # Errors
///
/// [`StoreError::Referential`](crate::StoreError::Referential) if the acting user does not exist.
pub fn append(conn: &Connection, entry: &NewAuditEntry) -> Result<AuditId> {
    require_user(conn, entry.changed_by)?;
    let prev_hash = head(conn)?;
    let entry_hash = compute_hash(&HashInput {
        table_name: entry.table_name,
        record_id: entry.record_id,
        action: entry.action,
        old_values: entry.old_values.as_ref(),
        new_values: entry.new_values.as_ref(),
        changed_by: entry.changed_by,
        changed_at: entry.changed_at,
        request_id: entry.request_id.as_deref(),
        prev_hash: &prev_hash,
    })?;
    conn.execute(
        "INSERT INTO audit_log (table_name, record_id, action, old_values, new_values,
                                changed_by, changed_at, request_id, prev_hash, entry_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.table_name,
            entry.record_id,
            entry.action,
            entry.old_values,
            entry.new_values,
            entry.changed_by,
            entry.changed_at,
            entry.request_id,
            prev_hash,
            entry_hash
        ],
    )?;
    let id = AuditId(conn.last_insert_rowid());
    tracing::trace!(%id, table = entry.table_name, record = entry.record_id, action = %entry.action, "audit appended");
    Ok(id)
}

/// Every entry for one record, oldest first.
pub fn trail(conn: &Connection, table_name: &str, record_id: i64) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE table_name = ?1 AND record_id = ?2 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![table_name, record_id], entry_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// The newest `limit` entries across all tables, newest first.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map([limit], entry_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?)
}

/// Outcome of walking the whole chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainReport {
    /// Every link and hash checks out
    Intact { entries: u64, head: String },
    /// First entry whose link or hash does not match
    Broken { at: AuditId, reason: String },
}

impl ChainReport {
    #[inline]
    #[must_use]
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

/// Recompute every hash in id order and check each `prev_hash` link.
pub fn verify(conn: &Connection) -> Result<ChainReport> {
    let mut stmt = conn.prepare(&format!("SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY id"))?;
    let rows = stmt.query_map([], entry_from_row)?;

    let mut prev = GENESIS_HASH.to_string();
    let mut entries = 0u64;
    for row in rows {
        let entry = row?;
        if entry.prev_hash != prev {
            return Ok(ChainReport::Broken {
                at: entry.id,
                reason: "prev_hash does not match preceding entry".into(),
            });
        }
        let expected = compute_hash(&HashInput {
            table_name: &entry.table_name,
            record_id: entry.record_id,
            action: entry.action,
            old_values: entry.old_values.as_ref(),
            new_values: entry.new_values.as_ref(),
            changed_by: entry.changed_by,
            changed_at: entry.changed_at,
            request_id: entry.request_id.as_deref(),
            prev_hash: &entry.prev_hash,
        })?;
        if entry.entry_hash != expected {
            return Ok(ChainReport::Broken {
                at: entry.id,
                reason: "entry_hash does not match contents".into(),
            });
        }
        prev = entry.entry_hash;
        entries += 1;
    }
    Ok(ChainReport::Intact {
        entries,
        head: prev,
    })
}

//! Chain of custody

use super::{require_live, require_user};
use crate::model::{CustodyId, CustodyRecord, NewCustody, SampleId};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

/// Append one handoff.
///
/// # Errors
///
/// [`StoreError::Referential`](crate::StoreError::Referential) if the sample
/// is missing or deleted, or either person does not exist.
pub fn record(conn: &Connection, handoff: &NewCustody, at: DateTime<Utc>) -> Result<CustodyId> {
    require_live(conn, "sample", "samples", handoff.sample_id.0)?;
    if let Some(from) = handoff.from_person {
        require_user(conn, from)?;
    }
    require_user(conn, handoff.to_person)?;
    conn.execute(
        "INSERT INTO chain_of_custody (sample_id, custody_at, from_person, to_person, location,
                                       purpose, condition, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            handoff.sample_id,
            at,
            handoff.from_person,
            handoff.to_person,
            handoff.location,
            handoff.purpose,
            handoff.condition,
            handoff.notes
        ],
    )?;
    Ok(CustodyId(conn.last_insert_rowid()))
}

/// Handoffs of one sample in the order they happened.
pub fn chain(conn: &Connection, sample: SampleId) -> Result<Vec<CustodyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, sample_id, custody_at, from_person, to_person, location, purpose, condition, notes
         FROM chain_of_custody WHERE sample_id = ?1 ORDER BY custody_at, id",
    )?;
    let rows = stmt.query_map([sample], |row| {
        Ok(CustodyRecord {
            id: row.get(0)?,
            sample_id: row.get(1)?,
            custody_at: row.get(2)?,
            from_person: row.get(3)?,
            to_person: row.get(4)?,
            location: row.get(5)?,
            purpose: row.get(6)?,
            condition: row.get(7)?,
            notes: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

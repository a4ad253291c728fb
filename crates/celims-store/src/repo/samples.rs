//! Samples and sample codes

use super::{require_live, require_user, soft_delete};
use crate::model::{NewSample, ProjectId, Sample, SampleId, SampleStatus, UserId};
use crate::{Result, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

static SAMPLE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^S-(\d{4})-(\d{2})-(\d{2})-(\d{3,})$").expect("sample code regex is valid")
});

const SAMPLE_COLUMNS: &str = "id, sample_code, project_id, material_type, sample_location, \
     quantity, quantity_unit, collection_date, condition, priority, notes, status, is_deleted, \
     created_at, created_by, updated_at, updated_by";

/// Prefix shared by every code issued on `date`
#[must_use]
pub fn code_prefix(date: NaiveDate) -> String {
    format!("S-{}-", date.format("%Y-%m-%d"))
}

/// Format a sample code from its date and daily sequence.
#[must_use]
pub fn format_code(date: NaiveDate, seq: u32) -> String {
    format!("{}{seq:03}", code_prefix(date))
}

/// Split a sample code into its date and sequence number.
#[must_use]
pub fn parse_code(code: &str) -> Option<(NaiveDate, u32)> {
    let caps = SAMPLE_CODE.captures(code)?;
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    Some((date, caps[4].parse().ok()?))
}

/// Next code for `date`: samples already issued that day (soft-deleted ones
/// included) plus one, shifted by `offset` when retrying after a collision.
///
/// The count and the subsequent insert are only race-free when both run in
/// the same IMMEDIATE transaction.
pub fn next_code(conn: &Connection, date: NaiveDate, offset: u32) -> Result<String> {
    let issued: u32 = conn.query_row(
        "SELECT COUNT(*) FROM samples WHERE substr(sample_code, 1, 13) = ?1",
        [code_prefix(date)],
        |row| row.get(0),
    )?;
    Ok(format_code(date, issued + 1 + offset))
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get("id")?,
        code: row.get("sample_code")?,
        project_id: row.get("project_id")?,
        material_type: row.get("material_type")?,
        location: row.get("sample_location")?,
        quantity: row.get("quantity")?,
        quantity_unit: row.get("quantity_unit")?,
        collection_date: row.get("collection_date")?,
        condition: row.get("condition")?,
        priority: row.get("priority")?,
        notes: row.get("notes")?,
        status: row.get("status")?,
        is_deleted: row.get("is_deleted")?,
        created_at: row.get("created_at")?,
        created_by: row.get("created_by")?,
        updated_at: row.get("updated_at")?,
        updated_by: row.get("updated_by")?,
    })
}

/// Insert a sample in `registered` state under `code`.
///
/// # Errors
///
/// - [`StoreError::Referential`] if the project is missing or deleted
/// - [`StoreError::Duplicate`] if `code` is already taken
pub fn insert(
    conn: &Connection,
    code: &str,
    sample: &NewSample,
    created_by: UserId,
    at: DateTime<Utc>,
) -> Result<SampleId> {
    require_live(conn, "project", "projects", sample.project_id.0)?;
    require_user(conn, created_by)?;
    conn.execute(
        "INSERT INTO samples (sample_code, project_id, material_type, sample_location, quantity,
                              quantity_unit, collection_date, condition, priority, notes,
                              status, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            code,
            sample.project_id,
            sample.material_type,
            sample.location,
            sample.quantity,
            sample.quantity_unit,
            sample.collection_date,
            sample.condition,
            sample.priority,
            sample.notes,
            SampleStatus::Registered,
            at,
            created_by
        ],
    )
    .map_err(|e| StoreError::from(e).on_unique("sample", code))?;
    Ok(SampleId(conn.last_insert_rowid()))
}

/// Live sample by id.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn get(conn: &Connection, id: SampleId) -> Result<Sample> {
    conn.query_row(
        &format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE id = ?1 AND is_deleted = 0"),
        [id],
        sample_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "sample",
        id: id.0,
    })
}

/// Live sample by code.
pub fn find_by_code(conn: &Connection, code: &str) -> Result<Option<Sample>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE sample_code = ?1 AND is_deleted = 0"),
            [code],
            sample_from_row,
        )
        .optional()?)
}

/// Live samples of a project, newest first.
pub fn list_by_project(conn: &Connection, project: ProjectId) -> Result<Vec<Sample>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SAMPLE_COLUMNS} FROM samples
         WHERE project_id = ?1 AND is_deleted = 0 ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt.query_map([project], sample_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Live samples currently in one of `statuses`, oldest first.
pub fn list_by_status(conn: &Connection, statuses: &[SampleStatus]) -> Result<Vec<Sample>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; statuses.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {SAMPLE_COLUMNS} FROM samples
         WHERE is_deleted = 0 AND status IN ({placeholders}) ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params_from_iter(statuses), sample_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Overwrite the workflow status of a live sample.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn set_status(
    conn: &Connection,
    id: SampleId,
    status: SampleStatus,
    by: UserId,
    at: DateTime<Utc>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE samples SET status = ?2, updated_at = ?3, updated_by = ?4
         WHERE id = ?1 AND is_deleted = 0",
        params![id, status, at, by],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "sample",
            id: id.0,
        });
    }
    Ok(())
}

/// Flag a sample as deleted; the row and its code stay reserved.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or already deleted.
pub fn delete(conn: &Connection, id: SampleId, by: UserId, at: DateTime<Utc>) -> Result<()> {
    if !soft_delete(conn, "samples", id.0, at)? {
        return Err(StoreError::NotFound {
            entity: "sample",
            id: id.0,
        });
    }
    conn.execute("UPDATE samples SET updated_by = ?2 WHERE id = ?1", params![id, by])?;
    Ok(())
}

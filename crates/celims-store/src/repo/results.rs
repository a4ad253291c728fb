//! Test results and raw file metadata
//!
//! An assignment owns at most one live result. [`start`] upserts it in place,
//! so restarting a test resets the existing row to `draft` instead of creating
//! a second one.

use super::{require_live, require_user};
use crate::model::{
    verdict_column, AssignmentId, EquipmentId, EquipmentStatus, NewRawFile, RawFile, RawFileId,
    ResultId, ResultStatus, ResultSubmission, TestResult, UserId,
};
use crate::{Result, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const RESULT_COLUMNS: &str = "id, assignment_id, tested_by, test_started_at, test_completed_at, \
     equipment_id, test_parameters, raw_data, calculated_results, result_value, result_unit, \
     pass_fail, observations, status, approved_by, approved_at, rejection_reason, is_deleted, \
     updated_at";

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TestResult> {
    Ok(TestResult {
        id: row.get("id")?,
        assignment_id: row.get("assignment_id")?,
        tested_by: row.get("tested_by")?,
        started_at: row.get("test_started_at")?,
        completed_at: row.get("test_completed_at")?,
        equipment_id: row.get("equipment_id")?,
        test_parameters: row.get("test_parameters")?,
        raw_data: row.get("raw_data")?,
        calculated_results: row.get("calculated_results")?,
        result_value: row.get("result_value")?,
        result_unit: row.get("result_unit")?,
        pass_fail: verdict_column(row, "pass_fail")?,
        observations: row.get("observations")?,
        status: row.get("status")?,
        approved_by: row.get("approved_by")?,
        approved_at: row.get("approved_at")?,
        rejection_reason: row.get("rejection_reason")?,
        is_deleted: row.get("is_deleted")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Live result of an assignment, if any.
pub fn for_assignment(conn: &Connection, assignment: AssignmentId) -> Result<Option<TestResult>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {RESULT_COLUMNS} FROM test_results WHERE assignment_id = ?1 AND is_deleted = 0"
            ),
            [assignment],
            result_from_row,
        )
        .optional()?)
}

/// Live result by id.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn get(conn: &Connection, id: ResultId) -> Result<TestResult> {
    conn.query_row(
        &format!("SELECT {RESULT_COLUMNS} FROM test_results WHERE id = ?1 AND is_deleted = 0"),
        [id],
        result_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "test result",
        id: id.0,
    })
}

/// Create or reset the assignment's result as a `draft` started at `at`.
///
/// A reset clears everything recorded by a previous attempt: readings,
/// outcome, approval and rejection fields.
///
/// # Errors
///
/// [`StoreError::Referential`] if the assignment is missing or deleted.
pub fn start(
    conn: &Connection,
    assignment: AssignmentId,
    tested_by: UserId,
    at: DateTime<Utc>,
) -> Result<ResultId> {
    require_live(conn, "test assignment", "test_assignments", assignment.0)?;
    require_user(conn, tested_by)?;

    if let Some(existing) = for_assignment(conn, assignment)? {
        conn.execute(
            "UPDATE test_results
             SET tested_by = ?2, test_started_at = ?3, test_completed_at = NULL,
                 equipment_id = NULL, test_parameters = NULL, raw_data = NULL,
                 calculated_results = NULL, result_value = NULL, result_unit = NULL,
                 pass_fail = NULL, observations = NULL, status = ?4,
                 approved_by = NULL, approved_at = NULL, rejection_reason = NULL,
                 updated_at = ?3
             WHERE id = ?1",
            params![existing.id, tested_by, at, ResultStatus::Draft],
        )?;
        return Ok(existing.id);
    }

    conn.execute(
        "INSERT INTO test_results (assignment_id, tested_by, test_started_at, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?3)",
        params![assignment, tested_by, at, ResultStatus::Draft],
    )
    .map_err(|e| StoreError::from(e).on_unique("test result", assignment.to_string()))?;
    Ok(ResultId(conn.last_insert_rowid()))
}

/// Record completed-test data and move the result to `submitted`.
///
/// # Errors
///
/// - [`StoreError::NotFound`] if the result is missing or deleted
/// - [`StoreError::Referential`] if the equipment is missing, deleted or not `active`
pub fn submit(
    conn: &Connection,
    id: ResultId,
    submission: &ResultSubmission,
    tested_by: UserId,
    at: DateTime<Utc>,
) -> Result<()> {
    if let Some(equipment) = submission.equipment_id {
        require_active_equipment(conn, equipment)?;
    }
    let changed = conn.execute(
        "UPDATE test_results
         SET tested_by = ?2, test_completed_at = ?3, equipment_id = ?4, test_parameters = ?5,
             raw_data = ?6, calculated_results = ?7, result_value = ?8, result_unit = ?9,
             pass_fail = ?10, observations = ?11, status = ?12, rejection_reason = NULL,
             updated_at = ?3
         WHERE id = ?1 AND is_deleted = 0",
        params![
            id,
            tested_by,
            at,
            submission.equipment_id,
            submission.test_parameters,
            submission.raw_data,
            submission.calculated_results,
            submission.result_value,
            submission.result_unit,
            submission.pass_fail.map(|v| v.as_str()),
            submission.observations,
            ResultStatus::Submitted
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "test result",
            id: id.0,
        });
    }
    Ok(())
}

/// Mark a result approved by `approver`.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn approve(conn: &Connection, id: ResultId, approver: UserId, at: DateTime<Utc>) -> Result<()> {
    require_user(conn, approver)?;
    let changed = conn.execute(
        "UPDATE test_results
         SET status = ?2, approved_by = ?3, approved_at = ?4, rejection_reason = NULL, updated_at = ?4
         WHERE id = ?1 AND is_deleted = 0",
        params![id, ResultStatus::Approved, approver, at],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "test result",
            id: id.0,
        });
    }
    Ok(())
}

/// Mark a result rejected with `reason`.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn reject(conn: &Connection, id: ResultId, reason: &str, at: DateTime<Utc>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE test_results SET status = ?2, rejection_reason = ?3, updated_at = ?4
         WHERE id = ?1 AND is_deleted = 0",
        params![id, ResultStatus::Rejected, reason, at],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "test result",
            id: id.0,
        });
    }
    Ok(())
}

fn require_active_equipment(conn: &Connection, id: EquipmentId) -> Result<()> {
    let status: Option<EquipmentStatus> = conn
        .query_row(
            "SELECT status FROM equipment WHERE id = ?1 AND is_deleted = 0",
            [id],
            |row| row.get(0),
        )
        .optional()?;
    match status {
        Some(EquipmentStatus::Active) => Ok(()),
        _ => Err(StoreError::Referential {
            entity: "equipment",
            id: id.0,
        }),
    }
}

// ---- raw files ----

/// Attach file metadata to a live result.
///
/// # Errors
///
/// [`StoreError::Referential`] if the result is missing or deleted.
pub fn insert_raw_file(
    conn: &Connection,
    result: ResultId,
    file: &NewRawFile,
    uploaded_by: UserId,
    at: DateTime<Utc>,
) -> Result<RawFileId> {
    require_live(conn, "test result", "test_results", result.0)?;
    conn.execute(
        "INSERT INTO raw_files (test_result_id, file_name, file_path, file_type, file_size,
                                uploaded_by, uploaded_at, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            result,
            file.file_name,
            file.file_path,
            file.file_type,
            file.file_size,
            uploaded_by,
            at,
            file.description
        ],
    )?;
    Ok(RawFileId(conn.last_insert_rowid()))
}

pub fn list_raw_files(conn: &Connection, result: ResultId) -> Result<Vec<RawFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, test_result_id, file_name, file_path, file_type, file_size, uploaded_by,
                uploaded_at, description
         FROM raw_files WHERE test_result_id = ?1 AND is_deleted = 0 ORDER BY id",
    )?;
    let rows = stmt.query_map([result], |row| {
        Ok(RawFile {
            id: row.get(0)?,
            result_id: row.get(1)?,
            file_name: row.get(2)?,
            file_path: row.get(3)?,
            file_type: row.get(4)?,
            file_size: row.get(5)?,
            uploaded_by: row.get(6)?,
            uploaded_at: row.get(7)?,
            description: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

// ---- read models ----

/// A submitted result awaiting a manager decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub result_id: ResultId,
    pub assignment_id: AssignmentId,
    pub sample_code: String,
    pub test_name: String,
    pub standard: String,
    pub result_value: Option<f64>,
    pub result_unit: Option<String>,
    pub tested_by: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Submitted live results, oldest completion first.
pub fn pending_approvals(conn: &Connection) -> Result<Vec<PendingApproval>> {
    let mut stmt = conn.prepare(
        "SELECT tr.id, tr.assignment_id, s.sample_code, tm.test_name, tm.standard,
                tr.result_value, tr.result_unit, u.full_name, tr.test_completed_at
         FROM test_results tr
         JOIN test_assignments ta ON ta.id = tr.assignment_id AND ta.is_deleted = 0
         JOIN samples s ON s.id = ta.sample_id AND s.is_deleted = 0
         JOIN test_methods tm ON tm.id = ta.test_method_id
         JOIN users u ON u.id = tr.tested_by
         WHERE tr.status = 'submitted' AND tr.is_deleted = 0
         ORDER BY tr.test_completed_at, tr.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PendingApproval {
            result_id: row.get(0)?,
            assignment_id: row.get(1)?,
            sample_code: row.get(2)?,
            test_name: row.get(3)?,
            standard: row.get(4)?,
            result_value: row.get(5)?,
            result_unit: row.get(6)?,
            tested_by: row.get(7)?,
            completed_at: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewAssignment, NewSample, Priority};
    use crate::repo::reference::{
        insert_equipment, insert_method, insert_project, insert_user, NewEquipment, NewMethod,
        NewProject,
    };
    use crate::repo::{assignments, samples};
    use crate::{ProjectStatus, Role, Store};
    use celims_calc::Verdict;
    use serde_json::json;

    fn at(offset: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_718_000_000 + offset, 0).unwrap_or_default()
    }

    fn fixture() -> (Store, AssignmentId, UserId) {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let tech = insert_user(conn, "omar", "Omar Hassan", Role::LabTech, None, at(0)).unwrap();
        let project = insert_project(
            conn,
            &NewProject {
                code: "PRJ-1",
                name: "Bridge",
                client_name: None,
                location: None,
                start_date: None,
                end_date: None,
                status: ProjectStatus::Active,
            },
            at(0),
        )
        .unwrap();
        let method = insert_method(
            conn,
            &NewMethod {
                code: "ASTM-C39",
                name: "Compressive Strength",
                standard: "ASTM C39",
                material_type: "Concrete",
                parameters: json!({}),
                calculation_formula: None,
                typical_duration: None,
            },
        )
        .unwrap();
        let sample = samples::insert(
            conn,
            "S-2024-06-10-001",
            &NewSample {
                project_id: project,
                material_type: "Concrete".into(),
                ..NewSample::default()
            },
            tech,
            at(0),
        )
        .unwrap();
        let assignment = assignments::insert(
            conn,
            &NewAssignment {
                sample_id: sample,
                test_method_id: method,
                assigned_to: tech,
                due_date: None,
                priority: Priority::Normal,
                notes: None,
            },
            tech,
            at(0),
        )
        .unwrap();
        (store, assignment, tech)
    }

    fn submission(raw: serde_json::Value) -> ResultSubmission {
        ResultSubmission {
            equipment_id: None,
            test_parameters: Some(json!({"age": 28})),
            raw_data: raw,
            calculated_results: Some(json!({"compressive_strength": 25.46})),
            result_value: 25.46,
            result_unit: "MPa".into(),
            pass_fail: Some(Verdict::Fail),
            observations: Some("cone fracture".into()),
        }
    }

    #[test]
    fn raw_data_round_trips_exactly() {
        let (store, assignment, tech) = fixture();
        let conn = store.conn();
        let raw = json!({"diameter": 150, "max_load": "450", "readings": [1.5, 2, null], "note": "ok"});
        let id = start(conn, assignment, tech, at(1)).unwrap();
        submit(conn, id, &submission(raw.clone()), tech, at(2)).unwrap();

        let stored = get(conn, id).unwrap();
        assert_eq!(stored.raw_data, Some(raw));
        assert_eq!(stored.status, ResultStatus::Submitted);
        assert_eq!(stored.pass_fail, Some(Verdict::Fail));
        assert_eq!(stored.completed_at, Some(at(2)));
    }

    #[test]
    fn restart_resets_the_same_row() {
        let (store, assignment, tech) = fixture();
        let conn = store.conn();
        let first = start(conn, assignment, tech, at(1)).unwrap();
        submit(conn, first, &submission(json!({"a": 1})), tech, at(2)).unwrap();
        reject(conn, first, "recheck load cell", at(3)).unwrap();

        let second = start(conn, assignment, tech, at(4)).unwrap();
        assert_eq!(first, second);
        let row = get(conn, second).unwrap();
        assert_eq!(row.status, ResultStatus::Draft);
        assert_eq!(row.raw_data, None);
        assert_eq!(row.rejection_reason, None);
        assert_eq!(row.started_at, Some(at(4)));

        let live: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM test_results WHERE assignment_id = ?1 AND is_deleted = 0",
                [assignment],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(live, 1);
    }

    #[test]
    fn partial_index_blocks_a_second_live_result() {
        let (store, assignment, tech) = fixture();
        let conn = store.conn();
        start(conn, assignment, tech, at(1)).unwrap();
        let err = conn
            .execute(
                "INSERT INTO test_results (assignment_id, tested_by, status, created_at)
                 VALUES (?1, ?2, 'draft', '')",
                params![assignment, tech],
            )
            .map_err(|e| StoreError::from(e).on_unique("test result", "x"))
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn equipment_must_be_active() {
        let (store, assignment, tech) = fixture();
        let conn = store.conn();
        let eq = insert_equipment(
            conn,
            &NewEquipment {
                code: "EQ-002",
                name: "Compression Machine",
                manufacturer: None,
                model: None,
                serial_number: None,
                calibration_date: None,
                calibration_due_date: None,
                status: EquipmentStatus::Calibration,
                location: None,
            },
        )
        .unwrap();
        let id = start(conn, assignment, tech, at(1)).unwrap();
        let mut with_eq = submission(json!({}));
        with_eq.equipment_id = Some(eq);
        let err = submit(conn, id, &with_eq, tech, at(2)).unwrap_err();
        assert!(matches!(err, StoreError::Referential { entity: "equipment", .. }));
    }

    #[test]
    fn pending_lists_submitted_results_only() {
        let (store, assignment, tech) = fixture();
        let conn = store.conn();
        let id = start(conn, assignment, tech, at(1)).unwrap();
        assert!(pending_approvals(conn).unwrap().is_empty());

        submit(conn, id, &submission(json!({})), tech, at(2)).unwrap();
        let pending = pending_approvals(conn).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sample_code, "S-2024-06-10-001");
        assert_eq!(pending[0].tested_by, "Omar Hassan");

        approve(conn, id, tech, at(3)).unwrap();
        assert!(pending_approvals(conn).unwrap().is_empty());
    }

    #[test]
    fn raw_files_attach_to_live_results() {
        let (store, assignment, tech) = fixture();
        let conn = store.conn();
        let id = start(conn, assignment, tech, at(1)).unwrap();
        let file = NewRawFile {
            file_name: "load_curve.csv".into(),
            file_path: "uploads/load_curve.csv".into(),
            file_type: "text/csv".into(),
            file_size: Some(2048),
            description: None,
        };
        insert_raw_file(conn, id, &file, tech, at(2)).unwrap();
        let files = list_raw_files(conn, id).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_size, Some(2048));

        let orphan = insert_raw_file(conn, ResultId(999), &file, tech, at(2));
        assert!(matches!(orphan, Err(StoreError::Referential { .. })));
    }
}

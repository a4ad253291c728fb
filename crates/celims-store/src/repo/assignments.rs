//! Test assignments

use super::{require_live, require_user, soft_delete};
use crate::model::{
    Assignment, AssignmentId, AssignmentStatus, MethodId, NewAssignment, Priority, SampleId,
    UserId,
};
use crate::{Result, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const ASSIGNMENT_COLUMNS: &str = "id, sample_id, test_method_id, assigned_to, assigned_by, \
     assigned_at, due_date, priority, status, notes, is_deleted, updated_at";

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get("id")?,
        sample_id: row.get("sample_id")?,
        test_method_id: row.get("test_method_id")?,
        assigned_to: row.get("assigned_to")?,
        assigned_by: row.get("assigned_by")?,
        assigned_at: row.get("assigned_at")?,
        due_date: row.get("due_date")?,
        priority: row.get("priority")?,
        status: row.get("status")?,
        notes: row.get("notes")?,
        is_deleted: row.get("is_deleted")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Create an assignment in `assigned` state.
///
/// # Errors
///
/// [`StoreError::Referential`] if the sample, test method or either user is
/// missing, or the sample/method is deleted or inactive.
pub fn insert(
    conn: &Connection,
    new: &NewAssignment,
    assigned_by: UserId,
    at: DateTime<Utc>,
) -> Result<AssignmentId> {
    require_live(conn, "sample", "samples", new.sample_id.0)?;
    let method_active = conn
        .query_row(
            "SELECT 1 FROM test_methods WHERE id = ?1 AND is_active = 1",
            [new.test_method_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !method_active {
        return Err(StoreError::Referential {
            entity: "test method",
            id: new.test_method_id.0,
        });
    }
    require_user(conn, new.assigned_to)?;
    require_user(conn, assigned_by)?;

    conn.execute(
        "INSERT INTO test_assignments (sample_id, test_method_id, assigned_to, assigned_by,
                                       assigned_at, due_date, priority, status, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new.sample_id,
            new.test_method_id,
            new.assigned_to,
            assigned_by,
            at,
            new.due_date,
            new.priority,
            AssignmentStatus::Assigned,
            new.notes
        ],
    )?;
    Ok(AssignmentId(conn.last_insert_rowid()))
}

/// Live assignment by id.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn get(conn: &Connection, id: AssignmentId) -> Result<Assignment> {
    conn.query_row(
        &format!("SELECT {ASSIGNMENT_COLUMNS} FROM test_assignments WHERE id = ?1 AND is_deleted = 0"),
        [id],
        assignment_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "test assignment",
        id: id.0,
    })
}

/// Live assignments of a sample, in creation order.
pub fn list_by_sample(conn: &Connection, sample: SampleId) -> Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM test_assignments
         WHERE sample_id = ?1 AND is_deleted = 0 ORDER BY id"
    ))?;
    let rows = stmt.query_map([sample], assignment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Overwrite the status of a live assignment.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn set_status(
    conn: &Connection,
    id: AssignmentId,
    status: AssignmentStatus,
    at: DateTime<Utc>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE test_assignments SET status = ?2, updated_at = ?3 WHERE id = ?1 AND is_deleted = 0",
        params![id, status, at],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "test assignment",
            id: id.0,
        });
    }
    Ok(())
}

/// # Errors
///
/// [`StoreError::NotFound`] if missing or already deleted.
pub fn delete(conn: &Connection, id: AssignmentId, at: DateTime<Utc>) -> Result<()> {
    if soft_delete(conn, "test_assignments", id.0, at)? {
        Ok(())
    } else {
        Err(StoreError::NotFound {
            entity: "test assignment",
            id: id.0,
        })
    }
}

/// Live assignment counts for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub total: u32,
    pub completed: u32,
    pub approved: u32,
}

impl Tally {
    /// Every live assignment approved (and at least one exists)
    #[inline]
    #[must_use]
    pub fn all_approved(&self) -> bool {
        self.total > 0 && self.approved == self.total
    }

    /// Assignments whose test work is done (completed or approved)
    #[inline]
    #[must_use]
    pub fn finished(&self) -> u32 {
        self.completed + self.approved
    }
}

/// Count live assignments of a sample by status.
pub fn tally(conn: &Connection, sample: SampleId) -> Result<Tally> {
    Ok(conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'completed'), 0),
                COALESCE(SUM(status = 'approved'), 0)
         FROM test_assignments WHERE sample_id = ?1 AND is_deleted = 0",
        [sample],
        |row| {
            Ok(Tally {
                total: row.get(0)?,
                completed: row.get(1)?,
                approved: row.get(2)?,
            })
        },
    )?)
}

/// One row of a lab technician's work queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub assignment_id: AssignmentId,
    pub sample_id: SampleId,
    pub sample_code: String,
    pub material_type: String,
    pub test_method_id: MethodId,
    pub test_code: String,
    pub test_name: String,
    pub standard: String,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub status: AssignmentStatus,
}

/// Open assignments (`assigned` or `in_progress`) for `assignee`, urgent
/// first, then by due date with undated work last.
pub fn work_queue(conn: &Connection, assignee: UserId) -> Result<Vec<QueueItem>> {
    let mut stmt = conn.prepare(
        "SELECT ta.id, ta.sample_id, s.sample_code, s.material_type, ta.test_method_id,
                tm.test_code, tm.test_name, tm.standard, ta.due_date, ta.priority, ta.status
         FROM test_assignments ta
         JOIN samples s ON s.id = ta.sample_id AND s.is_deleted = 0
         JOIN test_methods tm ON tm.id = ta.test_method_id
         WHERE ta.assigned_to = ?1 AND ta.is_deleted = 0
           AND ta.status IN ('assigned', 'in_progress')
         ORDER BY CASE ta.priority
                    WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 ELSE 3
                  END,
                  ta.due_date IS NULL, ta.due_date, ta.id",
    )?;
    let rows = stmt.query_map([assignee], |row| {
        Ok(QueueItem {
            assignment_id: row.get(0)?,
            sample_id: row.get(1)?,
            sample_code: row.get(2)?,
            material_type: row.get(3)?,
            test_method_id: row.get(4)?,
            test_code: row.get(5)?,
            test_name: row.get(6)?,
            standard: row.get(7)?,
            due_date: row.get(8)?,
            priority: row.get(9)?,
            status: row.get(10)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::reference::{insert_method, insert_project, insert_user, NewMethod, NewProject};
    use crate::repo::samples;
    use crate::{NewSample, ProjectStatus, Role, Store};
    use serde_json::json;

    struct Fixture {
        store: Store,
        sample: SampleId,
        method: MethodId,
        tech: UserId,
        supervisor: UserId,
    }

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_718_000_000, 0).unwrap_or_default()
    }

    fn fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();
        let tech = insert_user(conn, "omar", "Omar", Role::LabTech, None, at()).unwrap();
        let supervisor = insert_user(conn, "sara", "Sara", Role::Supervisor, None, at()).unwrap();
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
            at(),
        )
        .unwrap();
        let method = insert_method(
            conn,
            &NewMethod {
                code: "ASTM-D4318",
                name: "Atterberg Limits",
                standard: "ASTM D4318",
                material_type: "Soil",
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
                material_type: "Soil".into(),
                ..NewSample::default()
            },
            tech,
            at(),
        )
        .unwrap();
        Fixture {
            store,
            sample,
            method,
            tech,
            supervisor,
        }
    }

    fn assign(f: &Fixture, priority: Priority, due: Option<NaiveDate>) -> AssignmentId {
        insert(
            f.store.conn(),
            &NewAssignment {
                sample_id: f.sample,
                test_method_id: f.method,
                assigned_to: f.tech,
                due_date: due,
                priority,
                notes: None,
            },
            f.supervisor,
            at(),
        )
        .unwrap()
    }

    #[test]
    fn tally_ignores_deleted_assignments() {
        let f = fixture();
        let conn = f.store.conn();
        let a = assign(&f, Priority::Normal, None);
        let b = assign(&f, Priority::Normal, None);
        let c = assign(&f, Priority::Normal, None);
        set_status(conn, a, AssignmentStatus::Approved, at()).unwrap();
        set_status(conn, b, AssignmentStatus::Completed, at()).unwrap();
        assert_eq!(
            tally(conn, f.sample).unwrap(),
            Tally {
                total: 3,
                completed: 1,
                approved: 1
            }
        );

        delete(conn, c, at()).unwrap();
        set_status(conn, b, AssignmentStatus::Approved, at()).unwrap();
        let t = tally(conn, f.sample).unwrap();
        assert!(t.all_approved());
        assert_eq!(t.finished(), 2);
    }

    #[test]
    fn empty_sample_is_not_all_approved() {
        let f = fixture();
        assert!(!tally(f.store.conn(), f.sample).unwrap().all_approved());
    }

    #[test]
    fn queue_orders_by_priority_then_due_date() {
        let f = fixture();
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day);
        let low = assign(&f, Priority::Low, d(1));
        let normal_late = assign(&f, Priority::Normal, d(20));
        let normal_undated = assign(&f, Priority::Normal, None);
        let normal_early = assign(&f, Priority::Normal, d(12));
        let urgent = assign(&f, Priority::Urgent, None);
        let done = assign(&f, Priority::Urgent, d(1));
        set_status(f.store.conn(), done, AssignmentStatus::Completed, at()).unwrap();

        let order: Vec<_> = work_queue(f.store.conn(), f.tech)
            .unwrap()
            .into_iter()
            .map(|item| item.assignment_id)
            .collect();
        assert_eq!(order, vec![urgent, normal_early, normal_late, normal_undated, low]);
    }

    #[test]
    fn inactive_methods_cannot_be_assigned() {
        let f = fixture();
        f.store
            .conn()
            .execute("UPDATE test_methods SET is_active = 0 WHERE id = ?1", [f.method])
            .unwrap();
        let err = insert(
            f.store.conn(),
            &NewAssignment {
                sample_id: f.sample,
                test_method_id: f.method,
                assigned_to: f.tech,
                due_date: None,
                priority: Priority::High,
                notes: None,
            },
            f.supervisor,
            at(),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Referential { entity: "test method", .. }));
    }
}

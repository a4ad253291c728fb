//! Database schema

use crate::Result;
use rusqlite::Connection;

/// Schema version recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Tables, indexes and append-only triggers.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('field_tech', 'supervisor', 'lab_tech', 'manager')),
    email TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_code TEXT NOT NULL UNIQUE,
    project_name TEXT NOT NULL,
    client_name TEXT,
    location TEXT,
    start_date TEXT,
    end_date TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'archived')),
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_code TEXT NOT NULL UNIQUE,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    material_type TEXT NOT NULL,
    sample_location TEXT,
    quantity REAL,
    quantity_unit TEXT,
    collection_date TEXT,
    condition TEXT,
    priority TEXT NOT NULL DEFAULT 'normal' CHECK (priority IN ('low', 'normal', 'high', 'urgent')),
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'registered'
        CHECK (status IN ('registered', 'assigned', 'in_progress', 'completed', 'approved', 'archived')),
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    created_by INTEGER NOT NULL REFERENCES users(id),
    updated_at TEXT,
    updated_by INTEGER REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_samples_project ON samples(project_id);

CREATE TABLE IF NOT EXISTS test_methods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_code TEXT NOT NULL UNIQUE,
    test_name TEXT NOT NULL,
    standard TEXT NOT NULL,
    material_type TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '{}',
    calculation_formula TEXT,
    typical_duration INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS equipment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    equipment_code TEXT NOT NULL UNIQUE,
    equipment_name TEXT NOT NULL,
    manufacturer TEXT,
    model TEXT,
    serial_number TEXT,
    calibration_date TEXT,
    calibration_due_date TEXT,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'maintenance', 'calibration', 'retired')),
    location TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS test_assignments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id INTEGER NOT NULL REFERENCES samples(id),
    test_method_id INTEGER NOT NULL REFERENCES test_methods(id),
    assigned_to INTEGER NOT NULL REFERENCES users(id),
    assigned_by INTEGER NOT NULL REFERENCES users(id),
    assigned_at TEXT NOT NULL,
    due_date TEXT,
    priority TEXT NOT NULL DEFAULT 'normal' CHECK (priority IN ('low', 'normal', 'high', 'urgent')),
    status TEXT NOT NULL DEFAULT 'assigned'
        CHECK (status IN ('assigned', 'in_progress', 'completed', 'approved', 'rejected')),
    notes TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_assignments_sample ON test_assignments(sample_id);
CREATE INDEX IF NOT EXISTS idx_assignments_assignee ON test_assignments(assigned_to, status);

CREATE TABLE IF NOT EXISTS test_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    assignment_id INTEGER NOT NULL REFERENCES test_assignments(id),
    tested_by INTEGER NOT NULL REFERENCES users(id),
    test_started_at TEXT,
    test_completed_at TEXT,
    equipment_id INTEGER REFERENCES equipment(id),
    test_parameters TEXT,
    raw_data TEXT,
    calculated_results TEXT,
    result_value REAL,
    result_unit TEXT,
    pass_fail TEXT CHECK (pass_fail IS NULL OR pass_fail IN ('pass', 'fail', 'na')),
    observations TEXT,
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'submitted', 'approved', 'rejected')),
    approved_by INTEGER REFERENCES users(id),
    approved_at TEXT,
    rejection_reason TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT
);

-- one live result per assignment
CREATE UNIQUE INDEX IF NOT EXISTS idx_results_live_assignment
    ON test_results(assignment_id) WHERE is_deleted = 0;

CREATE TABLE IF NOT EXISTS raw_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_result_id INTEGER NOT NULL REFERENCES test_results(id),
    file_name TEXT NOT NULL CHECK (length(trim(file_name)) > 0),
    file_path TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER,
    uploaded_by INTEGER NOT NULL REFERENCES users(id),
    uploaded_at TEXT NOT NULL,
    description TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    record_id INTEGER NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('INSERT', 'UPDATE', 'DELETE', 'APPROVE', 'REJECT')),
    old_values TEXT,
    new_values TEXT,
    changed_by INTEGER NOT NULL REFERENCES users(id),
    changed_at TEXT NOT NULL,
    request_id TEXT,
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_audit_record ON audit_log(table_name, record_id);

CREATE TABLE IF NOT EXISTS chain_of_custody (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id INTEGER NOT NULL REFERENCES samples(id),
    custody_at TEXT NOT NULL,
    from_person INTEGER REFERENCES users(id),
    to_person INTEGER NOT NULL REFERENCES users(id),
    location TEXT,
    purpose TEXT,
    condition TEXT,
    notes TEXT
);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;

CREATE TRIGGER IF NOT EXISTS custody_no_update BEFORE UPDATE ON chain_of_custody
BEGIN SELECT RAISE(ABORT, 'chain_of_custody is append-only'); END;

CREATE TRIGGER IF NOT EXISTS custody_no_delete BEFORE DELETE ON chain_of_custody
BEGIN SELECT RAISE(ABORT, 'chain_of_custody is append-only'); END;
";

/// Connection-level settings applied on every open.
pub(crate) fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

/// Create all tables if missing and stamp the schema version.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tracing::debug!(version = SCHEMA_VERSION, "schema migrated");
    Ok(())
}

/// Current `user_version` of the database.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read.
pub fn version(conn: &Connection) -> Result<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = migrated();
        migrate(&conn).unwrap();
        assert_eq!(version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn creates_every_table() {
        let conn = migrated();
        for table in [
            "users",
            "projects",
            "samples",
            "test_methods",
            "equipment",
            "test_assignments",
            "test_results",
            "raw_files",
            "audit_log",
            "chain_of_custody",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn check_constraints_reject_unknown_roles() {
        let conn = migrated();
        let err = conn
            .execute(
                "INSERT INTO users (username, full_name, role, created_at) VALUES ('x', 'X', 'admin', '')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("CHECK constraint failed"));
    }
}

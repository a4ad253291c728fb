//! Users, projects, test methods and equipment

use super::require_live;
use crate::model::{
    Equipment, EquipmentId, EquipmentStatus, MethodId, Project, ProjectId, ProjectStatus, Role,
    TestMethod, User, UserId,
};
use crate::{Result, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

const USER_COLUMNS: &str = "id, username, full_name, role, email, is_active";

const PROJECT_COLUMNS: &str = "id, project_code, project_name, client_name, location, \
     start_date, end_date, status, is_deleted";

const METHOD_COLUMNS: &str = "id, test_code, test_name, standard, material_type, parameters, \
     calculation_formula, typical_duration, is_active";

const EQUIPMENT_COLUMNS: &str = "id, equipment_code, equipment_name, manufacturer, model, \
     serial_number, calibration_date, calibration_due_date, status, location, is_deleted";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        full_name: row.get("full_name")?,
        role: row.get("role")?,
        email: row.get("email")?,
        is_active: row.get("is_active")?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        code: row.get("project_code")?,
        name: row.get("project_name")?,
        client_name: row.get("client_name")?,
        location: row.get("location")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        status: row.get("status")?,
        is_deleted: row.get("is_deleted")?,
    })
}

fn method_from_row(row: &Row<'_>) -> rusqlite::Result<TestMethod> {
    Ok(TestMethod {
        id: row.get("id")?,
        code: row.get("test_code")?,
        name: row.get("test_name")?,
        standard: row.get("standard")?,
        material_type: row.get("material_type")?,
        parameters: row.get("parameters")?,
        calculation_formula: row.get("calculation_formula")?,
        typical_duration: row.get("typical_duration")?,
        is_active: row.get("is_active")?,
    })
}

fn equipment_from_row(row: &Row<'_>) -> rusqlite::Result<Equipment> {
    Ok(Equipment {
        id: row.get("id")?,
        code: row.get("equipment_code")?,
        name: row.get("equipment_name")?,
        manufacturer: row.get("manufacturer")?,
        model: row.get("model")?,
        serial_number: row.get("serial_number")?,
        calibration_date: row.get("calibration_date")?,
        calibration_due_date: row.get("calibration_due_date")?,
        status: row.get("status")?,
        location: row.get("location")?,
        is_deleted: row.get("is_deleted")?,
    })
}

// ---- users ----

/// Insert a user account.
///
/// # Errors
///
/// [`StoreError::Duplicate`] if the username is taken.
pub fn insert_user(
    conn: &Connection,
    username: &str,
    full_name: &str,
    role: Role,
    email: Option<&str>,
    at: DateTime<Utc>,
) -> Result<UserId> {
    conn.execute(
        "INSERT INTO users (username, full_name, role, email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![username, full_name, role, email, at],
    )
    .map_err(|e| StoreError::from(e).on_unique("user", username))?;
    Ok(UserId(conn.last_insert_rowid()))
}

/// # Errors
///
/// [`StoreError::NotFound`] if no such user exists.
pub fn get_user(conn: &Connection, id: UserId) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "user",
        id: id.0,
    })
}

pub fn find_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            [username],
            user_from_row,
        )
        .optional()?)
}

/// Active users holding `role`, by name.
pub fn list_users_by_role(conn: &Connection, role: Role) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE role = ?1 AND is_active = 1 ORDER BY full_name"
    ))?;
    let rows = stmt.query_map([role], user_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn set_user_active(conn: &Connection, id: UserId, active: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?2 WHERE id = ?1",
        params![id, active],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "user",
            id: id.0,
        });
    }
    Ok(())
}

// ---- projects ----

/// Fields for a new project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub client_name: Option<&'a str>,
    pub location: Option<&'a str>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ProjectStatus,
}

/// # Errors
///
/// [`StoreError::Duplicate`] if the project code is taken.
pub fn insert_project(conn: &Connection, project: &NewProject<'_>, at: DateTime<Utc>) -> Result<ProjectId> {
    conn.execute(
        "INSERT INTO projects (project_code, project_name, client_name, location,
                               start_date, end_date, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            project.code,
            project.name,
            project.client_name,
            project.location,
            project.start_date,
            project.end_date,
            project.status,
            at
        ],
    )
    .map_err(|e| StoreError::from(e).on_unique("project", project.code))?;
    Ok(ProjectId(conn.last_insert_rowid()))
}

/// Live project by id.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn get_project(conn: &Connection, id: ProjectId) -> Result<Project> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1 AND is_deleted = 0"),
        [id],
        project_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "project",
        id: id.0,
    })
}

/// Live projects open for sample registration.
pub fn list_active_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects
         WHERE status = 'active' AND is_deleted = 0 ORDER BY project_code"
    ))?;
    let rows = stmt.query_map([], project_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn set_project_status(conn: &Connection, id: ProjectId, status: ProjectStatus) -> Result<()> {
    require_live(conn, "project", "projects", id.0)?;
    conn.execute(
        "UPDATE projects SET status = ?2 WHERE id = ?1",
        params![id, status],
    )?;
    Ok(())
}

// ---- test methods ----

/// Fields for a catalog test method
#[derive(Debug, Clone, PartialEq)]
pub struct NewMethod<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub standard: &'a str,
    pub material_type: &'a str,
    pub parameters: Value,
    pub calculation_formula: Option<&'a str>,
    pub typical_duration: Option<i64>,
}

/// # Errors
///
/// [`StoreError::Duplicate`] if the test code is taken.
pub fn insert_method(conn: &Connection, method: &NewMethod<'_>) -> Result<MethodId> {
    conn.execute(
        "INSERT INTO test_methods (test_code, test_name, standard, material_type, parameters,
                                   calculation_formula, typical_duration)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            method.code,
            method.name,
            method.standard,
            method.material_type,
            method.parameters,
            method.calculation_formula,
            method.typical_duration
        ],
    )
    .map_err(|e| StoreError::from(e).on_unique("test method", method.code))?;
    Ok(MethodId(conn.last_insert_rowid()))
}

/// # Errors
///
/// [`StoreError::NotFound`] if no such method exists.
pub fn get_method(conn: &Connection, id: MethodId) -> Result<TestMethod> {
    conn.query_row(
        &format!("SELECT {METHOD_COLUMNS} FROM test_methods WHERE id = ?1"),
        [id],
        method_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "test method",
        id: id.0,
    })
}

/// Active methods, optionally restricted to one material type.
pub fn list_methods(conn: &Connection, material_type: Option<&str>) -> Result<Vec<TestMethod>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {METHOD_COLUMNS} FROM test_methods
         WHERE is_active = 1 AND (?1 IS NULL OR material_type = ?1)
         ORDER BY test_code"
    ))?;
    let rows = stmt.query_map([material_type], method_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

// ---- equipment ----

/// Fields for a laboratory instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEquipment<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub manufacturer: Option<&'a str>,
    pub model: Option<&'a str>,
    pub serial_number: Option<&'a str>,
    pub calibration_date: Option<NaiveDate>,
    pub calibration_due_date: Option<NaiveDate>,
    pub status: EquipmentStatus,
    pub location: Option<&'a str>,
}

/// # Errors
///
/// [`StoreError::Duplicate`] if the equipment code is taken.
pub fn insert_equipment(conn: &Connection, eq: &NewEquipment<'_>) -> Result<EquipmentId> {
    conn.execute(
        "INSERT INTO equipment (equipment_code, equipment_name, manufacturer, model, serial_number,
                                calibration_date, calibration_due_date, status, location)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            eq.code,
            eq.name,
            eq.manufacturer,
            eq.model,
            eq.serial_number,
            eq.calibration_date,
            eq.calibration_due_date,
            eq.status,
            eq.location
        ],
    )
    .map_err(|e| StoreError::from(e).on_unique("equipment", eq.code))?;
    Ok(EquipmentId(conn.last_insert_rowid()))
}

/// Live instrument by id.
///
/// # Errors
///
/// [`StoreError::NotFound`] if missing or soft-deleted.
pub fn get_equipment(conn: &Connection, id: EquipmentId) -> Result<Equipment> {
    conn.query_row(
        &format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = ?1 AND is_deleted = 0"),
        [id],
        equipment_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound {
        entity: "equipment",
        id: id.0,
    })
}

pub fn set_equipment_status(conn: &Connection, id: EquipmentId, status: EquipmentStatus) -> Result<()> {
    require_live(conn, "equipment", "equipment", id.0)?;
    conn.execute(
        "UPDATE equipment SET status = ?2 WHERE id = ?1",
        params![id, status],
    )?;
    Ok(())
}

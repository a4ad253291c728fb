//! Reference data for a fresh laboratory database

use crate::model::{EquipmentStatus, ProjectStatus, Role};
use crate::repo::reference::{
    insert_equipment, insert_method, insert_project, insert_user, NewEquipment, NewMethod,
    NewProject,
};
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde_json::json;

const USERS: [(&str, &str, Role); 4] = [
    ("ahmed", "Ahmed Mohamed", Role::FieldTech),
    ("sara", "Sara Ali", Role::Supervisor),
    ("omar", "Omar Hassan", Role::LabTech),
    ("fatima", "Fatima Abdullah", Role::Manager),
];

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Seed users, projects, test methods and equipment.
///
/// Does nothing and returns `false` when the database already has users.
///
/// # Errors
///
/// Returns an error if any insert fails; run it inside
/// [`Store::write`](crate::Store::write) so a failure leaves nothing behind.
pub fn seed_reference_data(conn: &Connection, at: DateTime<Utc>) -> Result<bool> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if existing > 0 {
        tracing::debug!(users = existing, "reference data already present");
        return Ok(false);
    }

    for (username, full_name, role) in USERS {
        let email = format!("{username}@celims.com");
        insert_user(conn, username, full_name, role, Some(&email), at)?;
    }

    for project in [
        NewProject {
            code: "PRJ-2024-001",
            name: "Highway A7 Expansion",
            client_name: Some("Ministry of Transport"),
            location: Some("Riyadh-Dammam"),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 12, 31),
            status: ProjectStatus::Active,
        },
        NewProject {
            code: "PRJ-2024-002",
            name: "King Abdullah Bridge",
            client_name: Some("Royal Commission"),
            location: Some("Jeddah"),
            start_date: date(2024, 2, 1),
            end_date: date(2024, 11, 30),
            status: ProjectStatus::Active,
        },
    ] {
        insert_project(conn, &project, at)?;
    }

    for method in [
        NewMethod {
            code: "ASTM-D5",
            name: "Penetration Test",
            standard: "ASTM D5",
            material_type: "Asphalt Binder",
            parameters: json!({"temperature": 25, "load": 100, "time": 5}),
            calculation_formula: Some("average(readings)"),
            typical_duration: Some(60),
        },
        NewMethod {
            code: "ASTM-C39",
            name: "Compressive Strength",
            standard: "ASTM C39",
            material_type: "Concrete",
            parameters: json!({"diameter": 150, "height": 300}),
            calculation_formula: Some("load / area"),
            typical_duration: Some(30),
        },
        NewMethod {
            code: "ASTM-D1557",
            name: "Modified Proctor",
            standard: "ASTM D1557",
            material_type: "Soil",
            parameters: json!({"layers": 5, "blows": 25}),
            calculation_formula: Some("max_dry_density"),
            typical_duration: Some(120),
        },
        NewMethod {
            code: "ASTM-D2166",
            name: "Unconfined Compression",
            standard: "ASTM D2166",
            material_type: "Soil",
            parameters: json!({"strain_rate": 1}),
            calculation_formula: Some("qu = P/A"),
            typical_duration: Some(45),
        },
        NewMethod {
            code: "ASTM-D4318",
            name: "Atterberg Limits",
            standard: "ASTM D4318",
            material_type: "Soil",
            parameters: json!({}),
            calculation_formula: Some("PI = LL - PL"),
            typical_duration: Some(90),
        },
        NewMethod {
            code: "ASTM-D1883",
            name: "California Bearing Ratio",
            standard: "ASTM D1883",
            material_type: "Soil",
            parameters: json!({"surcharge": 4.54, "soaked": true}),
            calculation_formula: Some("max(CBR@2.5mm, CBR@5mm)"),
            typical_duration: Some(96),
        },
    ] {
        insert_method(conn, &method)?;
    }

    for eq in [
        NewEquipment {
            code: "EQ-001",
            name: "Penetrometer",
            manufacturer: Some("Controls Group"),
            model: Some("Model 2020"),
            serial_number: Some("SN-12345"),
            calibration_date: date(2024, 1, 15),
            calibration_due_date: date(2025, 1, 15),
            status: EquipmentStatus::Active,
            location: Some("Asphalt Lab"),
        },
        NewEquipment {
            code: "EQ-002",
            name: "Compression Machine",
            manufacturer: Some("ELE International"),
            model: Some("ADR-3000"),
            serial_number: Some("SN-67890"),
            calibration_date: date(2024, 2, 1),
            calibration_due_date: date(2025, 2, 1),
            status: EquipmentStatus::Active,
            location: Some("Concrete Lab"),
        },
        NewEquipment {
            code: "EQ-003",
            name: "Proctor Mold",
            manufacturer: Some("Humboldt"),
            model: Some("H-4140"),
            serial_number: Some("SN-11223"),
            calibration_date: date(2024, 1, 20),
            calibration_due_date: date(2025, 1, 20),
            status: EquipmentStatus::Active,
            location: Some("Soil Lab"),
        },
    ] {
        insert_equipment(conn, &eq)?;
    }

    tracing::info!("seeded reference data");
    Ok(true)
}

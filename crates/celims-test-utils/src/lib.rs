//! Test fixtures for CE-LIMS
//!
//! A seeded in-memory lab, actors for the seeded users, and canned readings.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use celims_calc::Input;
use celims_store::repo::reference;
use celims_store::{
    Assignment, EquipmentId, MethodId, NewAssignment, NewSample, Priority, ProjectId, Role,
    Sample, UserId,
};
use celims_workflow::{ActionContext, Actor, FinishTest, Lab, LabConfig};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

/// Fixed action clock: 2024-06-10 09:00:00 UTC
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_718_010_000, 0).unwrap()
}

/// In-memory lab with the standard reference data
pub fn seeded_lab() -> Lab {
    Lab::open(&LabConfig::default()).unwrap()
}

/// In-memory lab with no users, projects or methods
pub fn empty_lab() -> Lab {
    Lab::open(&LabConfig::default().with_seed_reference_data(false)).unwrap()
}

pub fn actor(lab: &Lab, username: &str) -> Actor {
    let store = lab.store();
    let user = reference::find_user_by_username(store.conn(), username)
        .unwrap()
        .unwrap_or_else(|| panic!("no user {username}"));
    Actor::new(user.id, user.role)
}

pub fn ctx(actor: Actor) -> ActionContext {
    ActionContext::new(actor).at(now())
}

pub fn field_tech(lab: &Lab) -> ActionContext {
    ctx(actor(lab, "ahmed"))
}

pub fn supervisor(lab: &Lab) -> ActionContext {
    ctx(actor(lab, "sara"))
}

pub fn lab_tech(lab: &Lab) -> ActionContext {
    ctx(actor(lab, "omar"))
}

pub fn manager(lab: &Lab) -> ActionContext {
    ctx(actor(lab, "fatima"))
}

/// Add another user and return a context acting as them
pub fn add_user(lab: &Lab, username: &str, role: Role) -> ActionContext {
    let id: UserId = lab
        .store()
        .write(|tx| reference::insert_user(tx, username, username, role, None, now()))
        .unwrap();
    ctx(Actor::new(id, role))
}

pub fn project(lab: &Lab) -> ProjectId {
    let store = lab.store();
    reference::list_active_projects(store.conn()).unwrap()[0].id
}

pub fn method(lab: &Lab, code: &str) -> MethodId {
    let store = lab.store();
    reference::list_methods(store.conn(), None)
        .unwrap()
        .into_iter()
        .find(|m| m.code == code)
        .unwrap_or_else(|| panic!("no method {code}"))
        .id
}

pub fn equipment(lab: &Lab, code: &str) -> EquipmentId {
    lab.store()
        .conn()
        .query_row(
            "SELECT id FROM equipment WHERE equipment_code = ?1",
            [code],
            |row| row.get(0),
        )
        .unwrap()
}

pub fn new_sample(project: ProjectId, material_type: &str) -> NewSample {
    NewSample {
        project_id: project,
        material_type: material_type.to_string(),
        location: Some("Station 12+400".to_string()),
        quantity: Some(25.0),
        quantity_unit: Some("kg".to_string()),
        condition: Some("Sealed".to_string()),
        ..NewSample::default()
    }
}

/// Register a sample of `material_type` as the field technician
pub fn register(lab: &Lab, material_type: &str) -> Sample {
    lab.register_sample(&field_tech(lab), &new_sample(project(lab), material_type))
        .unwrap()
}

/// Assign `method_code` on `sample` to the seeded lab technician
pub fn assign(lab: &Lab, sample: &Sample, method_code: &str) -> Assignment {
    let new = NewAssignment {
        sample_id: sample.id,
        test_method_id: method(lab, method_code),
        assigned_to: actor(lab, "omar").id,
        due_date: None,
        priority: Priority::Normal,
        notes: None,
    };
    lab.assign_test(&supervisor(lab), &new).unwrap()
}

pub fn input(value: Value) -> Input {
    value.as_object().cloned().unwrap_or_default()
}

pub fn penetration_readings() -> Input {
    input(json!({"readings": [65, 67, 66]}))
}

pub fn compressive_input() -> Input {
    input(json!({"diameter": 150, "max_load": 450, "age": 28}))
}

pub fn atterberg_input() -> Input {
    input(json!({"liquid_limit": 45, "plastic_limit": 28}))
}

pub fn cbr_input() -> Input {
    input(json!({"load_2_5mm": 1.5, "load_5mm": 2.6}))
}

pub fn finish_with(readings: Input) -> FinishTest {
    FinishTest {
        readings,
        ..FinishTest::default()
    }
}

//! Permission checks, validation and rollback of failed actions

use celims_store::repo::{reference, samples};
use celims_store::{
    AssignmentStatus, NewAssignment, NewRawFile, Priority, ProjectStatus, ResultStatus, Role,
    SampleStatus,
};
use celims_test_utils::*;
use celims_workflow::{Actor, Lab, LabConfig, WorkflowError};
use pretty_assertions::assert_eq;
use serde_json::json;

fn audit_rows(lab: &Lab) -> usize {
    lab.recent_audit(10_000).unwrap().len()
}

#[test]
fn only_field_technicians_register_samples() {
    let lab = seeded_lab();
    let err = lab
        .register_sample(&supervisor(&lab), &new_sample(project(&lab), "Soil"))
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Forbidden {
            role: Role::Supervisor,
            ..
        }
    ));
    assert!(err.is_user_error());
}

#[test]
fn claimed_role_must_match_the_user_record() {
    let lab = seeded_lab();
    let omar = actor(&lab, "omar");
    let impostor = ctx(Actor::new(omar.id, Role::FieldTech));
    let err = lab
        .register_sample(&impostor, &new_sample(project(&lab), "Soil"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { .. }));

    let deactivated = add_user(&lab, "former", Role::FieldTech);
    lab.store()
        .write(|tx| reference::set_user_active(tx, deactivated.actor.id, false))
        .unwrap();
    let err = lab
        .register_sample(&deactivated, &new_sample(project(&lab), "Soil"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
}

#[test]
fn registration_requires_an_active_project() {
    let lab = seeded_lab();
    let project = project(&lab);
    lab.store()
        .write(|tx| reference::set_project_status(tx, project, ProjectStatus::Completed))
        .unwrap();
    let err = lab
        .register_sample(&field_tech(&lab), &new_sample(project, "Soil"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { field: "project_id", .. }));

    let err = lab
        .register_sample(
            &field_tech(&lab),
            &new_sample(celims_store::ProjectId(999), "Soil"),
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Referential { entity: "project", id: 999 }));
    assert_eq!(audit_rows(&lab), 0);
}

#[test]
fn sample_code_collision_is_retried_with_a_fresh_sequence() {
    let lab = seeded_lab();
    let creator = field_tech(&lab).actor.id;
    let taken = new_sample(project(&lab), "Soil");
    lab.store()
        .write(|tx| samples::insert(tx, "S-2024-06-10-002", &taken, creator, now()))
        .unwrap();

    let sample = register(&lab, "Soil");
    assert_eq!(sample.code, "S-2024-06-10-003");
}

#[test]
fn sample_code_retries_are_bounded() {
    let lab = Lab::open(&LabConfig::default().with_sample_code_retries(0)).unwrap();
    let creator = field_tech(&lab).actor.id;
    let project = project(&lab);
    lab.store()
        .write(|tx| samples::insert(tx, "S-2024-06-10-002", &new_sample(project, "Soil"), creator, now()))
        .unwrap();

    let err = lab
        .register_sample(&field_tech(&lab), &new_sample(project, "Soil"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SampleCodeExhausted { attempts: 1 }));
    assert!(err.is_retryable());
}

#[test]
fn assignment_checks_material_and_assignee() {
    let lab = seeded_lab();
    let concrete = register(&lab, "Concrete");
    let mut new = NewAssignment {
        sample_id: concrete.id,
        test_method_id: method(&lab, "ASTM-D4318"),
        assigned_to: actor(&lab, "omar").id,
        due_date: None,
        priority: Priority::High,
        notes: None,
    };
    let err = lab.assign_test(&supervisor(&lab), &new).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { field: "test_method_id", .. }));

    new.test_method_id = method(&lab, "ASTM-C39");
    new.assigned_to = actor(&lab, "ahmed").id;
    let err = lab.assign_test(&supervisor(&lab), &new).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { field: "assigned_to", .. }));

    let err = lab.assign_test(&lab_tech(&lab), &new).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
    assert_eq!(lab.sample(concrete.id).unwrap().status, SampleStatus::Registered);
}

#[test]
fn only_the_assignee_runs_the_test() {
    let lab = seeded_lab();
    let sample = register(&lab, "Soil");
    let assignment = assign(&lab, &sample, "ASTM-D4318");
    let other = add_user(&lab, "khalid", Role::LabTech);

    let err = lab.start_test(&other, assignment.id).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { .. }));

    // finishing before starting skips a step
    let err = lab
        .finish_test(&lab_tech(&lab), assignment.id, &finish_with(atterberg_input()))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalTransition { .. }));
}

#[test]
fn failed_calculation_leaves_everything_untouched() {
    let lab = seeded_lab();
    let sample = register(&lab, "Asphalt Binder");
    let assignment = assign(&lab, &sample, "ASTM-D5");
    let tech = lab_tech(&lab);
    lab.start_test(&tech, assignment.id).unwrap();
    let rows = audit_rows(&lab);

    let err = lab
        .finish_test(&tech, assignment.id, &finish_with(input(json!({"readings": [60, 61]}))))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Calculation(ref e) if e.reason == "At least 3 readings required"));

    let mut manual = finish_with(penetration_readings());
    manual.result_value = Some(0.0);
    let err = lab.finish_test(&tech, assignment.id, &manual).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { field: "result_value", .. }));

    let result = lab.result_for_assignment(assignment.id).unwrap().unwrap();
    assert_eq!(result.status, ResultStatus::Draft);
    assert_eq!(result.raw_data, None);
    assert_eq!(
        lab.assignments_for_sample(sample.id).unwrap()[0].status,
        AssignmentStatus::InProgress
    );
    assert_eq!(audit_rows(&lab), rows);
}

#[test]
fn a_late_failure_rolls_back_the_whole_action() {
    let lab = seeded_lab();
    let sample = register(&lab, "Asphalt Binder");
    let assignment = assign(&lab, &sample, "ASTM-D5");
    let tech = lab_tech(&lab);
    lab.start_test(&tech, assignment.id).unwrap();
    let rows = audit_rows(&lab);

    let mut finish = finish_with(penetration_readings());
    finish.raw_files = vec![
        NewRawFile {
            file_name: "dial.csv".into(),
            file_path: "uploads/dial.csv".into(),
            file_type: "text/csv".into(),
            file_size: Some(120),
            description: None,
        },
        NewRawFile {
            file_name: " ".into(),
            file_path: "uploads/blank".into(),
            file_type: "text/plain".into(),
            file_size: None,
            description: None,
        },
    ];
    let err = lab.finish_test(&tech, assignment.id, &finish).unwrap_err();
    assert!(matches!(err, WorkflowError::Store(_)));

    let result = lab.result_for_assignment(assignment.id).unwrap().unwrap();
    assert_eq!(result.status, ResultStatus::Draft);
    assert!(lab.raw_files(result.id).unwrap().is_empty());
    assert_eq!(lab.sample(sample.id).unwrap().status, SampleStatus::InProgress);
    assert_eq!(audit_rows(&lab), rows);

    finish.raw_files.pop();
    let finished = lab.finish_test(&tech, assignment.id, &finish).unwrap();
    assert_eq!(lab.raw_files(finished.result.id).unwrap().len(), 1);
}

#[test]
fn inactive_equipment_is_refused() {
    let lab = seeded_lab();
    let sample = register(&lab, "Concrete");
    let assignment = assign(&lab, &sample, "ASTM-C39");
    let tech = lab_tech(&lab);
    lab.start_test(&tech, assignment.id).unwrap();
    let press = equipment(&lab, "EQ-002");
    lab.store()
        .write(|tx| {
            reference::set_equipment_status(tx, press, celims_store::EquipmentStatus::Calibration)
        })
        .unwrap();

    let mut finish = finish_with(compressive_input());
    finish.equipment_id = Some(press);
    let err = lab.finish_test(&tech, assignment.id, &finish).unwrap_err();
    assert!(matches!(err, WorkflowError::Referential { entity: "equipment", .. }));
}

#[test]
fn methods_without_a_calculator_need_a_manual_value() {
    let lab = seeded_lab();
    let method = lab
        .store()
        .write(|tx| {
            reference::insert_method(
                tx,
                &reference::NewMethod {
                    code: "BS-1377-2",
                    name: "Moisture Content",
                    standard: "BS 1377",
                    material_type: "Soil",
                    parameters: json!({}),
                    calculation_formula: None,
                    typical_duration: None,
                },
            )
        })
        .unwrap();
    let sample = register(&lab, "Soil");
    let assignment = assign(&lab, &sample, "BS-1377-2");
    assert_eq!(assignment.test_method_id, method);
    let tech = lab_tech(&lab);
    lab.start_test(&tech, assignment.id).unwrap();

    let readings = input(json!({"wet_mass": 120.4, "dry_mass": 104.9}));
    let err = lab
        .finish_test(&tech, assignment.id, &finish_with(readings.clone()))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { field: "result_value", ref reason } if reason.contains("BS 1377")));

    for bogus in [f64::INFINITY, f64::NAN, -3.0] {
        let mut manual = finish_with(readings.clone());
        manual.result_value = Some(bogus);
        let err = lab.finish_test(&tech, assignment.id, &manual).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { field: "result_value", .. }));
    }

    let mut manual = finish_with(readings);
    manual.result_value = Some(14.78);
    manual.result_unit = Some("%".into());
    let finished = lab.finish_test(&tech, assignment.id, &manual).unwrap();
    assert!(finished.outcome.manual_entry_required());
    assert_eq!(finished.result.result_value, Some(14.78));
    assert_eq!(finished.result.pass_fail, None);
    assert_eq!(
        finished.result.calculated_results.unwrap()["manual_entry_required"],
        json!(true)
    );
}

#[test]
fn closed_samples_take_no_new_assignments() {
    let lab = seeded_lab();
    let sample = register(&lab, "Asphalt Binder");
    let assignment = assign(&lab, &sample, "ASTM-D5");
    let tech = lab_tech(&lab);
    lab.start_test(&tech, assignment.id).unwrap();
    let finished = lab
        .finish_test(&tech, assignment.id, &finish_with(penetration_readings()))
        .unwrap();
    lab.approve_result(&manager(&lab), finished.result.id).unwrap();

    let new = NewAssignment {
        sample_id: sample.id,
        test_method_id: method(&lab, "ASTM-D5"),
        assigned_to: tech.actor.id,
        due_date: None,
        priority: Priority::Normal,
        notes: None,
    };
    let err = lab.assign_test(&supervisor(&lab), &new).unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalTransition { entity: "sample", .. }));

    let err = lab.reject_result(&manager(&lab), finished.result.id, "late").unwrap_err();
    assert!(matches!(err, WorkflowError::IllegalTransition { .. }));
}

#[test]
fn custody_handoffs_extend_the_chain() {
    let lab = seeded_lab();
    let sample = register(&lab, "Soil");
    let courier = field_tech(&lab);
    let receiver = lab_tech(&lab);
    let before = audit_rows(&lab);
    let handoff = lab.record_custody(
        &courier,
        &celims_store::NewCustody {
            sample_id: sample.id,
            from_person: Some(courier.actor.id),
            to_person: receiver.actor.id,
            location: Some("Soil Lab".into()),
            purpose: Some("Testing".into()),
            condition: Some("Sealed".into()),
            notes: None,
        },
    )
    .unwrap();
    assert_eq!(audit_rows(&lab), before + 1);
    let trail = lab.audit_trail("chain_of_custody", handoff.0).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, celims_store::AuditAction::Insert);
    let snapshot = trail[0].new_values.clone().unwrap();
    assert_eq!(snapshot["to_person"], json!(receiver.actor.id.0));
    assert_eq!(snapshot["purpose"], json!("Testing"));

    let chain = lab.custody_chain(sample.id).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].from_person, Some(courier.actor.id));
    assert_eq!(chain[1].to_person, receiver.actor.id);

    let err = lab
        .record_custody(
            &manager(&lab),
            &celims_store::NewCustody {
                sample_id: sample.id,
                from_person: None,
                to_person: receiver.actor.id,
                location: None,
                purpose: None,
                condition: None,
                notes: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { .. }));
    assert_eq!(audit_rows(&lab), before + 1);
}

//! Role-gated workflow actions
//!
//! Every action runs in one IMMEDIATE transaction: status changes, result
//! rows, custody and the audit row commit together or not at all.

use crate::config::{LabConfig, WorkflowConfig};
use crate::context::ActionContext;
use crate::error::WorkflowError;
use crate::state_machine::validate_transition;
use celims_calc::{Input, Outcome};
use celims_store::repo::{assignments, audit, custody, reference, results, samples};
use celims_store::seed::seed_reference_data;
use celims_store::{
    Assignment, AssignmentId, AssignmentStatus, AuditAction, CustodyId, EquipmentId,
    NewAssignment, NewAuditEntry, NewCustody, NewRawFile, NewSample, ProjectStatus,
    ResultId, ResultStatus, ResultSubmission, Role, Sample, SampleId, SampleStatus, Store, StoreError,
    TestResult,
};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::span::EnteredSpan;

type Result<T, E = WorkflowError> = std::result::Result<T, E>;

/// Everything a lab technician submits when a test is finished
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinishTest {
    /// Calculator inputs; stored verbatim as the result's raw data
    pub readings: Input,
    /// Overrides the calculated headline value; required when no calculator exists
    pub result_value: Option<f64>,
    pub result_unit: Option<String>,
    pub equipment_id: Option<EquipmentId>,
    pub test_parameters: Option<Value>,
    pub observations: Option<String>,
    pub raw_files: Vec<NewRawFile>,
}

/// Result row written by [`Lab::finish_test`] and the calculation behind it
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTest {
    pub result: TestResult,
    pub outcome: Outcome,
}

/// The laboratory: one store connection plus workflow settings.
pub struct Lab {
    store: Mutex<Store>,
    config: WorkflowConfig,
}

impl std::fmt::Debug for Lab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lab").field("config", &self.config).finish_non_exhaustive()
    }
}

fn action_span(action: &'static str, ctx: &ActionContext) -> EnteredSpan {
    tracing::info_span!(
        "workflow_action",
        action,
        actor = %ctx.actor,
        request_id = %ctx.request_id
    )
    .entered()
}

/// A referenced row that is missing is a referential failure, not a lookup miss.
fn referenced(err: StoreError) -> WorkflowError {
    match err {
        StoreError::NotFound { entity, id } => WorkflowError::Referential { entity, id },
        other => other.into(),
    }
}

/// Check the claimed role may act, and that the user exists, is active and holds it.
fn authorize(
    conn: &Connection,
    ctx: &ActionContext,
    allowed: &[Role],
    action: &'static str,
) -> Result<()> {
    let role = ctx.actor.role;
    if !allowed.contains(&role) {
        return Err(WorkflowError::Forbidden { role, action });
    }
    let user = reference::get_user(conn, ctx.actor.id).map_err(referenced)?;
    if !user.is_active || user.role != role {
        return Err(WorkflowError::Forbidden { role, action });
    }
    Ok(())
}

fn record_audit(
    conn: &Connection,
    ctx: &ActionContext,
    table_name: &'static str,
    record_id: i64,
    action: AuditAction,
    old_values: Option<Value>,
    new_values: Option<Value>,
) -> Result<()> {
    audit::append(
        conn,
        &NewAuditEntry {
            table_name,
            record_id,
            action,
            old_values,
            new_values,
            changed_by: ctx.actor.id,
            changed_at: ctx.now,
            request_id: Some(ctx.request_id.to_string()),
        },
    )?;
    Ok(())
}

fn move_sample(
    conn: &Connection,
    ctx: &ActionContext,
    sample: &Sample,
    to: SampleStatus,
) -> Result<SampleStatus> {
    validate_transition(sample.status, to)?;
    samples::set_status(conn, sample.id, to, ctx.actor.id, ctx.now)?;
    Ok(to)
}

/// Approve the sample once every live assignment is approved; otherwise leave it.
fn promote_if_all_approved(
    conn: &Connection,
    ctx: &ActionContext,
    sample_id: SampleId,
) -> Result<SampleStatus> {
    let sample = samples::get(conn, sample_id)?;
    let tally = assignments::tally(conn, sample_id)?;
    if tally.all_approved() && sample.status != SampleStatus::Approved {
        return move_sample(conn, ctx, &sample, SampleStatus::Approved);
    }
    Ok(sample.status)
}

fn assignee_only(ctx: &ActionContext, assignment: &Assignment, action: &'static str) -> Result<()> {
    if assignment.assigned_to == ctx.actor.id {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            role: ctx.actor.role,
            action,
        })
    }
}

impl Lab {
    /// Wrap an opened store.
    #[must_use]
    pub fn new(store: Store, config: WorkflowConfig) -> Self {
        Self {
            store: Mutex::new(store),
            config,
        }
    }

    /// Open the configured database, seeding reference data when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, migrated or seeded.
    pub fn open(config: &LabConfig) -> Result<Self> {
        let mut store = match &config.database.path {
            Some(path) => Store::open(path, config.database.busy_timeout())?,
            None => Store::open_in_memory()?,
        };
        if config.workflow.seed_reference_data {
            let now = chrono::Utc::now();
            store.write(|tx| seed_reference_data(tx, now))?;
        }
        Ok(Self::new(store, config.workflow.clone()))
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Direct store access for reads outside the workflow.
    pub fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock()
    }

    fn transact<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let result = self.store.lock().write(f);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "action rolled back");
        }
        result
    }

    /// Register a newly collected sample.
    ///
    /// The sample gets the next `S-YYYY-MM-DD-NNN` code for the action date,
    /// status `registered`, and a custody record naming the collector.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the actor is a field technician
    /// - [`WorkflowError::Validation`] for a blank material or non-active project
    /// - [`WorkflowError::SampleCodeExhausted`] if every retry collided
    pub fn register_sample(&self, ctx: &ActionContext, new: &NewSample) -> Result<Sample> {
        let _span = action_span("register_sample", ctx);
        let retries = self.config.sample_code_retries;
        let sample = self.transact(|tx| {
            authorize(tx, ctx, &[Role::FieldTech], "register samples")?;
            if new.material_type.trim().is_empty() {
                return Err(WorkflowError::validation("material_type", "is required"));
            }
            if new.quantity.is_some_and(|q| q <= 0.0 || q.is_nan()) {
                return Err(WorkflowError::validation("quantity", "must be positive"));
            }
            let project = reference::get_project(tx, new.project_id).map_err(referenced)?;
            if project.status != ProjectStatus::Active {
                return Err(WorkflowError::validation(
                    "project_id",
                    format!("project {} is {}", project.code, project.status),
                ));
            }

            let (id, code) = insert_with_fresh_code(tx, ctx, new, retries)?;
            custody::record(
                tx,
                &NewCustody {
                    sample_id: id,
                    from_person: None,
                    to_person: ctx.actor.id,
                    location: new.location.clone(),
                    purpose: Some("Sample Collection".to_string()),
                    condition: new.condition.clone(),
                    notes: None,
                },
                ctx.now,
            )?;
            record_audit(
                tx,
                ctx,
                "samples",
                id.0,
                AuditAction::Insert,
                None,
                Some(json!({
                    "sample_code": code,
                    "project_id": new.project_id,
                    "material_type": new.material_type,
                    "priority": new.priority,
                    "status": SampleStatus::Registered,
                })),
            )?;
            Ok(samples::get(tx, id)?)
        })?;
        tracing::info!(sample = %sample.id, code = %sample.code, "sample registered");
        Ok(sample)
    }

    /// Record a physical handoff of a sample.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Referential`] if the sample or either person is missing.
    pub fn record_custody(&self, ctx: &ActionContext, handoff: &NewCustody) -> Result<CustodyId> {
        let _span = action_span("record_custody", ctx);
        let id = self.transact(|tx| {
            authorize(
                tx,
                ctx,
                &[Role::FieldTech, Role::Supervisor, Role::LabTech],
                "record custody",
            )?;
            let id = custody::record(tx, handoff, ctx.now)?;
            record_audit(
                tx,
                ctx,
                "chain_of_custody",
                id.0,
                AuditAction::Insert,
                None,
                Some(json!({
                    "sample_id": handoff.sample_id,
                    "from_person": handoff.from_person,
                    "to_person": handoff.to_person,
                    "location": handoff.location,
                    "purpose": handoff.purpose,
                    "condition": handoff.condition,
                })),
            )?;
            Ok(id)
        })?;
        tracing::info!(custody = %id, sample = %handoff.sample_id, "custody recorded");
        Ok(id)
    }

    /// Assign a test method on a sample to a lab technician.
    ///
    /// Moves a `registered` sample to `assigned`.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Validation`] if the method does not apply to the
    ///   sample's material or the assignee is not an active lab technician
    /// - [`WorkflowError::IllegalTransition`] if the sample is approved or archived
    pub fn assign_test(&self, ctx: &ActionContext, new: &NewAssignment) -> Result<Assignment> {
        let _span = action_span("assign_test", ctx);
        let assignment = self.transact(|tx| {
            authorize(tx, ctx, &[Role::Supervisor], "assign tests")?;
            let sample = samples::get(tx, new.sample_id).map_err(referenced)?;
            if matches!(sample.status, SampleStatus::Approved | SampleStatus::Archived) {
                return Err(WorkflowError::illegal(
                    "sample",
                    sample.status,
                    SampleStatus::Assigned,
                ));
            }
            let method = reference::get_method(tx, new.test_method_id).map_err(referenced)?;
            if !method.material_type.eq_ignore_ascii_case(&sample.material_type) {
                return Err(WorkflowError::validation(
                    "test_method_id",
                    format!(
                        "{} applies to {}, sample is {}",
                        method.code, method.material_type, sample.material_type
                    ),
                ));
            }
            let assignee = reference::get_user(tx, new.assigned_to).map_err(referenced)?;
            if assignee.role != Role::LabTech || !assignee.is_active {
                return Err(WorkflowError::validation(
                    "assigned_to",
                    "must be an active lab technician",
                ));
            }

            let id = assignments::insert(tx, new, ctx.actor.id, ctx.now)?;
            let sample_status = if sample.status == SampleStatus::Registered {
                move_sample(tx, ctx, &sample, SampleStatus::Assigned)?
            } else {
                sample.status
            };
            record_audit(
                tx,
                ctx,
                "test_assignments",
                id.0,
                AuditAction::Insert,
                None,
                Some(json!({
                    "sample_id": new.sample_id,
                    "test_method_id": new.test_method_id,
                    "assigned_to": new.assigned_to,
                    "due_date": new.due_date,
                    "priority": new.priority,
                    "status": AssignmentStatus::Assigned,
                    "sample_status": sample_status,
                })),
            )?;
            Ok(assignments::get(tx, id)?)
        })?;
        tracing::info!(assignment = %assignment.id, sample = %assignment.sample_id, "test assigned");
        Ok(assignment)
    }

    /// Withdraw an assignment that has not been completed.
    ///
    /// Cancelling the last unapproved assignment approves the sample.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Validation`] if the assignment is completed or approved.
    pub fn cancel_assignment(&self, ctx: &ActionContext, id: AssignmentId) -> Result<()> {
        let _span = action_span("cancel_assignment", ctx);
        self.transact(|tx| {
            authorize(tx, ctx, &[Role::Supervisor], "cancel tests")?;
            let assignment = assignments::get(tx, id)?;
            if !matches!(
                assignment.status,
                AssignmentStatus::Assigned | AssignmentStatus::InProgress
            ) {
                return Err(WorkflowError::validation(
                    "status",
                    format!("a {} assignment cannot be cancelled", assignment.status),
                ));
            }
            assignments::delete(tx, id, ctx.now)?;
            let sample_status = promote_if_all_approved(tx, ctx, assignment.sample_id)?;
            record_audit(
                tx,
                ctx,
                "test_assignments",
                id.0,
                AuditAction::Delete,
                Some(json!({"status": assignment.status, "is_deleted": false})),
                Some(json!({"is_deleted": true, "sample_status": sample_status})),
            )
        })?;
        tracing::info!(assignment = %id, "assignment cancelled");
        Ok(())
    }

    /// Begin (or restart) work on an assignment.
    ///
    /// Creates the assignment's result in `draft`, or resets the existing one.
    /// An `assigned` sample moves to `in_progress`.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the actor is the assignee
    /// - [`WorkflowError::IllegalTransition`] if the assignment is completed or approved
    pub fn start_test(&self, ctx: &ActionContext, id: AssignmentId) -> Result<TestResult> {
        let _span = action_span("start_test", ctx);
        let result = self.transact(|tx| {
            authorize(tx, ctx, &[Role::LabTech], "start tests")?;
            let assignment = assignments::get(tx, id)?;
            assignee_only(ctx, &assignment, "start tests assigned to someone else")?;
            // restarting an in-progress test keeps the assignment where it is
            if assignment.status != AssignmentStatus::InProgress {
                validate_transition(assignment.status, AssignmentStatus::InProgress)?;
                assignments::set_status(tx, id, AssignmentStatus::InProgress, ctx.now)?;
            }
            let result_id = results::start(tx, id, ctx.actor.id, ctx.now)?;

            let sample = samples::get(tx, assignment.sample_id)?;
            let sample_status = if sample.status == SampleStatus::Assigned {
                move_sample(tx, ctx, &sample, SampleStatus::InProgress)?
            } else {
                sample.status
            };
            record_audit(
                tx,
                ctx,
                "test_assignments",
                id.0,
                AuditAction::Update,
                Some(json!({"status": assignment.status})),
                Some(json!({
                    "status": AssignmentStatus::InProgress,
                    "result_id": result_id,
                    "result_status": ResultStatus::Draft,
                    "sample_status": sample_status,
                })),
            )?;
            Ok(results::get(tx, result_id)?)
        })?;
        tracing::info!(assignment = %id, result = %result.id, "test started");
        Ok(result)
    }

    /// Finish a test: calculate, submit the result and complete the assignment.
    ///
    /// Nothing is written unless the calculation succeeds and a positive
    /// result value is available. The sample moves to `completed` as soon as
    /// any one of its assignments completes, while approval waits for all of
    /// them; this asymmetry is deliberate until product owners decide otherwise.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Calculation`] if the calculator rejects the readings
    /// - [`WorkflowError::Validation`] if no positive result value is available
    /// - [`WorkflowError::IllegalTransition`] unless the assignment is in progress
    /// - [`WorkflowError::Referential`] if the equipment is missing or not active
    pub fn finish_test(
        &self,
        ctx: &ActionContext,
        id: AssignmentId,
        input: &FinishTest,
    ) -> Result<FinishedTest> {
        let _span = action_span("finish_test", ctx);
        let finished = self.transact(|tx| {
            authorize(tx, ctx, &[Role::LabTech], "finish tests")?;
            let assignment = assignments::get(tx, id)?;
            assignee_only(ctx, &assignment, "finish tests assigned to someone else")?;
            validate_transition(assignment.status, AssignmentStatus::Completed)?;

            let method = reference::get_method(tx, assignment.test_method_id)?;
            let outcome = celims_calc::compute(&method.standard, &input.readings)?;
            let calculation = outcome.calculation();

            let result_value = match input.result_value.or(calculation.map(|c| c.value)) {
                Some(value) if value.is_finite() && value > 0.0 => value,
                Some(_) => {
                    return Err(WorkflowError::validation(
                        "result_value",
                        "must be a finite positive number",
                    ))
                }
                None => {
                    return Err(WorkflowError::validation(
                        "result_value",
                        format!("manual entry required for {}", method.standard),
                    ))
                }
            };
            let result_unit = input
                .result_unit
                .clone()
                .or_else(|| calculation.map(|c| c.unit.clone()))
                .unwrap_or_default();

            let previous = results::for_assignment(tx, id)?;
            let result_id = match &previous {
                Some(result) => {
                    validate_transition(result.status, ResultStatus::Submitted)?;
                    result.id
                }
                None => results::start(tx, id, ctx.actor.id, ctx.now)?,
            };
            let submission = ResultSubmission {
                equipment_id: input.equipment_id,
                test_parameters: input.test_parameters.clone(),
                raw_data: Value::Object(input.readings.clone()),
                calculated_results: Some(Value::Object(outcome.to_map())),
                result_value,
                result_unit,
                pass_fail: calculation.map(|c| c.verdict),
                observations: input.observations.clone(),
            };
            results::submit(tx, result_id, &submission, ctx.actor.id, ctx.now)?;
            for file in &input.raw_files {
                results::insert_raw_file(tx, result_id, file, ctx.actor.id, ctx.now)?;
            }
            assignments::set_status(tx, id, AssignmentStatus::Completed, ctx.now)?;

            let sample = samples::get(tx, assignment.sample_id)?;
            let sample_status =
                if matches!(sample.status, SampleStatus::Assigned | SampleStatus::InProgress) {
                    move_sample(tx, ctx, &sample, SampleStatus::Completed)?
                } else {
                    sample.status
                };
            record_audit(
                tx,
                ctx,
                "test_results",
                result_id.0,
                AuditAction::Update,
                Some(json!({"status": previous.map_or(ResultStatus::Draft, |r| r.status)})),
                Some(json!({
                    "status": ResultStatus::Submitted,
                    "result_value": submission.result_value,
                    "result_unit": submission.result_unit,
                    "pass_fail": submission.pass_fail,
                    "assignment_status": AssignmentStatus::Completed,
                    "sample_status": sample_status,
                })),
            )?;
            Ok(FinishedTest {
                result: results::get(tx, result_id)?,
                outcome,
            })
        })?;
        tracing::info!(
            assignment = %id,
            result = %finished.result.id,
            value = ?finished.result.result_value,
            "test finished"
        );
        Ok(finished)
    }

    /// Approve a submitted result and its assignment.
    ///
    /// The sample becomes `approved` only when every live assignment on it
    /// is approved. Returns the sample status after the action.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::IllegalTransition`] unless the result is submitted.
    pub fn approve_result(&self, ctx: &ActionContext, id: ResultId) -> Result<SampleStatus> {
        let _span = action_span("approve_result", ctx);
        let sample_status = self.transact(|tx| {
            authorize(tx, ctx, &[Role::Manager], "approve results")?;
            let result = results::get(tx, id)?;
            validate_transition(result.status, ResultStatus::Approved)?;
            let assignment = assignments::get(tx, result.assignment_id)?;
            validate_transition(assignment.status, AssignmentStatus::Approved)?;

            results::approve(tx, id, ctx.actor.id, ctx.now)?;
            assignments::set_status(tx, assignment.id, AssignmentStatus::Approved, ctx.now)?;
            let sample_status = promote_if_all_approved(tx, ctx, assignment.sample_id)?;
            record_audit(
                tx,
                ctx,
                "test_results",
                id.0,
                AuditAction::Approve,
                Some(json!({"status": result.status})),
                Some(json!({
                    "status": ResultStatus::Approved,
                    "approved_by": ctx.actor.id,
                    "assignment_status": AssignmentStatus::Approved,
                    "sample_status": sample_status,
                })),
            )?;
            Ok(sample_status)
        })?;
        tracing::info!(result = %id, sample_status = %sample_status, "result approved");
        Ok(sample_status)
    }

    /// Reject a submitted result and reopen its assignment.
    ///
    /// The sample status is never changed by a rejection.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Validation`] if `reason` is blank
    /// - [`WorkflowError::IllegalTransition`] unless the result is submitted
    pub fn reject_result(
        &self,
        ctx: &ActionContext,
        id: ResultId,
        reason: &str,
    ) -> Result<()> {
        let _span = action_span("reject_result", ctx);
        self.transact(|tx| {
            authorize(tx, ctx, &[Role::Manager], "reject results")?;
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(WorkflowError::validation("rejection_reason", "is required"));
            }
            let result = results::get(tx, id)?;
            validate_transition(result.status, ResultStatus::Rejected)?;
            let assignment = assignments::get(tx, result.assignment_id)?;
            validate_transition(assignment.status, AssignmentStatus::InProgress)?;

            results::reject(tx, id, reason, ctx.now)?;
            assignments::set_status(tx, assignment.id, AssignmentStatus::InProgress, ctx.now)?;
            record_audit(
                tx,
                ctx,
                "test_results",
                id.0,
                AuditAction::Reject,
                Some(json!({"status": result.status})),
                Some(json!({
                    "status": ResultStatus::Rejected,
                    "rejection_reason": reason,
                    "assignment_status": AssignmentStatus::InProgress,
                })),
            )
        })?;
        tracing::info!(result = %id, "result rejected");
        Ok(())
    }

    /// Archive an approved sample. Archived is terminal.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::IllegalTransition`] unless the sample is approved.
    pub fn archive_sample(&self, ctx: &ActionContext, id: SampleId) -> Result<()> {
        let _span = action_span("archive_sample", ctx);
        self.transact(|tx| {
            authorize(tx, ctx, &[Role::Manager], "archive samples")?;
            let sample = samples::get(tx, id)?;
            move_sample(tx, ctx, &sample, SampleStatus::Archived)?;
            record_audit(
                tx,
                ctx,
                "samples",
                id.0,
                AuditAction::Update,
                Some(json!({"status": sample.status})),
                Some(json!({"status": SampleStatus::Archived})),
            )
        })?;
        tracing::info!(sample = %id, "sample archived");
        Ok(())
    }

    /// Soft-delete a sample; its code stays reserved.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::NotFound`] if the sample is missing or already deleted.
    pub fn delete_sample(&self, ctx: &ActionContext, id: SampleId) -> Result<()> {
        let _span = action_span("delete_sample", ctx);
        self.transact(|tx| {
            authorize(tx, ctx, &[Role::Manager], "delete samples")?;
            let sample = samples::get(tx, id)?;
            samples::delete(tx, id, ctx.actor.id, ctx.now)?;
            record_audit(
                tx,
                ctx,
                "samples",
                id.0,
                AuditAction::Delete,
                Some(json!({"sample_code": sample.code, "status": sample.status, "is_deleted": false})),
                Some(json!({"is_deleted": true})),
            )
        })?;
        tracing::info!(sample = %id, "sample deleted");
        Ok(())
    }
}

/// Insert under the next free code, recomputing the sequence after a collision.
fn insert_with_fresh_code(
    tx: &Transaction<'_>,
    ctx: &ActionContext,
    new: &NewSample,
    retries: u32,
) -> Result<(SampleId, String)> {
    let date = ctx.now.date_naive();
    let attempts = retries.saturating_add(1);
    for attempt in 0..attempts {
        let code = samples::next_code(tx, date, attempt)?;
        match samples::insert(tx, &code, new, ctx.actor.id, ctx.now) {
            Ok(id) => return Ok((id, code)),
            Err(err) if err.is_duplicate() => {
                tracing::warn!(%code, attempt, "sample code collision, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(WorkflowError::SampleCodeExhausted { attempts })
}

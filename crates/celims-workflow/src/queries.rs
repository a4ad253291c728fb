//! Read models

use crate::error::WorkflowError;
use crate::lab::Lab;
use celims_store::repo::assignments::{self, QueueItem};
use celims_store::repo::audit::{self, ChainReport};
use celims_store::repo::results::{self, PendingApproval};
use celims_store::repo::stats::{self, LabStats};
use celims_store::repo::{custody, samples};
use celims_store::{
    Assignment, AssignmentId, AuditEntry, CustodyRecord, ProjectId, RawFile, ResultId, Sample,
    SampleId, SampleStatus, TestResult, UserId,
};
use serde::{Deserialize, Serialize};

type Result<T, E = WorkflowError> = std::result::Result<T, E>;

/// How far a sample's testing has come
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleProgress {
    pub sample_id: SampleId,
    pub sample_code: String,
    pub status: SampleStatus,
    pub total: u32,
    /// Completed or approved assignments
    pub finished: u32,
    pub approved: u32,
}

impl SampleProgress {
    /// Finished share in percent; zero when nothing is assigned
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.finished) * 100.0 / f64::from(self.total)
        }
    }
}

impl Lab {
    /// # Errors
    ///
    /// [`WorkflowError::NotFound`] if missing or deleted.
    pub fn sample(&self, id: SampleId) -> Result<Sample> {
        Ok(samples::get(self.store().conn(), id)?)
    }

    /// Live sample by its `S-YYYY-MM-DD-NNN` code.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Validation`] if `code` is not a well-formed sample code.
    pub fn find_sample(&self, code: &str) -> Result<Option<Sample>> {
        let code = code.trim();
        if samples::parse_code(code).is_none() {
            return Err(WorkflowError::validation(
                "sample_code",
                format!("{code:?} is not a sample code"),
            ));
        }
        Ok(samples::find_by_code(self.store().conn(), code)?)
    }

    /// Approved samples waiting to be archived, oldest first.
    pub fn archive_queue(&self) -> Result<Vec<Sample>> {
        Ok(samples::list_by_status(
            self.store().conn(),
            &[SampleStatus::Approved],
        )?)
    }

    pub fn samples_for_project(&self, project: ProjectId) -> Result<Vec<Sample>> {
        Ok(samples::list_by_project(self.store().conn(), project)?)
    }

    pub fn assignments_for_sample(&self, sample: SampleId) -> Result<Vec<Assignment>> {
        Ok(assignments::list_by_sample(self.store().conn(), sample)?)
    }

    /// Open work for one lab technician, most urgent first.
    pub fn work_queue(&self, technician: UserId) -> Result<Vec<QueueItem>> {
        Ok(assignments::work_queue(self.store().conn(), technician)?)
    }

    pub fn pending_approvals(&self) -> Result<Vec<PendingApproval>> {
        Ok(results::pending_approvals(self.store().conn())?)
    }

    pub fn result_for_assignment(&self, assignment: AssignmentId) -> Result<Option<TestResult>> {
        Ok(results::for_assignment(self.store().conn(), assignment)?)
    }

    pub fn raw_files(&self, result: ResultId) -> Result<Vec<RawFile>> {
        Ok(results::list_raw_files(self.store().conn(), result)?)
    }

    /// # Errors
    ///
    /// [`WorkflowError::NotFound`] if the sample is missing or deleted.
    pub fn sample_progress(&self, id: SampleId) -> Result<SampleProgress> {
        let store = self.store();
        let sample = samples::get(store.conn(), id)?;
        let tally = assignments::tally(store.conn(), id)?;
        Ok(SampleProgress {
            sample_id: sample.id,
            sample_code: sample.code,
            status: sample.status,
            total: tally.total,
            finished: tally.finished(),
            approved: tally.approved,
        })
    }

    /// Audit rows for one record, oldest first.
    pub fn audit_trail(&self, table_name: &str, record_id: i64) -> Result<Vec<AuditEntry>> {
        Ok(audit::trail(self.store().conn(), table_name, record_id)?)
    }

    pub fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        Ok(audit::recent(self.store().conn(), limit)?)
    }

    pub fn custody_chain(&self, sample: SampleId) -> Result<Vec<CustodyRecord>> {
        Ok(custody::chain(self.store().conn(), sample)?)
    }

    /// Walk the whole audit hash chain.
    pub fn verify_audit(&self) -> Result<ChainReport> {
        Ok(audit::verify(self.store().conn())?)
    }

    pub fn stats(&self) -> Result<LabStats> {
        Ok(stats::lab_stats(self.store().conn())?)
    }
}

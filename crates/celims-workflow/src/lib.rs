//! CE-LIMS workflow
//!
//! Drives samples, test assignments and test results through their status
//! lifecycles on behalf of authenticated actors:
//!
//! | Role | Actions |
//! |---|---|
//! | field technician | register samples, record custody |
//! | supervisor | assign and cancel tests, record custody |
//! | lab technician | start and finish own tests, record custody |
//! | manager | approve and reject results, archive and delete samples |
//!
//! Every action takes an explicit [`ActionContext`], runs in one transaction
//! and appends one audit row. Any error rolls the whole action back.
//!
//! ```no_run
//! use celims_workflow::{Actor, ActionContext, Lab, LabConfig};
//! use celims_store::{NewSample, ProjectId, Role, UserId};
//!
//! # fn main() -> Result<(), celims_workflow::WorkflowError> {
//! let lab = Lab::open(&LabConfig::default())?;
//! let ctx = ActionContext::new(Actor::new(UserId(1), Role::FieldTech));
//! let sample = lab.register_sample(
//!     &ctx,
//!     &NewSample {
//!         project_id: ProjectId(1),
//!         material_type: "Soil".into(),
//!         ..NewSample::default()
//!     },
//! )?;
//! println!("registered {}", sample.code);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod lab;
pub mod queries;
pub mod state_machine;

pub use config::{ConfigError, DatabaseConfig, LabConfig, WorkflowConfig};
pub use context::{ActionContext, Actor};
pub use error::WorkflowError;
pub use lab::{FinishTest, FinishedTest, Lab};
pub use queries::SampleProgress;
pub use state_machine::{validate_transition, Lifecycle};

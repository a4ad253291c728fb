//! Workflow errors

use celims_calc::CalculationError;
use celims_store::{Role, StoreError};

/// Errors returned by workflow actions
///
/// Every variant aborts the action: the surrounding transaction is rolled
/// back and nothing the action wrote is persisted.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Missing or invalid field, reported before anything is written
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Calculator precondition failed; blocks completion
    #[error("calculation failed: {0}")]
    Calculation(#[from] CalculationError),

    /// Referenced row is missing or soft-deleted
    #[error("referenced {entity} {id} is missing or deleted")]
    Referential { entity: &'static str, id: i64 },

    /// Actor may not perform this action
    #[error("{role} may not {action}")]
    Forbidden { role: Role, action: &'static str },

    /// Status change not in the transition table
    #[error("illegal {entity} transition {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Target row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Every generated sample code collided
    #[error("no free sample code after {attempts} attempts")]
    SampleCodeExhausted { attempts: u32 },

    /// Any other store failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl WorkflowError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::IllegalTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Check if the error should be shown to the actor as a correctable mistake
    #[inline]
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Calculation(_)
                | Self::Forbidden { .. }
                | Self::IllegalTransition { .. }
        )
    }

    /// Check if repeating the same action may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SampleCodeExhausted { .. } => true,
            Self::Store(err) => err.is_busy(),
            _ => false,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Referential { entity, id } => Self::Referential { entity, id },
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other),
        }
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::from(err).into()
    }
}

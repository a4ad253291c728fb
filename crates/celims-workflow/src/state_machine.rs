//! Status transition tables

use crate::error::WorkflowError;
use celims_store::{AssignmentStatus, ResultStatus, SampleStatus};

/// An entity status with a fixed set of legal successors
pub trait Lifecycle: Copy + Eq + std::fmt::Display + 'static {
    /// Entity name used in errors
    const ENTITY: &'static str;

    /// Statuses reachable in one step
    fn successors(self) -> Vec<Self>;

    /// No further transitions
    #[inline]
    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

impl Lifecycle for SampleStatus {
    const ENTITY: &'static str = "sample";

    fn successors(self) -> Vec<Self> {
        use SampleStatus::*;
        match self {
            Registered => vec![Assigned],
            // a single completed assignment completes the sample; approval waits for all
            Assigned => vec![InProgress, Completed, Approved],
            InProgress => vec![Completed, Approved],
            Completed => vec![Approved],
            Approved => vec![Archived],
            Archived => vec![],
        }
    }
}

impl Lifecycle for AssignmentStatus {
    const ENTITY: &'static str = "test assignment";

    fn successors(self) -> Vec<Self> {
        use AssignmentStatus::*;
        match self {
            Assigned => vec![InProgress],
            InProgress => vec![Completed],
            // rejection of the result reopens the assignment
            Completed => vec![Approved, InProgress],
            Approved | Rejected => vec![],
        }
    }
}

impl Lifecycle for ResultStatus {
    const ENTITY: &'static str = "test result";

    fn successors(self) -> Vec<Self> {
        use ResultStatus::*;
        match self {
            Draft => vec![Submitted],
            Submitted => vec![Approved, Rejected],
            Rejected => vec![Draft, Submitted],
            Approved => vec![],
        }
    }
}

/// Validates a status transition.
///
/// # Errors
///
/// [`WorkflowError::IllegalTransition`] if `to` is not a successor of `from`.
pub fn validate_transition<S: Lifecycle>(from: S, to: S) -> Result<(), WorkflowError> {
    if from.successors().contains(&to) {
        Ok(())
    } else {
        Err(WorkflowError::illegal(S::ENTITY, from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_sample() -> impl Strategy<Value = SampleStatus> {
        prop::sample::select(SampleStatus::ALL.to_vec())
    }

    fn arb_assignment() -> impl Strategy<Value = AssignmentStatus> {
        prop::sample::select(AssignmentStatus::ALL.to_vec())
    }

    fn arb_result() -> impl Strategy<Value = ResultStatus> {
        prop_oneof![
            Just(ResultStatus::Draft),
            Just(ResultStatus::Submitted),
            Just(ResultStatus::Approved),
            Just(ResultStatus::Rejected),
        ]
    }

    #[test]
    fn sample_happy_path() {
        use SampleStatus::*;
        let path = [Registered, Assigned, InProgress, Completed, Approved, Archived];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
        assert!(Archived.is_terminal());
    }

    #[test]
    fn rejection_loop_back() {
        assert!(validate_transition(AssignmentStatus::Completed, AssignmentStatus::InProgress).is_ok());
        assert!(validate_transition(ResultStatus::Submitted, ResultStatus::Rejected).is_ok());
        assert!(validate_transition(ResultStatus::Rejected, ResultStatus::Submitted).is_ok());
    }

    #[test]
    fn backwards_is_illegal() {
        let err = validate_transition(SampleStatus::Completed, SampleStatus::Assigned).unwrap_err();
        assert_eq!(err.to_string(), "illegal sample transition completed -> assigned");
        assert!(validate_transition(ResultStatus::Approved, ResultStatus::Rejected).is_err());
    }

    proptest! {
        #[test]
        fn no_status_is_its_own_successor(s in arb_sample(), a in arb_assignment(), r in arb_result()) {
            prop_assert!(validate_transition(s, s).is_err());
            prop_assert!(validate_transition(a, a).is_err());
            prop_assert!(validate_transition(r, r).is_err());
        }

        #[test]
        fn terminal_statuses_accept_nothing(from in arb_sample(), to in arb_sample()) {
            if from.is_terminal() {
                prop_assert!(validate_transition(from, to).is_err());
            }
        }

        #[test]
        fn samples_never_return_to_registered(from in arb_sample()) {
            prop_assert!(validate_transition(from, SampleStatus::Registered).is_err());
        }

        #[test]
        fn approved_results_are_final(to in arb_result()) {
            prop_assert!(validate_transition(ResultStatus::Approved, to).is_err());
        }
    }
}

//! Calculator precondition failures

use serde_json::{Map, Value};

/// A calculator refused its input.
///
/// This is data, not a fault: the caller decides whether it blocks
/// submission and shows `reason` to whoever entered the readings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct CalculationError {
    /// Human-readable reason
    pub reason: String,
}

impl CalculationError {
    /// Create a new error with the given reason
    #[inline]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Shorthand for the generic out-of-range failure
    #[inline]
    #[must_use]
    pub fn invalid_input() -> Self {
        Self::new("Invalid input values")
    }

    /// Error map with a single `error` key
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("error".to_string(), Value::from(self.reason.clone()));
        map
    }
}

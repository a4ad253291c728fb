//! Typed access to flat calculator input maps
//!
//! Form handlers submit numbers either as JSON numbers or as numeric strings.
//! Missing keys, `null` and blank strings are treated as absent.

use crate::error::CalculationError;
use serde_json::{Map, Value};

/// Flat key-value calculator input
pub type Input = Map<String, Value>;

/// Read-only view over an [`Input`] with numeric coercion.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    map: &'a Input,
}

impl<'a> Fields<'a> {
    /// Wrap an input map
    #[inline]
    #[must_use]
    pub fn new(map: &'a Input) -> Self {
        Self { map }
    }

    /// Numeric value for `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Fails when the value is present but not a finite number.
    pub fn number(&self, key: &str) -> Result<Option<f64>, CalculationError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value) => coerce(value)
                .map(Some)
                .ok_or_else(|| CalculationError::new(format!("Field '{key}' must be numeric"))),
        }
    }

    /// Numeric value for `key`, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Fails when the value is present but not a finite number.
    pub fn number_or(&self, key: &str, default: f64) -> Result<f64, CalculationError> {
        Ok(self.number(key)?.unwrap_or(default))
    }

    /// List of numeric readings stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails when the value is not an array or any element is not numeric.
    pub fn readings(&self, key: &str) -> Result<Vec<f64>, CalculationError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    coerce(item).ok_or_else(|| {
                        CalculationError::new(format!("Field '{key}' must contain only numbers"))
                    })
                })
                .collect(),
            Some(_) => Err(CalculationError::new(format!(
                "Field '{key}' must be a list of readings"
            ))),
        }
    }
}

fn coerce(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

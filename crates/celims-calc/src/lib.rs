//! CE-LIMS calculation engine
//!
//! Pure functions that reduce raw laboratory readings to engineering results:
//! - ASTM D5 penetration of bituminous materials
//! - ASTM C39 compressive strength of concrete cylinders
//! - ASTM D1557 modified Proctor densities
//! - ASTM D2166 unconfined compressive strength of cohesive soil
//! - ASTM D4318 Atterberg limits
//! - ASTM D1883 California Bearing Ratio
//!
//! Dispatch goes through the [`Standard`] enum. Standard codes without a
//! calculator yield [`Outcome::ManualEntryRequired`] so the caller can fall back
//! to free entry.
//!
//! # Example
//!
//! ```rust
//! use celims_calc::{compute, Outcome, Verdict};
//! use serde_json::json;
//!
//! let input = json!({"diameter": 150, "max_load": 450, "age": 28});
//! let outcome = compute("ASTM C39", input.as_object().unwrap()).unwrap();
//! let Outcome::Computed(calc) = outcome else { panic!("C39 has a calculator") };
//! assert_eq!(calc.value, 25.46);
//! assert_eq!(calc.verdict, Verdict::Fail);
//! ```

#![allow(missing_docs)]

pub mod calculators;
pub mod error;
pub mod input;
pub mod outcome;
pub mod standard;

pub use error::CalculationError;
pub use input::Input;
pub use outcome::{Calculation, Outcome, Verdict};
pub use standard::Standard;

use serde_json::{Map, Value};

/// Run the calculator registered for `standard` against `input`.
///
/// Unknown standards are not an error: they produce
/// [`Outcome::ManualEntryRequired`].
///
/// # Errors
///
/// Returns [`CalculationError`] when the calculator's input preconditions fail.
pub fn compute(standard: &str, input: &Input) -> Result<Outcome, CalculationError> {
    match Standard::from_code(standard) {
        Some(known) => known.calculate(input).map(Outcome::Computed),
        None => Ok(Outcome::ManualEntryRequired {
            standard: standard.to_string(),
        }),
    }
}

/// Flat key-value rendering of [`compute`].
///
/// Failures are rendered as a map holding an `error` key, matching what form
/// handlers expect to display.
#[must_use]
pub fn compute_map(standard: &str, input: &Input) -> Map<String, Value> {
    match compute(standard, input) {
        Ok(outcome) => outcome.to_map(),
        Err(err) => err.to_map(),
    }
}

/// Round half away from zero to `places` decimal places.
pub(crate) fn round_dp(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

//! ASTM C39 compressive strength of cylindrical concrete specimens

use super::{circle_area, echo};
use crate::error::CalculationError;
use crate::input::Fields;
use crate::outcome::{Calculation, Verdict};
use crate::round_dp;
use crate::standard::Standard;

/// Age assumed when none is submitted (days)
pub const DEFAULT_AGE_DAYS: f64 = 28.0;

/// Minimum strength in MPa expected at a given age.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn minimum_strength(age_days: f64) -> f64 {
    if age_days == 7.0 {
        20.0
    } else if age_days == 28.0 {
        30.0
    } else {
        25.0
    }
}

pub(crate) fn calculate(fields: &Fields<'_>) -> Result<Calculation, CalculationError> {
    let diameter = fields.number_or("diameter", 0.0)?;
    let max_load = fields.number_or("max_load", 0.0)?;
    let age = fields.number_or("age", DEFAULT_AGE_DAYS)?;

    if diameter <= 0.0 || max_load <= 0.0 {
        return Err(CalculationError::invalid_input());
    }

    let area = circle_area(diameter);
    // kN over mm² gives MPa after scaling the load to N
    let strength = max_load * 1000.0 / area;
    let min_strength = minimum_strength(age);
    let rounded = round_dp(strength, 2);

    Ok(Calculation::new(Standard::CompressiveStrength, rounded, "MPa")
        .field("compressive_strength", rounded)
        .field("unit", "MPa")
        .field("cross_sectional_area", round_dp(area, 2))
        .field("area_unit", "mm²")
        .field("age", echo(age))
        .field("min_required_strength", echo(min_strength))
        .with_verdict(Verdict::from_bool(strength >= min_strength))
        .finish("Strength (MPa) = Load (kN) × 1000 / Area (mm²)"))
}

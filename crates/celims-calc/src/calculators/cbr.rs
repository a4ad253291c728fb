//! ASTM D1883 California Bearing Ratio

use crate::error::CalculationError;
use crate::input::Fields;
use crate::outcome::Calculation;
use crate::round_dp;
use crate::standard::Standard;

/// Standard load at 2.5 mm penetration (kN)
pub const STANDARD_LOAD_2_5MM: f64 = 13.24;

/// Standard load at 5 mm penetration (kN)
pub const STANDARD_LOAD_5MM: f64 = 19.96;

/// Subgrade rating for a CBR percentage.
#[must_use]
pub fn subgrade(cbr: f64) -> &'static str {
    if cbr < 3.0 {
        "Very Poor"
    } else if cbr < 7.0 {
        "Poor to Fair"
    } else if cbr < 20.0 {
        "Fair"
    } else if cbr < 50.0 {
        "Good"
    } else {
        "Excellent"
    }
}

fn ratio(load: f64, standard_load: f64) -> f64 {
    if load > 0.0 {
        load / standard_load * 100.0
    } else {
        0.0
    }
}

pub(crate) fn calculate(fields: &Fields<'_>) -> Result<Calculation, CalculationError> {
    let load_2_5 = fields.number_or("load_2_5mm", 0.0)?;
    let load_5 = fields.number_or("load_5mm", 0.0)?;

    if load_2_5 <= 0.0 && load_5 <= 0.0 {
        return Err(CalculationError::invalid_input());
    }

    let cbr_2_5 = ratio(load_2_5, STANDARD_LOAD_2_5MM);
    let cbr_5 = ratio(load_5, STANDARD_LOAD_5MM);
    let cbr = cbr_2_5.max(cbr_5);
    let rounded = round_dp(cbr, 2);

    Ok(Calculation::new(Standard::Cbr, rounded, "%")
        .field("cbr_2_5mm", round_dp(cbr_2_5, 2))
        .field("cbr_5mm", round_dp(cbr_5, 2))
        .field("cbr_value", rounded)
        .field("unit", "%")
        .with_classification("subgrade_classification", subgrade(cbr))
        .finish("CBR = (Test Load / Standard Load) × 100"))
}

//! ASTM D5 penetration of bituminous materials

use crate::error::CalculationError;
use crate::input::Fields;
use crate::outcome::{Calculation, Verdict};
use crate::round_dp;
use crate::standard::Standard;

/// Minimum number of needle readings
pub const MIN_READINGS: usize = 3;

/// Acceptance limit on the coefficient of variation (%)
pub const MAX_CV_PERCENT: f64 = 10.0;

/// Penetration grade for an average reading in 0.1 mm.
#[must_use]
pub fn grade(average: f64) -> &'static str {
    if average >= 200.0 {
        "40/50"
    } else if average >= 150.0 {
        "60/70"
    } else if average >= 100.0 {
        "80/100"
    } else if average >= 50.0 {
        "85/100"
    } else {
        "Unknown"
    }
}

pub(crate) fn calculate(fields: &Fields<'_>) -> Result<Calculation, CalculationError> {
    let readings = fields.readings("readings")?;
    if readings.len() < MIN_READINGS {
        return Err(CalculationError::new("At least 3 readings required"));
    }

    #[allow(clippy::cast_precision_loss)]
    let n = readings.len() as f64;
    let average = readings.iter().sum::<f64>() / n;
    let variance = readings.iter().map(|x| (x - average).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let cv = if average > 0.0 {
        std_dev / average * 100.0
    } else {
        0.0
    };

    let rounded_average = round_dp(average, 1);
    Ok(Calculation::new(Standard::Penetration, rounded_average, "0.1mm")
        .field("average_penetration", rounded_average)
        .field("unit", "0.1mm")
        .field("std_deviation", round_dp(std_dev, 2))
        .field("coefficient_of_variation", round_dp(cv, 2))
        .with_classification("grade", grade(average))
        .with_verdict(Verdict::from_bool(cv <= MAX_CV_PERCENT))
        .finish("Average = Σ(readings) / n"))
}

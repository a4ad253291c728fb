//! ASTM D4318 liquid limit, plastic limit and plasticity index

use super::echo;
use crate::error::CalculationError;
use crate::input::Fields;
use crate::outcome::Calculation;
use crate::round_dp;
use crate::standard::Standard;

/// Plasticity class for a plasticity index.
#[must_use]
pub fn plasticity_class(pi: f64) -> &'static str {
    if pi < 7.0 {
        "Non-plastic to Low Plasticity"
    } else if pi < 17.0 {
        "Medium Plasticity"
    } else {
        "High Plasticity"
    }
}

#[allow(clippy::float_cmp)]
pub(crate) fn calculate(fields: &Fields<'_>) -> Result<Calculation, CalculationError> {
    let liquid_limit = fields.number_or("liquid_limit", 0.0)?;
    let plastic_limit = fields.number_or("plastic_limit", 0.0)?;
    let clay_fraction = fields.number_or("clay_fraction", 0.0)?;

    if liquid_limit <= 0.0 || plastic_limit <= 0.0 {
        return Err(CalculationError::invalid_input());
    }

    let pi = liquid_limit - plastic_limit;
    let mut calc = Calculation::new(Standard::AtterbergLimits, pi, "%")
        .field("liquid_limit", echo(liquid_limit))
        .field("plastic_limit", echo(plastic_limit))
        .field("plasticity_index", echo(pi))
        .with_classification("classification", plasticity_class(pi))
        .finish("PI = LL - PL");

    // activity is only reported when a clay fraction was measured and the ratio is non-zero
    if clay_fraction > 0.0 {
        let activity = pi / clay_fraction;
        if activity != 0.0 {
            calc = calc.field("activity", round_dp(activity, 2));
        }
    }
    Ok(calc)
}

//! ASTM D1557 modified Proctor compaction

use super::echo;
use crate::error::CalculationError;
use crate::input::Fields;
use crate::outcome::Calculation;
use crate::round_dp;
use crate::standard::Standard;

const NOT_DETERMINED: &str = "To be determined from curve";

pub(crate) fn calculate(fields: &Fields<'_>) -> Result<Calculation, CalculationError> {
    let mold_volume = fields.number_or("mold_volume", 0.0)?;
    let wet_mass = fields.number_or("wet_mass", 0.0)?;
    let mold_mass = fields.number_or("mold_mass", 0.0)?;
    let water_content = fields.number_or("water_content", 0.0)?;

    if mold_volume <= 0.0 || wet_mass <= mold_mass {
        return Err(CalculationError::invalid_input());
    }

    let wet_density = (wet_mass - mold_mass) / mold_volume;
    let dry_density = wet_density / (1.0 + water_content / 100.0);
    let rounded_dry = round_dp(dry_density, 3);

    // A single point cannot locate the compaction curve peak.
    Ok(Calculation::new(Standard::ModifiedProctor, rounded_dry, "g/cm³")
        .field("wet_density", round_dp(wet_density, 3))
        .field("dry_density", rounded_dry)
        .field("unit", "g/cm³")
        .field("water_content", echo(water_content))
        .field("optimum_moisture_content", NOT_DETERMINED)
        .field("maximum_dry_density", NOT_DETERMINED)
        .finish("Dry Density = Wet Density / (1 + w/100)"))
}

//! ASTM D2166 unconfined compressive strength of cohesive soil

use super::circle_area;
use crate::error::CalculationError;
use crate::input::Fields;
use crate::outcome::Calculation;
use crate::round_dp;
use crate::standard::Standard;

/// Consistency band for an unconfined strength in kPa.
#[must_use]
pub fn consistency(qu_kpa: f64) -> &'static str {
    if qu_kpa < 25.0 {
        "Very Soft"
    } else if qu_kpa < 50.0 {
        "Soft"
    } else if qu_kpa < 100.0 {
        "Medium"
    } else if qu_kpa < 200.0 {
        "Stiff"
    } else if qu_kpa < 400.0 {
        "Very Stiff"
    } else {
        "Hard"
    }
}

pub(crate) fn calculate(fields: &Fields<'_>) -> Result<Calculation, CalculationError> {
    let diameter = fields.number_or("diameter", 0.0)?;
    let height = fields.number_or("height", 0.0)?;
    let max_load = fields.number_or("max_load", 0.0)?;
    let deformation = fields.number_or("deformation", 0.0)?;

    if diameter <= 0.0 || height <= 0.0 || max_load <= 0.0 {
        return Err(CalculationError::invalid_input());
    }
    // the corrected area is undefined once the specimen is fully compressed
    if deformation < 0.0 || deformation >= height {
        return Err(CalculationError::new(
            "Deformation must be non-negative and less than specimen height",
        ));
    }

    let strain = deformation / height;
    let corrected_area = circle_area(diameter) / (1.0 - strain);
    let qu = max_load * 1000.0 / corrected_area;
    let rounded = round_dp(qu, 2);

    Ok(Calculation::new(Standard::UnconfinedCompression, rounded, "kPa")
        .field("unconfined_compressive_strength", rounded)
        .field("unit", "kPa")
        .field("strain_at_failure", round_dp(strain * 100.0, 2))
        .field("strain_unit", "%")
        .with_classification("consistency", consistency(qu))
        .finish("qu = P / A_corrected"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Input;
    use serde_json::{json, Value};

    fn run(value: Value) -> Result<Calculation, CalculationError> {
        let map: Input = value.as_object().cloned().unwrap_or_default();
        calculate(&Fields::new(&map))
    }

    #[test]
    fn corrects_area_for_deformation() {
        let calc = run(json!({"diameter": 50, "height": 100, "max_load": 2.5, "deformation": 10}))
            .unwrap();
        assert_eq!(calc.value, 1.15);
        assert_eq!(calc.fields["strain_at_failure"], json!(10.0));
        assert_eq!(calc.classification.as_deref(), Some("Very Soft"));
    }

    #[test]
    fn deformation_defaults_to_zero() {
        let calc = run(json!({"diameter": 50, "height": 100, "max_load": 300})).unwrap();
        assert_eq!(calc.fields["strain_at_failure"], json!(0.0));
        assert_eq!(calc.value, 152.79);
        assert_eq!(calc.fields["consistency"], json!("Stiff"));
    }

    #[test]
    fn rejects_full_height_deformation() {
        let err = run(json!({"diameter": 50, "height": 100, "max_load": 2.5, "deformation": 100}))
            .unwrap_err();
        assert!(err.reason.contains("less than specimen height"));
    }

    #[test]
    fn rejects_non_positive_geometry() {
        assert!(run(json!({"diameter": 50, "height": 0, "max_load": 2.5})).is_err());
        assert!(run(json!({"diameter": 50, "height": 100})).is_err());
    }

    #[test]
    fn consistency_bands() {
        assert_eq!(consistency(10.0), "Very Soft");
        assert_eq!(consistency(25.0), "Soft");
        assert_eq!(consistency(99.9), "Medium");
        assert_eq!(consistency(150.0), "Stiff");
        assert_eq!(consistency(399.0), "Very Stiff");
        assert_eq!(consistency(400.0), "Hard");
    }
}

//! Per-standard calculators
//!
//! Each calculator reads its inputs through [`Fields`](crate::input::Fields),
//! checks preconditions, and builds a [`Calculation`](crate::outcome::Calculation)
//! carrying the headline value plus the flat output map.

pub mod atterberg;
pub mod cbr;
pub mod compressive;
pub mod penetration;
pub mod proctor;
pub mod unconfined;

use serde_json::Value;

/// Echo a submitted figure back as JSON, keeping whole numbers integral.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::float_cmp)]
pub(crate) fn echo(value: f64) -> Value {
    let whole = value as i64;
    if value.fract() == 0.0 && whole as f64 == value {
        Value::from(whole)
    } else {
        Value::from(value)
    }
}

/// Cross-sectional area of a cylinder of the given diameter.
pub(crate) fn circle_area(diameter: f64) -> f64 {
    let radius = diameter / 2.0;
    std::f64::consts::PI * radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn echo_keeps_integers_integral() {
        assert_eq!(echo(28.0), json!(28));
        assert_eq!(echo(12.5), json!(12.5));
        assert_eq!(echo(-3.0), json!(-3));
    }
}

//! Supported test standards

use crate::calculators;
use crate::error::CalculationError;
use crate::input::{Fields, Input};
use crate::outcome::Calculation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Test standards with an automated calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Standard {
    /// Penetration of bituminous materials
    #[serde(rename = "ASTM D5")]
    Penetration,
    /// Compressive strength of cylindrical concrete specimens
    #[serde(rename = "ASTM C39")]
    CompressiveStrength,
    /// Modified Proctor compaction
    #[serde(rename = "ASTM D1557")]
    ModifiedProctor,
    /// Unconfined compressive strength of cohesive soil
    #[serde(rename = "ASTM D2166")]
    UnconfinedCompression,
    /// Liquid limit, plastic limit and plasticity index
    #[serde(rename = "ASTM D4318")]
    AtterbergLimits,
    /// California Bearing Ratio
    #[serde(rename = "ASTM D1883")]
    Cbr,
}

impl Standard {
    pub const ALL: [Self; 6] = [
        Self::Penetration,
        Self::CompressiveStrength,
        Self::ModifiedProctor,
        Self::UnconfinedCompression,
        Self::AtterbergLimits,
        Self::Cbr,
    ];

    /// Standard code as written on test methods, e.g. `ASTM C39`
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Penetration => "ASTM D5",
            Self::CompressiveStrength => "ASTM C39",
            Self::ModifiedProctor => "ASTM D1557",
            Self::UnconfinedCompression => "ASTM D2166",
            Self::AtterbergLimits => "ASTM D4318",
            Self::Cbr => "ASTM D1883",
        }
    }

    /// Exact (whitespace-trimmed) code lookup
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Run this standard's calculator.
    ///
    /// # Errors
    ///
    /// Returns [`CalculationError`] when inputs are missing, non-numeric or
    /// outside the calculator's preconditions.
    pub fn calculate(self, input: &Input) -> Result<Calculation, CalculationError> {
        let fields = Fields::new(input);
        match self {
            Self::Penetration => calculators::penetration::calculate(&fields),
            Self::CompressiveStrength => calculators::compressive::calculate(&fields),
            Self::ModifiedProctor => calculators::proctor::calculate(&fields),
            Self::UnconfinedCompression => calculators::unconfined::calculate(&fields),
            Self::AtterbergLimits => calculators::atterberg::calculate(&fields),
            Self::Cbr => calculators::cbr::calculate(&fields),
        }
    }
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

//! Calculator outputs

use crate::standard::Standard;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Pass/fail judgement attached to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
    /// The standard defines no acceptance criterion
    #[serde(rename = "na")]
    NotApplicable,
}

impl Verdict {
    /// Pass when `ok`, fail otherwise
    #[inline]
    #[must_use]
    pub fn from_bool(ok: bool) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    /// Stored representation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NotApplicable => "na",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised verdict text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verdict: '{0}'")]
pub struct UnknownVerdict(pub String);

impl FromStr for Verdict {
    type Err = UnknownVerdict;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "na" => Ok(Self::NotApplicable),
            other => Err(UnknownVerdict(other.to_string())),
        }
    }
}

/// A successful calculation.
///
/// `value`/`unit` is the headline figure recorded as the test result value;
/// `fields` is the full flat output map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub standard: Standard,
    pub value: f64,
    pub unit: String,
    pub verdict: Verdict,
    pub classification: Option<String>,
    pub fields: Map<String, Value>,
}

impl Calculation {
    pub(crate) fn new(standard: Standard, value: f64, unit: &str) -> Self {
        Self {
            standard,
            value,
            unit: unit.to_string(),
            verdict: Verdict::NotApplicable,
            classification: None,
            fields: Map::new(),
        }
    }

    pub(crate) fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = verdict;
        self.field("pass_fail", verdict.as_str())
    }

    pub(crate) fn with_classification(mut self, key: &str, label: &str) -> Self {
        self.classification = Some(label.to_string());
        self.field(key, label)
    }

    pub(crate) fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Adds the trailing `formula` and `standard` keys every calculator reports.
    pub(crate) fn finish(self, formula: &str) -> Self {
        let code = self.standard.code();
        self.field("formula", formula).field("standard", code)
    }
}

/// Result of dispatching a standard code
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Computed(Calculation),
    /// No calculator exists; the technician enters the value by hand
    ManualEntryRequired { standard: String },
}

impl Outcome {
    #[inline]
    #[must_use]
    pub fn manual_entry_required(&self) -> bool {
        matches!(self, Self::ManualEntryRequired { .. })
    }

    #[inline]
    #[must_use]
    pub fn calculation(&self) -> Option<&Calculation> {
        match self {
            Self::Computed(calc) => Some(calc),
            Self::ManualEntryRequired { .. } => None,
        }
    }

    /// Flat key-value rendering
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            Self::Computed(calc) => calc.fields.clone(),
            Self::ManualEntryRequired { standard } => {
                let mut map = Map::new();
                map.insert(
                    "error".to_string(),
                    Value::from(format!("No calculator available for {standard}")),
                );
                map.insert("manual_entry_required".to_string(), Value::Bool(true));
                map
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_round_trips_through_text() {
        for verdict in [Verdict::Pass, Verdict::Fail, Verdict::NotApplicable] {
            assert_eq!(verdict.as_str().parse::<Verdict>().unwrap(), verdict);
        }
        assert!("maybe".parse::<Verdict>().is_err());
    }

    #[test]
    fn verdict_serializes_as_stored_text() {
        let json = serde_json::to_string(&Verdict::NotApplicable).unwrap();
        assert_eq!(json, "\"na\"");
    }

    #[test]
    fn builder_records_classification_and_verdict_fields() {
        let calc = Calculation::new(Standard::Cbr, 12.0, "%")
            .with_classification("subgrade_classification", "Fair")
            .with_verdict(Verdict::Pass)
            .finish("CBR = (Test Load / Standard Load) × 100");

        assert_eq!(calc.classification.as_deref(), Some("Fair"));
        assert_eq!(calc.fields["pass_fail"], Value::from("pass"));
        assert_eq!(calc.fields["standard"], Value::from("ASTM D1883"));
    }
}

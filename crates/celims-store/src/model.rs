//! Row types and column enums

use celims_calc::Verdict;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Stored text that does not match any variant of a column enum
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {$(
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    )+};
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stored representation
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

id_type!(
    UserId,
    ProjectId,
    SampleId,
    MethodId,
    AssignmentId,
    ResultId,
    EquipmentId,
    RawFileId,
    AuditId,
    CustodyId,
);

text_enum!(
    /// Laboratory role; fixed per user
    Role {
        FieldTech => "field_tech",
        Supervisor => "supervisor",
        LabTech => "lab_tech",
        Manager => "manager",
    }
);

text_enum!(ProjectStatus {
    Active => "active",
    Completed => "completed",
    Archived => "archived",
});

text_enum!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Urgent => "urgent",
});

text_enum!(
    /// Primary workflow state of a physical sample
    SampleStatus {
        Registered => "registered",
        Assigned => "assigned",
        InProgress => "in_progress",
        Completed => "completed",
        Approved => "approved",
        Archived => "archived",
    }
);

text_enum!(AssignmentStatus {
    Assigned => "assigned",
    InProgress => "in_progress",
    Completed => "completed",
    Approved => "approved",
    Rejected => "rejected",
});

text_enum!(ResultStatus {
    Draft => "draft",
    Submitted => "submitted",
    Approved => "approved",
    Rejected => "rejected",
});

text_enum!(EquipmentStatus {
    Active => "active",
    Maintenance => "maintenance",
    Calibration => "calibration",
    Retired => "retired",
});

text_enum!(AuditAction {
    Insert => "INSERT",
    Update => "UPDATE",
    Delete => "DELETE",
    Approve => "APPROVE",
    Reject => "REJECT",
});

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// Queue rank, urgent first
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub email: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub code: String,
    pub name: String,
    pub client_name: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ProjectStatus,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMethod {
    pub id: MethodId,
    pub code: String,
    pub name: String,
    /// Standard code used to pick a calculator, e.g. `ASTM D5`
    pub standard: String,
    pub material_type: String,
    /// Default test parameters
    pub parameters: Value,
    pub calculation_formula: Option<String>,
    /// Typical duration in minutes
    pub typical_duration: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub code: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub calibration_date: Option<NaiveDate>,
    pub calibration_due_date: Option<NaiveDate>,
    pub status: EquipmentStatus,
    pub location: Option<String>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    /// Human-readable code, `S-YYYY-MM-DD-NNN`
    pub code: String,
    pub project_id: ProjectId,
    pub material_type: String,
    pub location: Option<String>,
    pub quantity: Option<f64>,
    pub quantity_unit: Option<String>,
    pub collection_date: Option<NaiveDate>,
    pub condition: Option<String>,
    pub priority: Priority,
    pub notes: Option<String>,
    pub status: SampleStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

/// Fields supplied when registering a sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    pub project_id: ProjectId,
    pub material_type: String,
    pub location: Option<String>,
    pub quantity: Option<f64>,
    pub quantity_unit: Option<String>,
    pub collection_date: Option<NaiveDate>,
    pub condition: Option<String>,
    pub priority: Priority,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub sample_id: SampleId,
    pub test_method_id: MethodId,
    pub assigned_to: UserId,
    pub assigned_by: UserId,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub is_deleted: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields supplied when assigning a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub sample_id: SampleId,
    pub test_method_id: MethodId,
    pub assigned_to: UserId,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: ResultId,
    pub assignment_id: AssignmentId,
    pub tested_by: UserId,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub equipment_id: Option<EquipmentId>,
    pub test_parameters: Option<Value>,
    /// Submitted readings exactly as entered
    pub raw_data: Option<Value>,
    pub calculated_results: Option<Value>,
    pub result_value: Option<f64>,
    pub result_unit: Option<String>,
    pub pass_fail: Option<Verdict>,
    pub observations: Option<String>,
    pub status: ResultStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub is_deleted: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Completed-test payload written onto a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub equipment_id: Option<EquipmentId>,
    pub test_parameters: Option<Value>,
    pub raw_data: Value,
    pub calculated_results: Option<Value>,
    pub result_value: f64,
    pub result_unit: String,
    pub pass_fail: Option<Verdict>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFile {
    pub id: RawFileId,
    pub result_id: ResultId,
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// Metadata for an artifact stored elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRawFile {
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub id: CustodyId,
    pub sample_id: SampleId,
    pub custody_at: DateTime<Utc>,
    pub from_person: Option<UserId>,
    pub to_person: UserId,
    pub location: Option<String>,
    pub purpose: Option<String>,
    pub condition: Option<String>,
    pub notes: Option<String>,
}

/// A physical handoff of a sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustody {
    pub sample_id: SampleId,
    pub from_person: Option<UserId>,
    pub to_person: UserId,
    pub location: Option<String>,
    pub purpose: Option<String>,
    pub condition: Option<String>,
    pub notes: Option<String>,
}

/// One audit log row.
///
/// `entry_hash` covers every other field plus `prev_hash`, chaining each row
/// to its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub table_name: String,
    pub record_id: i64,
    pub action: AuditAction,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
    pub request_id: Option<String>,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// Audit row before hashing
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub table_name: &'static str,
    pub record_id: i64,
    pub action: AuditAction,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
    pub request_id: Option<String>,
}

/// Read a nullable verdict column.
pub(crate) fn verdict_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<Verdict>> {
    let text: Option<String> = row.get(column)?;
    text.map(|t| {
        t.parse::<Verdict>().map_err(|e| {
            let idx = row.as_ref().column_index(column).unwrap_or_default();
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_text() {
        for status in SampleStatus::ALL {
            assert_eq!(status.as_str().parse::<SampleStatus>().unwrap(), *status);
        }
        for action in AuditAction::ALL {
            assert_eq!(action.to_string().parse::<AuditAction>().unwrap(), *action);
        }
    }

    #[test]
    fn unknown_text_names_the_enum() {
        let err = "pending".parse::<ResultStatus>().unwrap_err();
        assert_eq!(err.kind, "ResultStatus");
        assert_eq!(err.to_string(), "unknown ResultStatus: 'pending'");
    }

    #[test]
    fn serde_uses_stored_text() {
        assert_eq!(serde_json::to_string(&Role::LabTech).unwrap(), "\"lab_tech\"");
        assert_eq!(serde_json::to_string(&SampleId(7)).unwrap(), "7");
    }

    #[test]
    fn priority_ranks_urgent_first() {
        let mut all = Priority::ALL.to_vec();
        all.sort_by_key(|p| p.rank());
        assert_eq!(all, vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]);
    }
}

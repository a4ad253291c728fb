//! Store errors

use rusqlite::ffi;
use rusqlite::ErrorCode;

/// Errors raised by the entity store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// JSON column could not be encoded or decoded
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Row does not exist (or is soft-deleted)
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Foreign key target is missing or soft-deleted
    #[error("referenced {entity} {id} is missing or deleted")]
    Referential { entity: &'static str, id: i64 },

    /// Uniqueness constraint violated
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// UPDATE or DELETE attempted on an append-only table
    #[error("{table} is append-only")]
    AppendOnly { table: String },

    /// Stored text does not name a known variant
    #[error("invalid value '{value}' for {column}")]
    InvalidValue { column: &'static str, value: String },
}

impl StoreError {
    /// Reclassify a uniqueness violation as [`StoreError::Duplicate`].
    #[must_use]
    pub fn on_unique(self, entity: &'static str, key: impl Into<String>) -> Self {
        match self {
            Self::Sqlite(ref err) if is_unique_violation(err) => Self::Duplicate {
                entity,
                key: key.into(),
            },
            other => other,
        }
    }

    /// Check if the error is a uniqueness violation
    #[inline]
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Check if the error is a transient lock conflict
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let Some(table) = append_only_table(&err) {
            return Self::AppendOnly { table };
        }
        if let Some(unknown) = unknown_variant(&err) {
            return Self::InvalidValue {
                column: unknown.kind,
                value: unknown.value.clone(),
            };
        }
        Self::Sqlite(err)
    }
}

fn append_only_table(err: &rusqlite::Error) -> Option<String> {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.ends_with("is append-only") =>
        {
            msg.split_whitespace().next().map(str::to_string)
        }
        _ => None,
    }
}

fn unknown_variant(err: &rusqlite::Error) -> Option<&crate::model::UnknownVariant> {
    match err {
        rusqlite::Error::FromSqlConversionFailure(_, _, inner) => inner.downcast_ref(),
        _ => None,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

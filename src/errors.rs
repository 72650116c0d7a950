//! Engine failure taxonomy. Every variant is a synchronous, local
//! configuration or data-shape failure; nothing here is retryable.

use crate::dataset::ColumnDomain;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad column reference, bad operator arity, or an unparsable
    /// dashboard definition.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A constraint or aggregation role that does not fit the column's
    /// domain (a numeric range against a categorical column, say).
    #[error("schema mismatch on column '{column}': needs a {expected} column, but it is {actual}")]
    SchemaMismatch {
        column: String,
        expected: ColumnDomain,
        actual: ColumnDomain,
    },

    /// Sum or mean requested over a group with no values. Callers decide
    /// the display fallback; the engine never substitutes NaN.
    #[error("group '{group}' has no values to take the {op} of")]
    EmptyGroup { group: String, op: &'static str },

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}

impl EngineError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        EngineError::Configuration {
            message: message.into(),
        }
    }

    /// Unknown-column error with a case-insensitive suggestion when one
    /// exists. Sheets in the wild disagree on capitalization ("priority"
    /// vs "Priority"), so name the near-miss rather than leave the caller
    /// guessing.
    pub(crate) fn unknown_column<'a>(
        column: &str,
        known: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let suggestion = known
            .into_iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(column));
        let message = match suggestion {
            Some(candidate) => {
                format!("column '{column}' does not exist (did you mean '{candidate}'?)")
            }
            None => format!("column '{column}' does not exist"),
        };
        EngineError::Configuration { message }
    }
}

//! Filter constraints and the mask-building filter pass.
//!
//! Every constraint compiles to a polars boolean expression; the masks
//! are AND-folded and applied in a single scan, so the result is the
//! intersection of all per-column constraint sets no matter how many
//! stages the caller conceptually chains.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::{ColumnDomain, Dataset};
use crate::errors::{EngineError, Result};

/// Per-column restriction. `OneOf` values are kept as text and coerced to
/// the column dtype when the mask is built, the same way ad-hoc filter
/// input arrives from a sidebar or a command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Record matches when its value is a member of the set.
    OneOf(Vec<String>),
    /// Inclusive numeric range; a record with a missing value never
    /// matches.
    Range { min: f64, max: f64 },
    /// Inclusive date range; datetime columns are compared by calendar
    /// date.
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl Constraint {
    /// The column domain this constraint applies to.
    pub fn required_domain(&self) -> ColumnDomain {
        match self {
            Constraint::OneOf(_) => ColumnDomain::Categorical,
            Constraint::Range { .. } => ColumnDomain::Continuous,
            Constraint::DateRange { .. } => ColumnDomain::Temporal,
        }
    }
}

/// One column's active constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: String,
    pub constraint: Constraint,
}

/// The user's current selections: at most one constraint per column,
/// combined as a logical AND. Insertion order is kept for display but
/// does not affect the filtered result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    filters: Vec<ColumnFilter>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the constraint for a column, replacing any previous one.
    pub fn set(&mut self, column: impl Into<String>, constraint: Constraint) {
        let column = column.into();
        if let Some(existing) = self.filters.iter_mut().find(|f| f.column == column) {
            existing.constraint = constraint;
        } else {
            self.filters.push(ColumnFilter { column, constraint });
        }
    }

    /// Remove a column's constraint; returns whether one was present.
    pub fn remove(&mut self, column: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| f.column != column);
        self.filters.len() != before
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn get(&self, column: &str) -> Option<&Constraint> {
        self.filters
            .iter()
            .find(|f| f.column == column)
            .map(|f| &f.constraint)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnFilter> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// What an empty categorical selection means. Dashboards are split
/// between the two readings, so the engine makes the choice explicit
/// instead of hard-coding either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptySelection {
    /// An empty selection places no restriction on the column.
    #[default]
    #[serde(rename = "all")]
    MatchAll,
    /// An empty selection excludes every record.
    #[serde(rename = "none")]
    MatchNone,
}

/// What to do with a constraint naming a column the dataset lacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownColumn {
    /// Signal a configuration error before anything is computed.
    #[default]
    Error,
    /// Skip the constraint; useful when one dashboard definition serves
    /// sheets with drifting schemas.
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub empty_selection: EmptySelection,
    pub unknown_column: UnknownColumn,
}

/// Apply every constraint in `state` to `dataset`, returning the records
/// that satisfy all of them with their relative order preserved. Columns
/// absent from `state` are unconstrained.
pub fn apply_filters(
    dataset: &Dataset,
    state: &FilterState,
    options: &FilterOptions,
) -> Result<Dataset> {
    let mut mask: Option<Expr> = None;
    for filter in state.iter() {
        let Some(expr) = constraint_mask(dataset, filter, options)? else {
            continue;
        };
        mask = Some(match mask {
            Some(current) => current.and(expr),
            None => expr,
        });
    }

    match mask {
        Some(mask) => {
            let df = dataset.frame().clone().lazy().filter(mask).collect()?;
            Ok(dataset.derived(df))
        }
        None => Ok(dataset.clone()),
    }
}

/// Compile one column's constraint to a boolean expression. `Ok(None)`
/// means the constraint places no restriction.
fn constraint_mask(
    dataset: &Dataset,
    filter: &ColumnFilter,
    options: &FilterOptions,
) -> Result<Option<Expr>> {
    let domain = match dataset.domain(&filter.column) {
        Some(domain) => domain,
        None => match options.unknown_column {
            UnknownColumn::Ignore => {
                log::debug!("ignoring filter on unknown column '{}'", filter.column);
                return Ok(None);
            }
            UnknownColumn::Error => {
                let columns = dataset.columns();
                return Err(EngineError::unknown_column(
                    &filter.column,
                    columns.iter().map(String::as_str),
                ));
            }
        },
    };

    let required = filter.constraint.required_domain();
    if domain != required {
        return Err(EngineError::SchemaMismatch {
            column: filter.column.clone(),
            expected: required,
            actual: domain,
        });
    }

    match &filter.constraint {
        Constraint::OneOf(values) if values.is_empty() => match options.empty_selection {
            EmptySelection::MatchAll => Ok(None),
            EmptySelection::MatchNone => Ok(Some(lit(false))),
        },
        Constraint::OneOf(values) => {
            let dtype = dataset.dtype(&filter.column);
            let mut membership: Option<Expr> = None;
            for value in values {
                let term = col(&filter.column).eq(typed_lit(dtype, value));
                membership = Some(match membership {
                    Some(current) => current.or(term),
                    None => term,
                });
            }
            Ok(membership)
        }
        Constraint::Range { min, max } => {
            let expr = col(&filter.column)
                .gt_eq(lit(*min))
                .and(col(&filter.column).lt_eq(lit(*max)));
            Ok(Some(expr))
        }
        Constraint::DateRange { start, end } => {
            // Datetime columns compare by calendar date so the end bound
            // stays inclusive for the whole day.
            let target = match dataset.dtype(&filter.column) {
                Some(DataType::Datetime(_, _)) => col(&filter.column).cast(DataType::Date),
                _ => col(&filter.column),
            };
            let expr = target
                .clone()
                .gt_eq(lit(*start))
                .and(target.lt_eq(lit(*end)));
            Ok(Some(expr))
        }
    }
}

/// Coerce a textual selection value to a literal of the column's dtype.
/// Values that fail to parse fall back to string literals, which simply
/// never match a typed column.
fn typed_lit(dtype: Option<&DataType>, value: &str) -> Expr {
    let Some(dtype) = dtype else {
        return lit(value);
    };
    match dtype {
        DataType::Float32 | DataType::Float64 => value
            .parse::<f64>()
            .map(lit)
            .unwrap_or_else(|_| lit(value)),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => value
            .parse::<i64>()
            .map(lit)
            .unwrap_or_else(|_| lit(value)),
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => value
            .parse::<u64>()
            .map(lit)
            .unwrap_or_else(|_| lit(value)),
        DataType::Boolean => value
            .parse::<bool>()
            .map(lit)
            .unwrap_or_else(|_| lit(value)),
        _ => lit(value),
    }
}

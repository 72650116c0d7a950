//! Immutable tabular snapshot for one dashboard session: a polars
//! `DataFrame` plus a per-column domain classification and the captured
//! category levels of every categorical column.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{EngineError, Result};

/// Days from 0001-01-01 (CE) to the Unix epoch; polars stores `Date`
/// values as days since the epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// How a column participates in filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnDomain {
    /// Finite set of observed values; filtered by value membership.
    Categorical,
    /// Numeric; filtered by an inclusive `[min, max]` range.
    Continuous,
    /// Date or datetime; filtered by an inclusive date range.
    Temporal,
}

impl fmt::Display for ColumnDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDomain::Categorical => write!(f, "categorical"),
            ColumnDomain::Continuous => write!(f, "continuous"),
            ColumnDomain::Temporal => write!(f, "temporal"),
        }
    }
}

/// A single cell value drawn from a categorical column. Used for category
/// levels and aggregation group keys, so it must be `Ord` and `Hash`.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Datum::*;
        fn discriminant(v: &Datum) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Int(_) => 2,
                Float(_) => 3,
                Str(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Datum {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Datum::Str(s) => s.hash(state),
            Datum::Int(i) => i.hash(state),
            Datum::Float(f) => f.to_bits().hash(state),
            Datum::Bool(b) => b.hash(state),
            Datum::Date(d) => d.hash(state),
            Datum::Null => {}
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Str(s) => write!(f, "{s}"),
            Datum::Int(i) => write!(f, "{i}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::Date(d) => write!(f, "{d}"),
            Datum::Null => write!(f, "<null>"),
        }
    }
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Datum::Str(s) => serializer.serialize_str(s),
            Datum::Int(i) => serializer.serialize_i64(*i),
            Datum::Float(v) => serializer.serialize_f64(*v),
            Datum::Bool(b) => serializer.serialize_bool(*b),
            Datum::Date(d) => serializer.collect_str(d),
            Datum::Null => serializer.serialize_none(),
        }
    }
}

impl Datum {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Float(v) => Some(*v),
            Datum::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub(crate) fn from_any(value: &AnyValue) -> Datum {
        match value {
            AnyValue::Null => Datum::Null,
            AnyValue::Boolean(b) => Datum::Bool(*b),
            AnyValue::String(s) => Datum::Str((*s).to_string()),
            AnyValue::StringOwned(s) => Datum::Str(s.to_string()),
            AnyValue::Int8(v) => Datum::Int(*v as i64),
            AnyValue::Int16(v) => Datum::Int(*v as i64),
            AnyValue::Int32(v) => Datum::Int(*v as i64),
            AnyValue::Int64(v) => Datum::Int(*v),
            AnyValue::UInt8(v) => Datum::Int(*v as i64),
            AnyValue::UInt16(v) => Datum::Int(*v as i64),
            AnyValue::UInt32(v) => Datum::Int(*v as i64),
            AnyValue::UInt64(v) => Datum::Int(*v as i64),
            AnyValue::Float32(v) => Datum::Float(*v as f64),
            AnyValue::Float64(v) => Datum::Float(*v),
            AnyValue::Date(days) => date_from_epoch_days(*days)
                .map(Datum::Date)
                .unwrap_or(Datum::Null),
            other => Datum::Str(other.to_string()),
        }
    }
}

pub(crate) fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

pub(crate) fn is_numeric_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn infer_domain(dtype: &DataType) -> ColumnDomain {
    if is_numeric_type(dtype) {
        return ColumnDomain::Continuous;
    }
    match dtype {
        DataType::Date | DataType::Datetime(_, _) => ColumnDomain::Temporal,
        _ => ColumnDomain::Categorical,
    }
}

/// The full loaded table for a session. Owned by the session and never
/// mutated; filtering produces a derived `Dataset` that shares the
/// parent's domain map and category levels, so dense aggregation can
/// still see categories the current filter excluded.
#[derive(Clone, Debug)]
pub struct Dataset {
    df: DataFrame,
    dtypes: BTreeMap<String, DataType>,
    domains: BTreeMap<String, ColumnDomain>,
    category_levels: BTreeMap<String, Vec<Datum>>,
}

impl Dataset {
    /// Build a dataset with domains inferred from the frame's dtypes:
    /// numeric columns are continuous, date/datetime columns temporal,
    /// everything else categorical.
    pub fn new(df: DataFrame) -> Result<Self> {
        Self::with_domains(df, &BTreeMap::new())
    }

    /// Build a dataset, reclassifying the columns named in `overrides`.
    /// Survey sheets encode categories as small integers (education level
    /// 1-5, satisfaction 1-4); declaring those categorical makes them
    /// groupable and gives them captured levels.
    pub fn with_domains(
        df: DataFrame,
        overrides: &BTreeMap<String, ColumnDomain>,
    ) -> Result<Self> {
        let mut dtypes = BTreeMap::new();
        let mut domains = BTreeMap::new();
        for column in df.get_columns() {
            let name = column.name().to_string();
            let dtype = column.dtype().clone();
            let domain = overrides
                .get(&name)
                .copied()
                .unwrap_or_else(|| infer_domain(&dtype));
            dtypes.insert(name.clone(), dtype);
            domains.insert(name, domain);
        }
        for name in overrides.keys() {
            if !dtypes.contains_key(name) {
                return Err(EngineError::unknown_column(
                    name,
                    dtypes.keys().map(String::as_str),
                ));
            }
        }

        let mut category_levels = BTreeMap::new();
        for (name, domain) in &domains {
            if *domain == ColumnDomain::Categorical {
                category_levels.insert(name.clone(), first_seen_levels(&df, name)?);
            }
        }

        Ok(Self {
            df,
            dtypes,
            domains,
            category_levels,
        })
    }

    /// A filtered view over the same schema: the frame changes, the
    /// domain map and category levels are carried from the parent.
    pub(crate) fn derived(&self, df: DataFrame) -> Self {
        Self {
            df,
            dtypes: self.dtypes.clone(),
            domains: self.domains.clone(),
            category_levels: self.category_levels.clone(),
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    /// Number of records.
    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    /// Column names in frame order.
    pub fn columns(&self) -> Vec<String> {
        self.df
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn domain(&self, column: &str) -> Option<ColumnDomain> {
        self.domains.get(column).copied()
    }

    pub(crate) fn dtype(&self, column: &str) -> Option<&DataType> {
        self.dtypes.get(column)
    }

    pub(crate) fn is_numeric(&self, column: &str) -> bool {
        self.dtypes.get(column).is_some_and(is_numeric_type)
    }

    /// Domain of `column`, or an unknown-column error with a
    /// case-insensitive suggestion.
    pub(crate) fn require(&self, column: &str) -> Result<ColumnDomain> {
        self.domain(column).ok_or_else(|| {
            EngineError::unknown_column(column, self.dtypes.keys().map(String::as_str))
        })
    }

    /// Category levels captured from the full dataset at construction, in
    /// first-seen order, nulls excluded. `None` for non-categorical
    /// columns.
    pub fn category_levels(&self, column: &str) -> Option<&[Datum]> {
        self.category_levels.get(column).map(Vec::as_slice)
    }

    /// Min and max of a numeric column, ignoring nulls. `None` when the
    /// column has no values.
    pub fn numeric_extent(&self, column: &str) -> Result<Option<(f64, f64)>> {
        let values = self.df.column(column)?.cast(&DataType::Float64)?;
        let values = values.f64()?;
        match (values.min(), values.max()) {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    /// Earliest and latest date of a temporal column, ignoring nulls.
    pub fn date_extent(&self, column: &str) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let days = self
            .df
            .column(column)?
            .cast(&DataType::Date)?
            .cast(&DataType::Int32)?;
        let days = days.i32()?;
        match (days.min(), days.max()) {
            (Some(min), Some(max)) => {
                match (date_from_epoch_days(min), date_from_epoch_days(max)) {
                    (Some(start), Some(end)) => Ok(Some((start, end))),
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }
}

fn first_seen_levels(df: &DataFrame, column: &str) -> Result<Vec<Datum>> {
    let values = df.column(column)?;
    let mut seen = HashSet::new();
    let mut levels = Vec::new();
    for i in 0..df.height() {
        let value = Datum::from_any(&values.get(i)?);
        if value == Datum::Null {
            continue;
        }
        if seen.insert(value.clone()) {
            levels.push(value);
        }
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn survey_frame() -> DataFrame {
        df!(
            "Department" => &["Sales", "R&D", "Sales", "HR", "R&D"],
            "Age" => &[25i64, 30, 35, 40, 45],
            "Rating" => &[3i64, 4, 2, 5, 1],
        )
        .unwrap()
    }

    #[test]
    fn infers_domains_from_dtypes() {
        let ds = Dataset::new(survey_frame()).unwrap();
        assert_eq!(ds.domain("Department"), Some(ColumnDomain::Categorical));
        assert_eq!(ds.domain("Age"), Some(ColumnDomain::Continuous));
        assert_eq!(ds.domain("Rating"), Some(ColumnDomain::Continuous));
        assert_eq!(ds.domain("Missing"), None);
    }

    #[test]
    fn override_reclassifies_numeric_column() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Rating".to_string(), ColumnDomain::Categorical);
        let ds = Dataset::with_domains(survey_frame(), &overrides).unwrap();
        assert_eq!(ds.domain("Rating"), Some(ColumnDomain::Categorical));
        let levels = ds.category_levels("Rating").unwrap();
        assert_eq!(
            levels,
            &[Datum::Int(3), Datum::Int(4), Datum::Int(2), Datum::Int(5), Datum::Int(1)]
        );
    }

    #[test]
    fn override_of_unknown_column_is_an_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert("rating".to_string(), ColumnDomain::Categorical);
        let err = Dataset::with_domains(survey_frame(), &overrides).unwrap_err();
        assert!(err.to_string().contains("did you mean 'Rating'"));
    }

    #[test]
    fn category_levels_are_first_seen_and_unique() {
        let ds = Dataset::new(survey_frame()).unwrap();
        let levels = ds.category_levels("Department").unwrap();
        assert_eq!(
            levels,
            &[
                Datum::Str("Sales".into()),
                Datum::Str("R&D".into()),
                Datum::Str("HR".into())
            ]
        );
    }

    #[test]
    fn levels_skip_nulls() {
        let df = df!(
            "State" => &[Some("Open"), None, Some("Done"), Some("Open")],
        )
        .unwrap();
        let ds = Dataset::new(df).unwrap();
        assert_eq!(
            ds.category_levels("State").unwrap(),
            &[Datum::Str("Open".into()), Datum::Str("Done".into())]
        );
    }

    #[test]
    fn numeric_extent_spans_column() {
        let ds = Dataset::new(survey_frame()).unwrap();
        assert_eq!(ds.numeric_extent("Age").unwrap(), Some((25.0, 45.0)));
    }

    #[test]
    fn datum_ordering_is_total() {
        let mut values = vec![
            Datum::Str("b".into()),
            Datum::Int(2),
            Datum::Str("a".into()),
            Datum::Null,
            Datum::Int(1),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Datum::Null,
                Datum::Int(1),
                Datum::Int(2),
                Datum::Str("a".into()),
                Datum::Str("b".into()),
            ]
        );
    }
}

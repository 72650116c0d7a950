//! Grouped and ungrouped aggregation over a (usually filtered) dataset.
//!
//! One stable grouping pass per call; group keys come back in first-seen
//! order unless the caller asks for a sorted presentation, and sparse
//! results can be densified over the category levels captured from the
//! full dataset.

use std::collections::HashSet;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::{ColumnDomain, Dataset, Datum};
use crate::errors::{EngineError, Result};

/// Internal name for the aggregated value column.
const VALUE_COLUMN: &str = "__datsift_value";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggOp {
    /// Number of records in the group, nulls included.
    #[default]
    Count,
    Sum,
    Mean,
}

impl AggOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggOp::Count => "count",
            AggOp::Sum => "sum",
            AggOp::Mean => "mean",
        }
    }

    pub fn iterator() -> impl Iterator<Item = AggOp> {
        [AggOp::Count, AggOp::Sum, AggOp::Mean].iter().copied()
    }
}

/// Presentation order of group keys. Unordered chart axes are a steady
/// source of visual churn, so the order is always an explicit choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    /// Order of first appearance in the aggregated dataset (category
    /// level order when densified).
    #[default]
    FirstSeen,
    /// Ascending by group key.
    KeyAscending,
    /// Descending by aggregated value, the usual ranked bar and pie
    /// presentation.
    ValueDescending,
}

/// Whether groups with no records appear in the result.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum GroupFill {
    /// Omit empty groups.
    #[default]
    Sparse,
    /// Cross-product over the captured category levels of the group
    /// columns. Counts fill with zero; sum and mean use `default`, and
    /// with no default an empty group is an error.
    Dense { default: Option<f64> },
}

/// One grouped aggregation: one or two categorical group columns, an
/// operator, and (for sum/mean) a numeric metric column.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSpec {
    pub group_columns: Vec<String>,
    pub metric: Option<String>,
    pub op: AggOp,
    pub key_order: KeyOrder,
    pub fill: GroupFill,
}

impl AggregationSpec {
    pub fn new(
        group_columns: impl IntoIterator<Item = impl Into<String>>,
        metric: Option<impl Into<String>>,
        op: AggOp,
    ) -> Self {
        Self {
            group_columns: group_columns.into_iter().map(Into::into).collect(),
            metric: metric.map(Into::into),
            op,
            key_order: KeyOrder::default(),
            fill: GroupFill::default(),
        }
    }

    /// Record counts per group of `column`.
    pub fn count(column: impl Into<String>) -> Self {
        Self::new([column.into()], None::<String>, AggOp::Count)
    }

    pub fn with_key_order(mut self, key_order: KeyOrder) -> Self {
        self.key_order = key_order;
        self
    }

    pub fn with_fill(mut self, fill: GroupFill) -> Self {
        self.fill = fill;
        self
    }
}

/// One group's key and aggregated value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: Vec<Datum>,
    pub value: f64,
}

/// Grouped aggregation output, ordered for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_columns: Vec<String>,
    pub op: AggOp,
    pub groups: Vec<GroupSummary>,
}

impl AggregationResult {
    pub fn get(&self, key: &[Datum]) -> Option<f64> {
        self.groups
            .iter()
            .find(|g| g.key.as_slice() == key)
            .map(|g| g.value)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of all group values.
    pub fn total(&self) -> f64 {
        self.groups.iter().map(|g| g.value).sum()
    }
}

fn key_label(key: &[Datum]) -> String {
    key.iter()
        .map(Datum::to_string)
        .collect::<Vec<_>>()
        .join(" / ")
}

fn validate(dataset: &Dataset, spec: &AggregationSpec) -> Result<()> {
    if spec.group_columns.is_empty() || spec.group_columns.len() > 2 {
        return Err(EngineError::config(format!(
            "aggregation takes one or two group columns, got {}",
            spec.group_columns.len()
        )));
    }
    for column in &spec.group_columns {
        let domain = dataset.require(column)?;
        if domain != ColumnDomain::Categorical {
            return Err(EngineError::SchemaMismatch {
                column: column.clone(),
                expected: ColumnDomain::Categorical,
                actual: domain,
            });
        }
    }
    if spec.op != AggOp::Count {
        let metric = spec.metric.as_deref().ok_or_else(|| {
            EngineError::config(format!("{} needs a metric column", spec.op.as_str()))
        })?;
        let domain = dataset.require(metric)?;
        if !dataset.is_numeric(metric) {
            return Err(EngineError::SchemaMismatch {
                column: metric.to_string(),
                expected: ColumnDomain::Continuous,
                actual: domain,
            });
        }
    }
    Ok(())
}

/// Group `dataset` by the requested columns and aggregate the metric.
/// Sparse results omit empty groups; dense results cover the full
/// cross-product of captured category levels.
pub fn aggregate(dataset: &Dataset, spec: &AggregationSpec) -> Result<AggregationResult> {
    validate(dataset, spec)?;

    let group_exprs: Vec<Expr> = spec.group_columns.iter().map(|c| col(c.as_str())).collect();
    let agg_expr = match spec.op {
        AggOp::Count => len().alias(VALUE_COLUMN),
        AggOp::Sum => col(spec.metric.as_deref().unwrap_or_default())
            .sum()
            .alias(VALUE_COLUMN),
        AggOp::Mean => col(spec.metric.as_deref().unwrap_or_default())
            .mean()
            .alias(VALUE_COLUMN),
    };

    let df = dataset
        .frame()
        .clone()
        .lazy()
        .group_by_stable(group_exprs)
        .agg([agg_expr])
        .collect()?;

    let key_columns = spec
        .group_columns
        .iter()
        .map(|c| df.column(c))
        .collect::<PolarsResult<Vec<_>>>()?;
    let values = df.column(VALUE_COLUMN)?.cast(&DataType::Float64)?;
    let values = values.f64()?;

    let mut groups = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let key = key_columns
            .iter()
            .map(|c| c.get(i).map(|v| Datum::from_any(&v)))
            .collect::<PolarsResult<Vec<_>>>()?;
        // A group exists but its metric has no values: all-null sum/mean.
        let value = match values.get(i) {
            Some(value) => value,
            None => {
                return Err(EngineError::EmptyGroup {
                    group: key_label(&key),
                    op: spec.op.as_str(),
                })
            }
        };
        groups.push(GroupSummary { key, value });
    }

    if let GroupFill::Dense { default } = spec.fill {
        groups = densify(dataset, spec, groups, default)?;
    }

    match spec.key_order {
        KeyOrder::FirstSeen => {}
        KeyOrder::KeyAscending => groups.sort_by(|a, b| a.key.cmp(&b.key)),
        KeyOrder::ValueDescending => groups.sort_by(|a, b| b.value.total_cmp(&a.value)),
    }

    Ok(AggregationResult {
        group_columns: spec.group_columns.clone(),
        op: spec.op,
        groups,
    })
}

/// Expand a sparse result to the cross-product of category levels, in
/// level order. Observed groups outside the levels (null keys) keep their
/// position after the expected ones.
fn densify(
    dataset: &Dataset,
    spec: &AggregationSpec,
    observed: Vec<GroupSummary>,
    default: Option<f64>,
) -> Result<Vec<GroupSummary>> {
    let level_sets = spec
        .group_columns
        .iter()
        .map(|column| {
            dataset.category_levels(column).ok_or_else(|| {
                EngineError::config(format!(
                    "dense fill needs captured category levels for column '{column}'"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut expected: Vec<Vec<Datum>> = Vec::new();
    match level_sets.as_slice() {
        [levels] => {
            for level in *levels {
                expected.push(vec![level.clone()]);
            }
        }
        [first, second] => {
            for a in *first {
                for b in *second {
                    expected.push(vec![a.clone(), b.clone()]);
                }
            }
        }
        _ => unreachable!("group column count validated earlier"),
    }

    let mut filled = Vec::with_capacity(expected.len());
    let mut used: HashSet<Vec<Datum>> = HashSet::new();
    for key in expected {
        let value = match observed.iter().find(|g| g.key == key) {
            Some(group) => group.value,
            None => match spec.op {
                AggOp::Count => 0.0,
                AggOp::Sum | AggOp::Mean => default.ok_or_else(|| EngineError::EmptyGroup {
                    group: key_label(&key),
                    op: spec.op.as_str(),
                })?,
            },
        };
        used.insert(key.clone());
        filled.push(GroupSummary { key, value });
    }
    for group in observed {
        if !used.contains(&group.key) {
            filled.push(group);
        }
    }
    Ok(filled)
}

/// Collapse a dataset to a single scalar: the KPI row of a dashboard.
/// Sum and mean over a set with no values are an error, never NaN.
pub fn reduce(dataset: &Dataset, metric: Option<&str>, op: AggOp) -> Result<f64> {
    match op {
        AggOp::Count => Ok(dataset.height() as f64),
        AggOp::Sum | AggOp::Mean => {
            let metric = metric.ok_or_else(|| {
                EngineError::config(format!("{} needs a metric column", op.as_str()))
            })?;
            let domain = dataset.require(metric)?;
            if !dataset.is_numeric(metric) {
                return Err(EngineError::SchemaMismatch {
                    column: metric.to_string(),
                    expected: ColumnDomain::Continuous,
                    actual: domain,
                });
            }
            let values = dataset.frame().column(metric)?.cast(&DataType::Float64)?;
            let values = values.f64()?;
            if values.len() == values.null_count() {
                return Err(EngineError::EmptyGroup {
                    group: "(all records)".to_string(),
                    op: op.as_str(),
                });
            }
            match op {
                AggOp::Sum => Ok(values.sum().unwrap_or(0.0)),
                AggOp::Mean => values.mean().ok_or_else(|| EngineError::EmptyGroup {
                    group: "(all records)".to_string(),
                    op: op.as_str(),
                }),
                AggOp::Count => unreachable!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{apply_filters, Constraint, FilterOptions, FilterState};
    use std::collections::BTreeMap;

    fn ratings() -> Dataset {
        let df = df!(
            "Department" => &["A", "A", "B", "B", "C"],
            "Rating" => &[3i64, 4, 2, 5, 1],
        )
        .unwrap();
        Dataset::new(df).unwrap()
    }

    fn keys(result: &AggregationResult) -> Vec<String> {
        result
            .groups
            .iter()
            .map(|g| super::key_label(&g.key))
            .collect()
    }

    #[test]
    fn mean_rating_by_department_after_filter() {
        let ds = ratings();
        let mut state = FilterState::new();
        state.set("Department", Constraint::OneOf(vec!["A".into(), "B".into()]));
        let filtered = apply_filters(&ds, &state, &FilterOptions::default()).unwrap();

        let spec = AggregationSpec::new(["Department"], Some("Rating"), AggOp::Mean);
        let result = aggregate(&filtered, &spec).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get(&[Datum::Str("A".into())]), Some(3.5));
        assert_eq!(result.get(&[Datum::Str("B".into())]), Some(3.5));
        assert_eq!(result.get(&[Datum::Str("C".into())]), None);
    }

    #[test]
    fn count_groups_sum_to_record_count() {
        let ds = ratings();
        let spec = AggregationSpec::count("Department");
        let result = aggregate(&ds, &spec).unwrap();
        assert_eq!(result.total(), ds.height() as f64);
    }

    #[test]
    fn keys_come_back_in_first_seen_order() {
        let df = df!(
            "State" => &["Open", "Done", "Open", "Blocked", "Done"],
        )
        .unwrap();
        let ds = Dataset::new(df).unwrap();
        let result = aggregate(&ds, &AggregationSpec::count("State")).unwrap();
        assert_eq!(keys(&result), vec!["Open", "Done", "Blocked"]);
    }

    #[test]
    fn key_ascending_order_sorts_by_key() {
        let df = df!(
            "State" => &["Open", "Done", "Open", "Blocked", "Done"],
        )
        .unwrap();
        let ds = Dataset::new(df).unwrap();
        let spec = AggregationSpec::count("State").with_key_order(KeyOrder::KeyAscending);
        let result = aggregate(&ds, &spec).unwrap();
        assert_eq!(keys(&result), vec!["Blocked", "Done", "Open"]);
    }

    #[test]
    fn value_descending_order_sorts_by_count() {
        let df = df!(
            "State" => &["Open", "Done", "Open", "Blocked", "Open"],
        )
        .unwrap();
        let ds = Dataset::new(df).unwrap();
        let spec = AggregationSpec::count("State").with_key_order(KeyOrder::ValueDescending);
        let result = aggregate(&ds, &spec).unwrap();
        assert_eq!(keys(&result), vec!["Open", "Done", "Blocked"]);
        assert_eq!(result.groups[0].value, 3.0);
    }

    #[test]
    fn dense_count_includes_filtered_out_levels_as_zero() {
        let ds = ratings();
        let mut state = FilterState::new();
        state.set("Department", Constraint::OneOf(vec!["A".into()]));
        let filtered = apply_filters(&ds, &state, &FilterOptions::default()).unwrap();

        let spec = AggregationSpec::count("Department")
            .with_fill(GroupFill::Dense { default: None });
        let result = aggregate(&filtered, &spec).unwrap();
        assert_eq!(keys(&result), vec!["A", "B", "C"]);
        assert_eq!(result.get(&[Datum::Str("B".into())]), Some(0.0));
        assert_eq!(result.total(), filtered.height() as f64);
    }

    #[test]
    fn dense_sum_without_default_is_an_empty_group_error() {
        let ds = ratings();
        let mut state = FilterState::new();
        state.set("Department", Constraint::OneOf(vec!["A".into()]));
        let filtered = apply_filters(&ds, &state, &FilterOptions::default()).unwrap();

        let spec = AggregationSpec::new(["Department"], Some("Rating"), AggOp::Sum)
            .with_fill(GroupFill::Dense { default: None });
        let err = aggregate(&filtered, &spec).unwrap_err();
        assert!(matches!(err, EngineError::EmptyGroup { .. }));
    }

    #[test]
    fn dense_sum_with_default_fills_empty_groups() {
        let ds = ratings();
        let mut state = FilterState::new();
        state.set("Department", Constraint::OneOf(vec!["A".into()]));
        let filtered = apply_filters(&ds, &state, &FilterOptions::default()).unwrap();

        let spec = AggregationSpec::new(["Department"], Some("Rating"), AggOp::Sum)
            .with_fill(GroupFill::Dense { default: Some(0.0) });
        let result = aggregate(&filtered, &spec).unwrap();
        assert_eq!(result.get(&[Datum::Str("A".into())]), Some(7.0));
        assert_eq!(result.get(&[Datum::Str("C".into())]), Some(0.0));
    }

    #[test]
    fn two_column_dense_grid_covers_the_cross_product() {
        let df = df!(
            "Priority" => &["High", "Low", "High"],
            "Progress" => &["Started", "Started", "Done"],
        )
        .unwrap();
        let ds = Dataset::new(df).unwrap();
        let spec = AggregationSpec::new(["Priority", "Progress"], None::<String>, AggOp::Count)
            .with_fill(GroupFill::Dense { default: None });
        let result = aggregate(&ds, &spec).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(
            result.get(&[Datum::Str("Low".into()), Datum::Str("Done".into())]),
            Some(0.0)
        );
        assert_eq!(
            result.get(&[Datum::Str("High".into()), Datum::Str("Started".into())]),
            Some(1.0)
        );
        assert_eq!(result.total(), 3.0);
    }

    #[test]
    fn all_null_metric_group_is_an_empty_group_error() {
        let df = df!(
            "Department" => &["A", "B"],
            "Bonus" => &[Some(100.0f64), None],
        )
        .unwrap();
        let ds = Dataset::new(df).unwrap();
        let spec = AggregationSpec::new(["Department"], Some("Bonus"), AggOp::Mean);
        let err = aggregate(&ds, &spec).unwrap_err();
        match err {
            EngineError::EmptyGroup { group, op } => {
                assert_eq!(group, "B");
                assert_eq!(op, "mean");
            }
            other => panic!("expected EmptyGroup, got {other}"),
        }
    }

    #[test]
    fn grouping_by_a_continuous_column_is_a_schema_mismatch() {
        let ds = ratings();
        let spec = AggregationSpec::count("Rating");
        let err = aggregate(&ds, &spec).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn grouping_by_overridden_numeric_column_works() {
        let df = df!(
            "Satisfaction" => &[3i64, 3, 4, 1],
        )
        .unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert("Satisfaction".to_string(), ColumnDomain::Categorical);
        let ds = Dataset::with_domains(df, &overrides).unwrap();
        let result = aggregate(&ds, &AggregationSpec::count("Satisfaction")).unwrap();
        assert_eq!(result.get(&[Datum::Int(3)]), Some(2.0));
        assert_eq!(result.get(&[Datum::Int(1)]), Some(1.0));
    }

    #[test]
    fn sum_without_metric_is_a_configuration_error() {
        let ds = ratings();
        let spec = AggregationSpec::new(["Department"], None::<String>, AggOp::Sum);
        let err = aggregate(&ds, &spec).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn reduce_computes_kpis() {
        let ds = ratings();
        assert_eq!(reduce(&ds, None, AggOp::Count).unwrap(), 5.0);
        assert_eq!(reduce(&ds, Some("Rating"), AggOp::Sum).unwrap(), 15.0);
        assert_eq!(reduce(&ds, Some("Rating"), AggOp::Mean).unwrap(), 3.0);
    }

    #[test]
    fn reduce_over_no_values_is_an_empty_group_error() {
        let df = df!(
            "Total" => &[Option::<f64>::None, None],
        )
        .unwrap();
        let ds = Dataset::new(df).unwrap();
        let err = reduce(&ds, Some("Total"), AggOp::Mean).unwrap_err();
        assert!(matches!(err, EngineError::EmptyGroup { .. }));
    }
}

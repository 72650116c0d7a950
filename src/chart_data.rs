//! Prepare chart data from a filtered dataset: grouped totals for bar and
//! pie charts, binned counts for histograms, dense grids for heatmaps and
//! stacked bars. Emits plain data only; drawing belongs to the caller.

use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, AggOp, AggregationSpec, GroupFill, KeyOrder};
use crate::dataset::{ColumnDomain, Dataset, Datum};
use crate::errors::{EngineError, Result};
use polars::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Pie,
    Histogram,
    Heatmap,
    StackedBar,
}

impl ChartKind {
    pub const ALL: [Self; 5] = [
        Self::Bar,
        Self::Pie,
        Self::Histogram,
        Self::Heatmap,
        Self::StackedBar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Pie => "pie",
            Self::Histogram => "histogram",
            Self::Heatmap => "heatmap",
            Self::StackedBar => "stacked_bar",
        }
    }
}

fn default_bins() -> usize {
    10
}

/// Declaration of one chart: what to group or bin, and how to summarize.
/// Deserialized straight from the dashboard definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    /// Category axis column; the binned column for histograms.
    pub column: String,
    /// Second categorical column for heatmaps and stacked bars.
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub op: AggOp,
    #[serde(default)]
    pub order: KeyOrder,
    #[serde(default = "default_bins")]
    pub bins: usize,
}

/// Chart-ready data, one shape per family of chart kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ChartData {
    /// Bar and pie charts: one value per category label.
    Categories {
        title: String,
        kind: ChartKind,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    /// Histograms: `edges` has one more entry than `counts`; the last
    /// bin includes its upper edge.
    Bins {
        title: String,
        column: String,
        edges: Vec<f64>,
        counts: Vec<u64>,
    },
    /// Heatmaps and stacked bars: one row of values per series label,
    /// all rows sharing the category axis.
    Grid {
        title: String,
        kind: ChartKind,
        categories: Vec<String>,
        series: Vec<String>,
        values: Vec<Vec<f64>>,
    },
}

/// Build the data for one chart from the (already filtered) dataset.
pub fn build_chart(dataset: &Dataset, spec: &ChartSpec) -> Result<ChartData> {
    match spec.kind {
        ChartKind::Bar | ChartKind::Pie => categorical_chart(dataset, spec),
        ChartKind::Histogram => histogram_chart(dataset, spec),
        ChartKind::Heatmap | ChartKind::StackedBar => grid_chart(dataset, spec),
    }
}

fn categorical_chart(dataset: &Dataset, spec: &ChartSpec) -> Result<ChartData> {
    let agg = AggregationSpec::new([spec.column.clone()], spec.metric.clone(), spec.op)
        .with_key_order(spec.order);
    let result = aggregate(dataset, &agg)?;

    let mut labels = Vec::with_capacity(result.len());
    let mut values = Vec::with_capacity(result.len());
    for group in &result.groups {
        labels.push(key_text(&group.key));
        values.push(group.value);
    }
    Ok(ChartData::Categories {
        title: spec.title.clone(),
        kind: spec.kind,
        labels,
        values,
    })
}

fn histogram_chart(dataset: &Dataset, spec: &ChartSpec) -> Result<ChartData> {
    let domain = dataset.require(&spec.column)?;
    if domain != ColumnDomain::Continuous {
        return Err(EngineError::SchemaMismatch {
            column: spec.column.clone(),
            expected: ColumnDomain::Continuous,
            actual: domain,
        });
    }
    if spec.bins == 0 {
        return Err(EngineError::config(format!(
            "chart '{}' needs at least one histogram bin",
            spec.title
        )));
    }

    let column = dataset
        .frame()
        .column(&spec.column)?
        .cast(&DataType::Float64)?;
    let column = column.f64()?;
    let mut values = Vec::with_capacity(column.len());
    for value in column.iter().flatten() {
        if value.is_finite() {
            values.push(value);
        }
    }

    let (edges, counts) = bin_values(&values, spec.bins);
    Ok(ChartData::Bins {
        title: spec.title.clone(),
        column: spec.column.clone(),
        edges,
        counts,
    })
}

fn grid_chart(dataset: &Dataset, spec: &ChartSpec) -> Result<ChartData> {
    let series_column = spec.series.as_deref().ok_or_else(|| {
        EngineError::config(format!(
            "chart '{}' ({}) needs a series column",
            spec.title,
            spec.kind.as_str()
        ))
    })?;

    // Dense over the captured levels so every cell of the grid exists;
    // sums and means fill empty cells with zero.
    let default = match spec.op {
        AggOp::Count => None,
        AggOp::Sum | AggOp::Mean => Some(0.0),
    };
    let agg = AggregationSpec::new(
        [spec.column.clone(), series_column.to_string()],
        spec.metric.clone(),
        spec.op,
    )
    .with_fill(GroupFill::Dense { default });
    let result = aggregate(dataset, &agg)?;

    let category_levels = dataset
        .category_levels(&spec.column)
        .unwrap_or_default()
        .to_vec();
    let series_levels = dataset
        .category_levels(series_column)
        .unwrap_or_default()
        .to_vec();

    let categories: Vec<String> = category_levels.iter().map(|l| l.to_string()).collect();
    let series: Vec<String> = series_levels.iter().map(|l| l.to_string()).collect();
    let mut values = Vec::with_capacity(series_levels.len());
    for series_level in &series_levels {
        let mut row = Vec::with_capacity(category_levels.len());
        for category_level in &category_levels {
            let key = [category_level.clone(), series_level.clone()];
            row.push(result.get(&key).unwrap_or(0.0));
        }
        values.push(row);
    }

    Ok(ChartData::Grid {
        title: spec.title.clone(),
        kind: spec.kind,
        categories,
        series,
        values,
    })
}

fn key_text(key: &[Datum]) -> String {
    key.iter()
        .map(Datum::to_string)
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Equal-width bins over `[min, max]`; the final bin is closed on both
/// sides so the maximum lands in it rather than past it.
fn bin_values(values: &[f64], bins: usize) -> (Vec<f64>, Vec<u64>) {
    if values.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        return (vec![min, max], vec![values.len() as u64]);
    }

    let width = (max - min) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0u64; bins];
    for &value in values {
        let index = (((value - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    (edges, counts)
}

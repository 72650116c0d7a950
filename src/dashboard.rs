//! Dashboard definitions: a TOML file declaring the filterable columns,
//! domain overrides, KPIs, and charts of one dashboard, so one engine
//! serves many spreadsheets without per-dataset code.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggOp;
use crate::chart_data::{ChartKind, ChartSpec};
use crate::dataset::{ColumnDomain, Dataset};
use crate::errors::{EngineError, Result};
use crate::filter::FilterOptions;

/// A column offered as a filter control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDecl {
    pub column: String,
    /// Label shown next to the control; defaults to the column name.
    #[serde(default)]
    pub label: Option<String>,
}

impl FilterDecl {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.column)
    }
}

/// A single scalar summarized over the whole filtered dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDecl {
    pub label: String,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub op: AggOp,
}

/// One dashboard: title, engine options, domain overrides, filters,
/// KPIs, and charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub title: String,
    #[serde(default)]
    pub options: FilterOptions,
    /// Columns to treat as categorical regardless of dtype (integer-coded
    /// survey answers, priority levels).
    #[serde(default)]
    pub categorical: Vec<String>,
    #[serde(default, rename = "filter")]
    pub filters: Vec<FilterDecl>,
    #[serde(default, rename = "kpi")]
    pub kpis: Vec<KpiDecl>,
    #[serde(default, rename = "chart")]
    pub charts: Vec<ChartSpec>,
}

impl DashboardSpec {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!(
                "could not read dashboard definition {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| EngineError::config(format!("invalid dashboard definition: {e}")))
    }

    /// Domain overrides for [`Dataset::with_domains`].
    pub fn domain_overrides(&self) -> BTreeMap<String, ColumnDomain> {
        self.categorical
            .iter()
            .map(|column| (column.clone(), ColumnDomain::Categorical))
            .collect()
    }

    /// Check every declared column against the dataset before anything is
    /// computed, so a bad definition fails the whole refresh up front
    /// instead of halfway through a chart.
    pub fn validate(&self, dataset: &Dataset) -> Result<()> {
        for filter in &self.filters {
            dataset.require(&filter.column)?;
        }
        for kpi in &self.kpis {
            if let Some(metric) = &kpi.metric {
                dataset.require(metric)?;
            } else if kpi.op != AggOp::Count {
                return Err(EngineError::config(format!(
                    "KPI '{}' uses {} and needs a metric column",
                    kpi.label,
                    kpi.op.as_str()
                )));
            }
        }
        for chart in &self.charts {
            dataset.require(&chart.column)?;
            if let Some(series) = &chart.series {
                dataset.require(series)?;
            }
            if let Some(metric) = &chart.metric {
                dataset.require(metric)?;
            }
            match chart.kind {
                ChartKind::Heatmap | ChartKind::StackedBar if chart.series.is_none() => {
                    return Err(EngineError::config(format!(
                        "chart '{}' ({}) needs a series column",
                        chart.title,
                        chart.kind.as_str()
                    )));
                }
                ChartKind::Histogram if chart.bins == 0 => {
                    return Err(EngineError::config(format!(
                        "chart '{}' needs at least one histogram bin",
                        chart.title
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

//! One dashboard session: the immutable source dataset, the dashboard
//! definition, and an explicit refresh step. Instead of re-running a
//! script top to bottom on every interaction, the caller holds a
//! [`FilterState`] and asks the session for a new [`DashboardView`]
//! whenever it changes.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::aggregate::{reduce, AggOp};
use crate::chart_data::{build_chart, ChartData};
use crate::dashboard::DashboardSpec;
use crate::dataset::{ColumnDomain, Dataset, Datum};
use crate::errors::{EngineError, Result};
use crate::filter::{apply_filters, FilterOptions, FilterState};

/// A filter control the presentation layer can offer, seeded from the
/// full dataset rather than the filtered one so choices stay put while
/// filters change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "control", rename_all = "snake_case")]
pub enum FilterControl {
    /// Multi-select over the captured category levels.
    Choices {
        column: String,
        label: String,
        choices: Vec<Datum>,
    },
    /// Numeric slider endpoints.
    Range {
        column: String,
        label: String,
        min: f64,
        max: f64,
    },
    /// Date pickers.
    DateRange {
        column: String,
        label: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// One computed KPI. `value` is `None` when the filtered set had nothing
/// to summarize; the display layer chooses the placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub label: String,
    pub op: AggOp,
    pub value: Option<f64>,
}

/// Everything the presentation layer needs to redraw after a filter
/// change. Plain data; recomputed from scratch on every refresh and
/// never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub title: String,
    pub total_records: usize,
    pub matching_records: usize,
    pub kpis: Vec<Kpi>,
    pub charts: Vec<ChartData>,
}

/// Owns the dataset for the lifetime of one loaded dashboard.
#[derive(Debug)]
pub struct Session {
    dataset: Dataset,
    spec: DashboardSpec,
    options: FilterOptions,
}

impl Session {
    /// Classify the frame's columns per the dashboard's overrides,
    /// validate every declared column, and take ownership of the result.
    pub fn new(frame: DataFrame, spec: DashboardSpec) -> Result<Self> {
        let dataset = Dataset::with_domains(frame, &spec.domain_overrides())?;
        spec.validate(&dataset)?;
        let options = spec.options;
        log::info!(
            "session '{}': {} records, {} filters, {} charts",
            spec.title,
            dataset.height(),
            spec.filters.len(),
            spec.charts.len()
        );
        Ok(Self {
            dataset,
            spec,
            options,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn spec(&self) -> &DashboardSpec {
        &self.spec
    }

    /// The controls to offer for the declared filters. Columns with no
    /// values at all produce no control.
    pub fn filter_controls(&self) -> Result<Vec<FilterControl>> {
        let mut controls = Vec::with_capacity(self.spec.filters.len());
        for decl in &self.spec.filters {
            let domain = self.dataset.require(&decl.column)?;
            let label = decl.label().to_string();
            match domain {
                ColumnDomain::Categorical => {
                    let choices = self
                        .dataset
                        .category_levels(&decl.column)
                        .unwrap_or_default()
                        .to_vec();
                    controls.push(FilterControl::Choices {
                        column: decl.column.clone(),
                        label,
                        choices,
                    });
                }
                ColumnDomain::Continuous => {
                    if let Some((min, max)) = self.dataset.numeric_extent(&decl.column)? {
                        controls.push(FilterControl::Range {
                            column: decl.column.clone(),
                            label,
                            min,
                            max,
                        });
                    }
                }
                ColumnDomain::Temporal => {
                    if let Some((start, end)) = self.dataset.date_extent(&decl.column)? {
                        controls.push(FilterControl::DateRange {
                            column: decl.column.clone(),
                            label,
                            start,
                            end,
                        });
                    }
                }
            }
        }
        Ok(controls)
    }

    /// Recompute the whole view for the given filter state. KPIs and
    /// charts that hit an empty group fall back (None / omitted) rather
    /// than failing the refresh; configuration and schema errors still
    /// propagate, since those mean the definition is wrong.
    pub fn refresh(&self, state: &FilterState) -> Result<DashboardView> {
        let filtered = apply_filters(&self.dataset, state, &self.options)?;

        let mut kpis = Vec::with_capacity(self.spec.kpis.len());
        for decl in &self.spec.kpis {
            let value = match reduce(&filtered, decl.metric.as_deref(), decl.op) {
                Ok(value) => Some(value),
                Err(EngineError::EmptyGroup { .. }) => None,
                Err(e) => return Err(e),
            };
            kpis.push(Kpi {
                label: decl.label.clone(),
                op: decl.op,
                value,
            });
        }

        let mut charts = Vec::with_capacity(self.spec.charts.len());
        for spec in &self.spec.charts {
            match build_chart(&filtered, spec) {
                Ok(data) => charts.push(data),
                Err(EngineError::EmptyGroup { group, op }) => {
                    log::warn!(
                        "skipping chart '{}': group '{group}' has no values for {op}",
                        spec.title
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(DashboardView {
            title: self.spec.title.clone(),
            total_records: self.dataset.height(),
            matching_records: filtered.height(),
            kpis,
            charts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Constraint;
    use polars::prelude::*;

    const DASHBOARD: &str = r#"
title = "Department Survey"
categorical = ["Rating"]

[[filter]]
column = "Department"

[[filter]]
column = "Age"
label = "Age:"

[[kpi]]
label = "Responses"

[[kpi]]
label = "Average Rating"
metric = "Rating"
op = "mean"

[[chart]]
title = "Votes per Rating"
kind = "bar"
column = "Rating"

[[chart]]
title = "Responses per Department"
kind = "pie"
column = "Department"
order = "value_descending"
"#;

    fn survey_frame() -> DataFrame {
        df!(
            "Department" => &["Marketing", "Sales", "Marketing", "Finance", "Sales"],
            "Age" => &[23i64, 35, 41, 29, 52],
            "Rating" => &[4i64, 3, 4, 5, 2],
        )
        .unwrap()
    }

    fn session() -> Session {
        let spec = DashboardSpec::from_toml(DASHBOARD).unwrap();
        Session::new(survey_frame(), spec).unwrap()
    }

    #[test]
    fn unfiltered_refresh_sees_every_record() {
        let session = session();
        let view = session.refresh(&FilterState::new()).unwrap();
        assert_eq!(view.total_records, 5);
        assert_eq!(view.matching_records, 5);
        assert_eq!(view.kpis[0].value, Some(5.0));
        assert_eq!(view.kpis[1].value, Some(3.6));
        assert_eq!(view.charts.len(), 2);
    }

    #[test]
    fn refresh_narrows_to_the_filter_state() {
        let session = session();
        let mut state = FilterState::new();
        state.set(
            "Department",
            Constraint::OneOf(vec!["Marketing".into(), "Sales".into()]),
        );
        state.set("Age", Constraint::Range { min: 30.0, max: 60.0 });
        let view = session.refresh(&state).unwrap();
        assert_eq!(view.total_records, 5);
        assert_eq!(view.matching_records, 3);
        assert_eq!(view.kpis[0].value, Some(3.0));
        assert_eq!(view.kpis[1].value, Some(3.0));
    }

    #[test]
    fn kpis_fall_back_to_none_when_nothing_matches() {
        let session = session();
        let mut state = FilterState::new();
        state.set("Age", Constraint::Range { min: 90.0, max: 99.0 });
        let view = session.refresh(&state).unwrap();
        assert_eq!(view.matching_records, 0);
        assert_eq!(view.kpis[0].value, Some(0.0));
        assert_eq!(view.kpis[1].value, None);
    }

    #[test]
    fn controls_are_seeded_from_the_full_dataset() {
        let session = session();
        let controls = session.filter_controls().unwrap();
        assert_eq!(controls.len(), 2);
        match &controls[0] {
            FilterControl::Choices { choices, .. } => {
                assert_eq!(
                    choices,
                    &[
                        Datum::Str("Marketing".into()),
                        Datum::Str("Sales".into()),
                        Datum::Str("Finance".into())
                    ]
                );
            }
            other => panic!("expected choices, got {other:?}"),
        }
        match &controls[1] {
            FilterControl::Range { label, min, max, .. } => {
                assert_eq!(label, "Age:");
                assert_eq!((*min, *max), (23.0, 52.0));
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn new_rejects_a_definition_that_does_not_fit_the_frame() {
        let spec = DashboardSpec::from_toml(
            "title = \"T\"\n[[filter]]\ncolumn = \"department\"\n",
        )
        .unwrap();
        let err = Session::new(survey_frame(), spec).unwrap_err();
        assert!(err.to_string().contains("did you mean 'Department'"));
    }
}

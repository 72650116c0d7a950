//! datsift: filter and aggregate tabular data for interactive dashboards.
//!
//! The crate replaces a family of single-file dashboard scripts with one
//! engine. A [`Session`] owns an immutable [`Dataset`] for its lifetime;
//! the caller holds a [`FilterState`] of per-column constraints and calls
//! [`Session::refresh`] after each change, getting back a
//! [`DashboardView`] of KPIs and chart data ready for any presentation
//! layer. The engine is pure and synchronous: one filter scan, one
//! grouping pass per aggregation, nothing cached between refreshes.
//!
//! The pieces compose freely without a session: [`apply_filters`] narrows
//! a dataset, [`aggregate`] and [`reduce`] summarize one, and
//! [`build_chart`] shapes a summary for a specific chart kind.

pub mod aggregate;
pub mod chart_data;
pub mod cli;
pub mod dashboard;
pub mod dataset;
pub mod errors;
pub mod filter;
pub mod loader;
pub mod session;

pub use aggregate::{
    aggregate, reduce, AggOp, AggregationResult, AggregationSpec, GroupFill, GroupSummary,
    KeyOrder,
};
pub use chart_data::{build_chart, ChartData, ChartKind, ChartSpec};
pub use dashboard::{DashboardSpec, FilterDecl, KpiDecl};
pub use dataset::{ColumnDomain, Dataset, Datum};
pub use errors::EngineError;
pub use filter::{
    apply_filters, ColumnFilter, Constraint, EmptySelection, FilterOptions, FilterState,
    UnknownColumn,
};
pub use loader::{load_dataframe, LoadOptions};
pub use session::{DashboardView, FilterControl, Kpi, Session};

use clap::Parser;
use color_eyre::Result;
use datsift::chart_data::ChartData;
use datsift::cli::Args;
use datsift::dashboard::DashboardSpec;
use datsift::dataset::{ColumnDomain, Dataset};
use datsift::loader::load_dataframe;
use datsift::session::{DashboardView, Session};

fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;
    let args = Args::parse();

    let df = load_dataframe(&args.path, &args.load_options())?;

    match &args.dashboard {
        Some(dashboard_path) => {
            let spec = DashboardSpec::from_path(dashboard_path)?;
            let session = Session::new(df, spec)?;
            let state = args.filter_state()?;
            let view = session.refresh(&state)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_view(&view);
            }
        }
        None => {
            let dataset = Dataset::new(df)?;
            print_summary(&dataset);
        }
    }
    Ok(())
}

fn print_view(view: &DashboardView) {
    println!("{}", view.title);
    println!(
        "{} of {} records match",
        view.matching_records, view.total_records
    );

    if !view.kpis.is_empty() {
        println!();
        for kpi in &view.kpis {
            match kpi.value {
                Some(value) => println!("{}: {}", kpi.label, format_number(value)),
                None => println!("{}: n/a", kpi.label),
            }
        }
    }

    for chart in &view.charts {
        println!();
        match chart {
            ChartData::Categories { title, kind, labels, values } => {
                println!("{title} [{}]", kind.as_str());
                let width = labels.iter().map(String::len).max().unwrap_or(0);
                for (label, value) in labels.iter().zip(values) {
                    println!("  {label:width$}  {}", format_number(*value));
                }
            }
            ChartData::Bins { title, column, edges, counts } => {
                println!("{title} [histogram of {column}]");
                for (i, count) in counts.iter().enumerate() {
                    println!(
                        "  {} .. {}  {count}",
                        format_number(edges[i]),
                        format_number(edges[i + 1])
                    );
                }
            }
            ChartData::Grid { title, kind, categories, series, values } => {
                println!("{title} [{}]", kind.as_str());
                let width = series.iter().map(String::len).max().unwrap_or(0);
                println!("  {:width$}  {}", "", categories.join("  "));
                for (name, row) in series.iter().zip(values) {
                    let cells: Vec<String> = row.iter().map(|v| format_number(*v)).collect();
                    println!("  {name:width$}  {}", cells.join("  "));
                }
            }
        }
    }
}

fn print_summary(dataset: &Dataset) {
    println!("{} records", dataset.height());
    for column in dataset.columns() {
        let Some(domain) = dataset.domain(&column) else {
            continue;
        };
        match domain {
            ColumnDomain::Categorical => {
                let levels = dataset.category_levels(&column).unwrap_or_default();
                println!("  {column}: {domain}, {} levels", levels.len());
            }
            ColumnDomain::Continuous => match dataset.numeric_extent(&column) {
                Ok(Some((min, max))) => println!(
                    "  {column}: {domain}, {} .. {}",
                    format_number(min),
                    format_number(max)
                ),
                _ => println!("  {column}: {domain}, no values"),
            },
            ColumnDomain::Temporal => match dataset.date_extent(&column) {
                Ok(Some((start, end))) => println!("  {column}: {domain}, {start} .. {end}"),
                _ => println!("  {column}: {domain}, no values"),
            },
        }
    }
}

/// Integers print bare; everything else keeps two decimals.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

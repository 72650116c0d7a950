//! Command-line surface: load a data file, optionally a dashboard
//! definition, and ad-hoc filter flags translated into a [`FilterState`].

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use crate::errors::{EngineError, Result};
use crate::filter::{Constraint, FilterState};
use crate::loader::LoadOptions;

/// Command-line arguments for datsift
#[derive(Parser, Debug)]
#[command(version, about = "datsift")]
pub struct Args {
    /// Data file to load (csv, tsv, parquet, json, jsonl, ndjson, arrow/ipc)
    pub path: PathBuf,

    /// Dashboard definition (TOML); without it a dataset summary is printed
    #[arg(long = "dashboard")]
    pub dashboard: Option<PathBuf>,

    /// Keep records whose column matches one of the listed values,
    /// e.g. "Department=Sales,R&D" (repeatable)
    #[arg(long = "pick")]
    pub pick: Vec<String>,

    /// Keep records whose numeric column lies in an inclusive range,
    /// e.g. "Age=30:40" (repeatable)
    #[arg(long = "range")]
    pub range: Vec<String>,

    /// Keep records whose date column lies in an inclusive range,
    /// e.g. "Start date=2024-01-01:2024-06-30" (repeatable)
    #[arg(long = "between")]
    pub between: Vec<String>,

    /// Skip this many rows when reading a file
    #[arg(long = "skip-rows")]
    pub skip_rows: Option<usize>,

    /// Specify that the file has no header
    #[arg(long = "no-header", action)]
    pub no_header: bool,

    /// Specify the delimiter to use when reading a file
    #[arg(long = "delimiter")]
    pub delimiter: Option<u8>,

    /// Print the refreshed view as JSON instead of text
    #[arg(long = "json", action)]
    pub json: bool,
}

impl Args {
    pub fn load_options(&self) -> LoadOptions {
        let mut opts = LoadOptions::new();
        if let Some(delimiter) = self.delimiter {
            opts = opts.with_delimiter(delimiter);
        }
        if self.no_header {
            opts = opts.with_has_header(false);
        }
        if let Some(skip_rows) = self.skip_rows {
            opts = opts.with_skip_rows(skip_rows);
        }
        opts
    }

    /// Translate the filter flags into a [`FilterState`].
    pub fn filter_state(&self) -> Result<FilterState> {
        let mut state = FilterState::new();
        for flag in &self.pick {
            let (column, constraint) = parse_pick(flag)?;
            state.set(column, constraint);
        }
        for flag in &self.range {
            let (column, constraint) = parse_range(flag)?;
            state.set(column, constraint);
        }
        for flag in &self.between {
            let (column, constraint) = parse_between(flag)?;
            state.set(column, constraint);
        }
        Ok(state)
    }
}

fn split_flag<'a>(flag: &'a str, option: &str) -> Result<(&'a str, &'a str)> {
    flag.split_once('=')
        .map(|(column, value)| (column.trim(), value))
        .filter(|(column, _)| !column.is_empty())
        .ok_or_else(|| {
            EngineError::config(format!("--{option} expects COLUMN=VALUE, got '{flag}'"))
        })
}

fn parse_pick(flag: &str) -> Result<(String, Constraint)> {
    let (column, values) = split_flag(flag, "pick")?;
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    Ok((column.to_string(), Constraint::OneOf(values)))
}

fn parse_range(flag: &str) -> Result<(String, Constraint)> {
    let (column, value) = split_flag(flag, "range")?;
    let (min, max) = value.split_once(':').ok_or_else(|| {
        EngineError::config(format!("--range expects COLUMN=MIN:MAX, got '{flag}'"))
    })?;
    let min = min.trim().parse::<f64>().map_err(|_| {
        EngineError::config(format!("--range bound '{}' is not a number", min.trim()))
    })?;
    let max = max.trim().parse::<f64>().map_err(|_| {
        EngineError::config(format!("--range bound '{}' is not a number", max.trim()))
    })?;
    Ok((column.to_string(), Constraint::Range { min, max }))
}

fn parse_between(flag: &str) -> Result<(String, Constraint)> {
    let (column, value) = split_flag(flag, "between")?;
    let (start, end) = value.split_once(':').ok_or_else(|| {
        EngineError::config(format!(
            "--between expects COLUMN=START:END dates, got '{flag}'"
        ))
    })?;
    let start = parse_date(start.trim())?;
    let end = parse_date(end.trim())?;
    Ok((column.to_string(), Constraint::DateRange { start, end }))
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| EngineError::config(format!("'{text}' is not a YYYY-MM-DD date")))
}

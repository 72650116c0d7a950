//! Load the session's source frame from disk. The engine itself is
//! agnostic to origin; this module only dispatches on file extension to
//! the matching polars reader.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;

/// Options for reading delimited files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    pub skip_rows: Option<usize>,
    /// Try to parse date-looking text columns as dates (on by default in
    /// the CLI so date-range filters work on CSV input).
    pub parse_dates: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self {
            delimiter: None,
            has_header: None,
            skip_rows: None,
            parse_dates: true,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: usize) -> Self {
        self.skip_rows = Some(skip_rows);
        self
    }

    pub fn with_parse_dates(mut self, parse_dates: bool) -> Self {
        self.parse_dates = parse_dates;
        self
    }
}

/// Read a data file into a `DataFrame`, choosing the reader from the
/// file extension.
pub fn load_dataframe(path: &Path, options: &LoadOptions) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    log::info!("loading {}", path.display());

    let df = match extension.as_deref() {
        Some("csv") => read_delimited(path, options, options.delimiter.unwrap_or(b','))?,
        Some("tsv") => read_delimited(path, options, options.delimiter.unwrap_or(b'\t'))?,
        Some("parquet") => {
            let pl_path = PlPath::Local(Arc::from(path));
            LazyFrame::scan_parquet(pl_path, Default::default())?.collect()?
        }
        Some("json") => read_json(path, JsonFormat::Json)?,
        Some("jsonl") | Some("ndjson") => read_json(path, JsonFormat::JsonLines)?,
        Some("arrow") | Some("ipc") | Some("feather") => {
            let file = File::open(path)?;
            IpcReader::new(file).finish()?
        }
        _ => {
            return Err(eyre!(
                "unsupported file type for {} (csv, tsv, parquet, json, jsonl, ndjson, arrow/ipc/feather)",
                path.display()
            ))
        }
    };

    log::info!(
        "loaded {} records, {} columns",
        df.height(),
        df.width()
    );
    Ok(df)
}

fn read_delimited(path: &Path, options: &LoadOptions, delimiter: u8) -> Result<DataFrame> {
    let mut read_options = CsvReadOptions::default();
    if let Some(skip_rows) = options.skip_rows {
        read_options.skip_rows = skip_rows;
    }
    if let Some(has_header) = options.has_header {
        read_options.has_header = has_header;
    }
    let parse_dates = options.parse_dates;
    read_options = read_options.map_parse_options(|opts| {
        opts.with_separator(delimiter)
            .with_try_parse_dates(parse_dates)
    });
    let df = read_options
        .try_into_reader_with_file_path(Some(path.into()))?
        .finish()?;
    Ok(df)
}

fn read_json(path: &Path, format: JsonFormat) -> Result<DataFrame> {
    let file = File::open(path)?;
    let df = JsonReader::new(file).with_json_format(format).finish()?;
    Ok(df)
}

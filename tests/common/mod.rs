use polars::prelude::*;
use std::fs::File;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write a small task-tracker CSV and return the directory guard with the
/// file path: two categorical columns, a numeric column, and a date
/// column.
pub fn create_tracker_csv() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracker.csv");

    let mut df = df!(
        "Assigned To" => &["Avery", "Blake", "Avery", "Casey", "Blake", "Avery"],
        "Priority" => &["High", "Low", "Medium", "High", "High", "Low"],
        "Hours" => &[8i64, 3, 5, 13, 2, 1],
        "Start date" => &[
            "2024-01-08", "2024-01-15", "2024-02-02",
            "2024-02-20", "2024-03-01", "2024-03-12",
        ],
    )
    .unwrap();

    let mut file = File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(&mut df).unwrap();
    (dir, path)
}

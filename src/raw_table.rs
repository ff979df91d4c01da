//! Raw Table - Untyped CSV exports as loaded from disk
//!
//! Every column is read as a string so that coercion (and coercion failure)
//! happens in one place, the normalizer.

use crate::error::{AnalysisError, Result};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RawTable {
    label: String,
    frame: DataFrame,
}

impl RawTable {
    pub fn new(label: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            label: label.into(),
            frame,
        }
    }

    /// Load a CSV file, skipping `skip_rows` preamble lines before the header.
    pub fn load_csv(path: &Path, skip_rows: usize) -> Result<Self> {
        // Surface unreadable files as IO errors before polars gets to them
        std::fs::File::open(path)?;

        let frame = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_skip_rows(skip_rows)
            .with_infer_schema_length(Some(0))
            .with_truncate_ragged_lines(true)
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| AnalysisError::Polars(format!("Failed to load {}: {}", path.display(), e)))?;

        debug!(
            "Loaded {} ({} rows, {} columns)",
            path.display(),
            frame.height(),
            frame.width()
        );

        Ok(Self::new(path.display().to_string(), frame))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    /// Fail with `MissingColumn` when the configuration names a column the source lacks.
    pub fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(AnalysisError::MissingColumn {
                source_label: self.label.clone(),
                column: name.to_string(),
            })
        }
    }

    /// Cell contents of a column as optional strings, whatever its stored dtype.
    pub fn string_column(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.require_column(name)?;
        let series = self.frame.column(name)?.cast(&DataType::String)?;
        let values = series
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect();
        Ok(values)
    }

    /// Columns whose name parses as an integer, paired with that year.
    pub fn year_columns(&self) -> Vec<(String, i32)> {
        self.frame
            .get_column_names()
            .iter()
            .filter_map(|name| {
                name.trim()
                    .parse::<i32>()
                    .ok()
                    .map(|year| (name.to_string(), year))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_columns() {
        let df = df! [
            "Country Name" => ["France"],
            "Indicator Code" => ["SL.TLF.CACT.FE.ZS"],
            "1990" => ["46.1"],
            "2000" => ["48.0"],
            "Unnamed: 68" => [""]
        ]
        .unwrap();
        let table = RawTable::new("labor", df);

        assert_eq!(
            table.year_columns(),
            vec![("1990".to_string(), 1990), ("2000".to_string(), 2000)]
        );
    }

    #[test]
    fn test_require_column() {
        let df = df! [ "Country" => ["France"] ].unwrap();
        let table = RawTable::new("fertility", df);

        assert!(table.require_column("Country").is_ok());
        match table.require_column("OBS_VALUE") {
            Err(AnalysisError::MissingColumn { source_label, column }) => {
                assert_eq!(source_label, "fertility");
                assert_eq!(column, "OBS_VALUE");
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_string_column_casts_numbers() {
        let df = df! [ "TIME_PERIOD" => [2000i64, 2001] ].unwrap();
        let table = RawTable::new("fertility", df);

        assert_eq!(
            table.string_column("TIME_PERIOD").unwrap(),
            vec![Some("2000".to_string()), Some("2001".to_string())]
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("demography_analytics_no_such_file.csv");
        let err = RawTable::load_csv(&path, 0).unwrap_err();
        assert!(matches!(err, AnalysisError::Io(_)));
    }
}

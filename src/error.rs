use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Column '{column}' not found in source '{source_label}'")]
    MissingColumn {
        source_label: String,
        column: String,
    },

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Duplicate key ({entity}, {year}) in {side} input")]
    DuplicateKey {
        side: String,
        entity: String,
        year: i32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for AnalysisError {
    fn from(err: polars::error::PolarsError) -> Self {
        AnalysisError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

//! Correlation summary table persisted as CSV

use crate::correlation::{rank_results, CorrelationResult, SortOrder};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One CSV row. Undefined coefficients are written as empty cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub entity: String,
    pub coefficient: Option<f64>,
    pub p_value: Option<f64>,
    pub sample_size: usize,
}

impl From<&CorrelationResult> for SummaryRow {
    fn from(result: &CorrelationResult) -> Self {
        let defined = result.is_defined();
        Self {
            entity: result.entity.clone(),
            coefficient: defined.then_some(result.coefficient),
            p_value: defined.then_some(result.p_value),
            sample_size: result.sample_size,
        }
    }
}

/// Write `entity,coefficient,p_value,sample_size` sorted by coefficient.
///
/// The file is flushed before returning; on error the writer is dropped and
/// the handle closed, leaving at most a truncated file behind.
pub fn write_summary_csv(
    path: &Path,
    results: &[CorrelationResult],
    order: SortOrder,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut ranked = results.to_vec();
    rank_results(&mut ranked, order);

    let mut writer = csv::Writer::from_path(path)?;
    if ranked.is_empty() {
        // serialize() only emits the header alongside the first row
        writer.write_record(["entity", "coefficient", "p_value", "sample_size"])?;
    }
    for result in &ranked {
        writer.serialize(SummaryRow::from(result))?;
    }
    writer.flush()?;

    info!("Wrote {} summary rows to {}", ranked.len(), path.display());
    Ok(())
}

pub fn read_summary_csv(path: &Path) -> Result<Vec<SummaryRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationAnalyzer;

    #[test]
    fn test_summary_is_sorted_and_readable() {
        let analyzer = CorrelationAnalyzer::default();
        let results = vec![
            analyzer.correlate("Up", &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.1]),
            analyzer.correlate("Flat", &[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            analyzer.correlate("Down", &[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]),
        ];
        let path = std::env::temp_dir()
            .join("demography_analytics_summary_test")
            .join("summary.csv");

        write_summary_csv(&path, &results, SortOrder::Ascending).unwrap();

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("entity,coefficient,p_value,sample_size\n"));

        let rows = read_summary_csv(&path).unwrap();
        let entities: Vec<&str> = rows.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, vec!["Down", "Up", "Flat"]);
        assert_eq!(rows[2].coefficient, None);
        assert_eq!(rows[2].sample_size, 3);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_empty_summary_keeps_header() {
        let path = std::env::temp_dir()
            .join("demography_analytics_summary_test")
            .join("empty_summary.csv");

        write_summary_csv(&path, &[], SortOrder::Descending).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "entity,coefficient,p_value,sample_size\n");
        assert!(read_summary_csv(&path).unwrap().is_empty());

        let _ = std::fs::remove_file(&path);
    }
}

//! Schema Normalizer - Converts raw source tables into canonical long-format records
//!
//! Sources come either wide (one column per year) or long (one row per
//! entity/year). Both are reduced to `NormalizedRecord`s. Cells that fail
//! coercion are dropped, never fatal, and counted in a `NormalizationReport`.

use crate::alias::EntityAliasMap;
use crate::error::Result;
use crate::raw_table::RawTable;
use crate::records::{sort_records, NormalizedRecord};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Shape of a source table and the columns that carry entity, year and value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLayout {
    /// One row per observation.
    Long {
        entity_column: String,
        year_column: String,
        value_column: String,
    },
    /// One row per entity, one column per year.
    Wide { entity_column: String },
}

impl SourceLayout {
    pub fn long(entity: &str, year: &str, value: &str) -> Self {
        SourceLayout::Long {
            entity_column: entity.to_string(),
            year_column: year.to_string(),
            value_column: value.to_string(),
        }
    }

    pub fn wide(entity: &str) -> Self {
        SourceLayout::Wide {
            entity_column: entity.to_string(),
        }
    }

    pub fn entity_column(&self) -> &str {
        match self {
            SourceLayout::Long { entity_column, .. } => entity_column,
            SourceLayout::Wide { entity_column } => entity_column,
        }
    }

    /// Columns the source must contain.
    pub fn required_columns(&self) -> Vec<&str> {
        match self {
            SourceLayout::Long {
                entity_column,
                year_column,
                value_column,
            } => vec![
                entity_column.as_str(),
                year_column.as_str(),
                value_column.as_str(),
            ],
            SourceLayout::Wide { entity_column } => vec![entity_column.as_str()],
        }
    }
}

/// Counts of candidate cells and why the dropped ones were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    pub candidates: usize,
    pub kept: usize,
    pub missing_entity: usize,
    pub invalid_year: usize,
    pub invalid_value: usize,
}

impl NormalizationReport {
    pub fn dropped(&self) -> usize {
        self.missing_entity + self.invalid_year + self.invalid_value
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    pub report: NormalizationReport,
}

pub struct SchemaNormalizer<'a> {
    layout: &'a SourceLayout,
    aliases: &'a EntityAliasMap,
}

impl<'a> SchemaNormalizer<'a> {
    pub fn new(layout: &'a SourceLayout, aliases: &'a EntityAliasMap) -> Self {
        Self { layout, aliases }
    }

    /// Normalize a raw table into records sorted by `(entity, year)`.
    pub fn normalize(&self, table: &RawTable) -> Result<Normalized> {
        for column in self.layout.required_columns() {
            table.require_column(column)?;
        }

        let mut report = NormalizationReport::default();
        let mut records = Vec::new();

        match self.layout {
            SourceLayout::Long {
                entity_column,
                year_column,
                value_column,
            } => {
                let entities = table.string_column(entity_column)?;
                let years = table.string_column(year_column)?;
                let values = table.string_column(value_column)?;

                for ((entity, year), value) in entities.iter().zip(&years).zip(&values) {
                    let year = year.as_deref().and_then(coerce_year);
                    self.push_candidate(entity.as_deref(), year, value.as_deref(), &mut records, &mut report);
                }
            }
            SourceLayout::Wide { entity_column } => {
                let entities = table.string_column(entity_column)?;
                let year_columns = table.year_columns();
                debug!(
                    "{}: melting {} year columns",
                    table.label(),
                    year_columns.len()
                );

                let mut cells = Vec::with_capacity(year_columns.len());
                for (name, year) in &year_columns {
                    cells.push((*year, table.string_column(name)?));
                }

                for (row, entity) in entities.iter().enumerate() {
                    for (year, column) in &cells {
                        let value = column.get(row).and_then(|v| v.as_deref());
                        self.push_candidate(entity.as_deref(), Some(*year), value, &mut records, &mut report);
                    }
                }
            }
        }

        sort_records(&mut records);
        report.kept = records.len();

        info!(
            "{}: normalized {} records from {} candidates ({} dropped: {} missing entity, {} invalid year, {} invalid value)",
            table.label(),
            report.kept,
            report.candidates,
            report.dropped(),
            report.missing_entity,
            report.invalid_year,
            report.invalid_value
        );

        Ok(Normalized { records, report })
    }

    fn push_candidate(
        &self,
        entity: Option<&str>,
        year: Option<i32>,
        value: Option<&str>,
        records: &mut Vec<NormalizedRecord>,
        report: &mut NormalizationReport,
    ) {
        report.candidates += 1;

        let entity = match entity.map(str::trim).filter(|e| !e.is_empty()) {
            Some(raw) => self.aliases.resolve(raw).trim(),
            None => {
                report.missing_entity += 1;
                return;
            }
        };
        if entity.is_empty() {
            report.missing_entity += 1;
            return;
        }

        let Some(year) = year else {
            report.invalid_year += 1;
            return;
        };

        let Some(value) = value.and_then(coerce_value) else {
            report.invalid_value += 1;
            return;
        };

        records.push(NormalizedRecord::new(entity, year, value));
    }
}

/// Parse a year cell. Integral floats such as "2000.0" are accepted.
pub fn coerce_year(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if let Ok(year) = trimmed.parse::<i32>() {
        return Some(year);
    }
    let float = trimmed.parse::<f64>().ok()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() <= i32::MAX as f64 {
        Some(float as i32)
    } else {
        None
    }
}

/// Parse a value cell; non-finite numbers count as missing.
pub fn coerce_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Re-pivot records into a wide frame: `entity_column` plus one column per year.
///
/// When a key occurs more than once the first record wins.
pub fn pivot_wide(records: &[NormalizedRecord], entity_column: &str) -> Result<DataFrame> {
    let mut grid: BTreeMap<&str, BTreeMap<i32, f64>> = BTreeMap::new();
    let mut years = std::collections::BTreeSet::new();

    for record in records {
        years.insert(record.year);
        grid.entry(record.entity.as_str())
            .or_default()
            .entry(record.year)
            .or_insert(record.value);
    }

    let entity_names: Vec<&str> = grid.keys().copied().collect();
    let mut columns = vec![Series::new(entity_column, entity_names)];
    for year in years {
        let cells: Vec<Option<f64>> = grid.values().map(|row| row.get(&year).copied()).collect();
        columns.push(Series::new(&year.to_string(), cells));
    }

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn korea_aliases() -> EntityAliasMap {
        EntityAliasMap::new().with_alias("Korea, Rep.", "Korea")
    }

    #[test]
    fn test_long_with_alias() {
        let df = df! [
            "Country" => ["Korea, Rep."],
            "TIME_PERIOD" => ["2000"],
            "OBS_VALUE" => ["55.3"]
        ]
        .unwrap();
        let table = RawTable::new("labor", df);
        let layout = SourceLayout::long("Country", "TIME_PERIOD", "OBS_VALUE");
        let aliases = korea_aliases();

        let out = SchemaNormalizer::new(&layout, &aliases).normalize(&table).unwrap();

        assert_eq!(out.records, vec![NormalizedRecord::new("Korea", 2000, 55.3)]);
        assert_eq!(out.report.dropped(), 0);
    }

    #[test]
    fn test_coercion_failures_are_counted() {
        let df = df! [
            "Location" => [Some("France"), None, Some("Chile"), Some("Chile"), Some("  ")],
            "Time" => [Some("2000"), Some("2000"), Some("n/a"), Some("2001"), Some("2002")],
            "Value" => [Some("70.1"), Some("1.0"), Some("2.0"), Some(".."), Some("3.0")]
        ]
        .unwrap();
        let table = RawTable::new("contraceptive", df);
        let layout = SourceLayout::long("Location", "Time", "Value");
        let aliases = EntityAliasMap::new();

        let out = SchemaNormalizer::new(&layout, &aliases).normalize(&table).unwrap();

        assert_eq!(out.records, vec![NormalizedRecord::new("France", 2000, 70.1)]);
        assert_eq!(
            out.report,
            NormalizationReport {
                candidates: 5,
                kept: 1,
                missing_entity: 2,
                invalid_year: 1,
                invalid_value: 1,
            }
        );
    }

    #[test]
    fn test_wide_melts_year_columns() {
        let df = df! [
            "Country Name" => ["Greece", "Korea, Rep."],
            "Country Code" => ["GRC", "KOR"],
            "1990" => [Some("35.2"), None],
            "1991" => [Some("36.0"), Some("47.1")]
        ]
        .unwrap();
        let table = RawTable::new("labor", df);
        let layout = SourceLayout::wide("Country Name");
        let aliases = korea_aliases();

        let out = SchemaNormalizer::new(&layout, &aliases).normalize(&table).unwrap();

        assert_eq!(
            out.records,
            vec![
                NormalizedRecord::new("Greece", 1990, 35.2),
                NormalizedRecord::new("Greece", 1991, 36.0),
                NormalizedRecord::new("Korea", 1991, 47.1),
            ]
        );
        assert_eq!(out.report.candidates, 4);
        assert_eq!(out.report.invalid_value, 1);
    }

    #[test]
    fn test_missing_configured_column_is_fatal() {
        let df = df! [ "Country" => ["France"], "TIME_PERIOD" => ["2000"] ].unwrap();
        let table = RawTable::new("fertility", df);
        let layout = SourceLayout::long("Country", "TIME_PERIOD", "OBS_VALUE");
        let aliases = EntityAliasMap::new();

        let err = SchemaNormalizer::new(&layout, &aliases).normalize(&table).unwrap_err();
        assert!(matches!(err, crate::error::AnalysisError::MissingColumn { .. }));
    }

    #[test]
    fn test_coerce_year() {
        assert_eq!(coerce_year(" 2000 "), Some(2000));
        assert_eq!(coerce_year("2000.0"), Some(2000));
        assert_eq!(coerce_year("2000.5"), None);
        assert_eq!(coerce_year("2000-Q1"), None);
    }

    #[test]
    fn test_coerce_value_rejects_non_finite() {
        assert_eq!(coerce_value("1.5"), Some(1.5));
        assert_eq!(coerce_value("NaN"), None);
        assert_eq!(coerce_value("inf"), None);
        assert_eq!(coerce_value(""), None);
    }

    #[test]
    fn test_pivot_wide_first_wins() {
        let records = vec![
            NormalizedRecord::new("France", 2000, 1.0),
            NormalizedRecord::new("France", 2000, 9.0),
            NormalizedRecord::new("Spain", 2001, 2.0),
        ];
        let df = pivot_wide(&records, "Country").unwrap();

        assert_eq!(df.get_column_names(), vec!["Country", "2000", "2001"]);
        let y2000 = df.column("2000").unwrap().f64().unwrap();
        assert_eq!(y2000.get(0), Some(1.0));
        assert_eq!(y2000.get(1), None);
    }
}

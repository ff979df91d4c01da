//! Descriptive statistics over normalized records

use crate::error::Result;
use crate::records::NormalizedRecord;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Whole-dataset shape after cleaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub records: usize,
    pub entities: usize,
    /// Inclusive `(first, last)` year, `None` for an empty dataset.
    pub year_range: Option<(i32, i32)>,
    pub value_range: Option<(f64, f64)>,
}

/// Per-entity annotation: count, span and mean/min/max of the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub entity: String,
    pub observations: usize,
    pub first_year: i32,
    pub last_year: i32,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

pub fn summarize_dataset(records: &[NormalizedRecord]) -> DatasetSummary {
    let entities = records
        .iter()
        .map(|r| r.entity.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();

    let year_range = records.iter().fold(None, |acc: Option<(i32, i32)>, r| {
        Some(match acc {
            Some((lo, hi)) => (lo.min(r.year), hi.max(r.year)),
            None => (r.year, r.year),
        })
    });
    let value_range = records.iter().fold(None, |acc: Option<(f64, f64)>, r| {
        Some(match acc {
            Some((lo, hi)) => (lo.min(r.value), hi.max(r.value)),
            None => (r.value, r.value),
        })
    });

    DatasetSummary {
        records: records.len(),
        entities,
        year_range,
        value_range,
    }
}

/// One summary per entity, ordered by entity name.
pub fn summarize_entities(records: &[NormalizedRecord]) -> Vec<EntitySummary> {
    let mut groups: BTreeMap<&str, Vec<&NormalizedRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.entity.as_str()).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(entity, rows)| {
            let n = rows.len();
            let sum: f64 = rows.iter().map(|r| r.value).sum();
            EntitySummary {
                entity: entity.to_string(),
                observations: n,
                first_year: rows.iter().map(|r| r.year).min().unwrap_or_default(),
                last_year: rows.iter().map(|r| r.year).max().unwrap_or_default(),
                mean: sum / n as f64,
                min: rows.iter().map(|r| r.value).fold(f64::INFINITY, f64::min),
                max: rows.iter().map(|r| r.value).fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect()
}

/// Frame of entity summaries for the renderer.
pub fn entity_summaries_to_frame(summaries: &[EntitySummary]) -> Result<DataFrame> {
    Ok(df! [
        "entity" => summaries.iter().map(|s| s.entity.as_str()).collect::<Vec<_>>(),
        "observations" => summaries.iter().map(|s| s.observations as u64).collect::<Vec<_>>(),
        "first_year" => summaries.iter().map(|s| s.first_year).collect::<Vec<_>>(),
        "last_year" => summaries.iter().map(|s| s.last_year).collect::<Vec<_>>(),
        "mean" => summaries.iter().map(|s| s.mean).collect::<Vec<_>>(),
        "min" => summaries.iter().map(|s| s.min).collect::<Vec<_>>(),
        "max" => summaries.iter().map(|s| s.max).collect::<Vec<_>>()
    ]?)
}

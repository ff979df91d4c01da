//! Canonical record types shared by every stage of the pipeline.

use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// One observation in canonical long format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub entity: String,
    pub year: i32,
    pub value: f64,
}

impl NormalizedRecord {
    pub fn new(entity: impl Into<String>, year: i32, value: f64) -> Self {
        Self {
            entity: entity.into(),
            year,
            value,
        }
    }

    pub fn key(&self) -> (&str, i32) {
        (self.entity.as_str(), self.year)
    }
}

/// Two datasets observed for the same entity and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedObservation {
    pub entity: String,
    pub year: i32,
    pub value_a: f64,
    pub value_b: f64,
}

impl PairedObservation {
    pub fn new(entity: impl Into<String>, year: i32, value_a: f64, value_b: f64) -> Self {
        Self {
            entity: entity.into(),
            year,
            value_a,
            value_b,
        }
    }

    /// Same observation with the value columns swapped.
    pub fn swapped(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            year: self.year,
            value_a: self.value_b,
            value_b: self.value_a,
        }
    }
}

/// Sort records by `(entity, year)`. Stable, so duplicates keep source order.
pub fn sort_records(records: &mut [NormalizedRecord]) {
    records.sort_by(|a, b| a.entity.cmp(&b.entity).then(a.year.cmp(&b.year)));
}

/// Distinct entities in first-seen order.
pub fn entities(records: &[NormalizedRecord]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.entity.as_str()))
        .map(|r| r.entity.clone())
        .collect()
}

/// Long-format frame `entity, year, value` for the chart renderer.
pub fn records_to_frame(records: &[NormalizedRecord]) -> Result<DataFrame> {
    let entity: Vec<&str> = records.iter().map(|r| r.entity.as_str()).collect();
    let year: Vec<i32> = records.iter().map(|r| r.year).collect();
    let value: Vec<f64> = records.iter().map(|r| r.value).collect();

    Ok(DataFrame::new(vec![
        Series::new("entity", entity),
        Series::new("year", year),
        Series::new("value", value),
    ])?)
}

/// Frame `entity, year, value_a, value_b`, renamed to the dataset labels.
pub fn pairs_to_frame(
    pairs: &[PairedObservation],
    label_a: &str,
    label_b: &str,
) -> Result<DataFrame> {
    let entity: Vec<&str> = pairs.iter().map(|p| p.entity.as_str()).collect();
    let year: Vec<i32> = pairs.iter().map(|p| p.year).collect();
    let value_a: Vec<f64> = pairs.iter().map(|p| p.value_a).collect();
    let value_b: Vec<f64> = pairs.iter().map(|p| p.value_b).collect();

    // Colliding labels fall back to the positional names
    let reserved = |label: &str| label == "entity" || label == "year";
    let (label_a, label_b) = if label_a == label_b || reserved(label_a) || reserved(label_b) {
        ("value_a", "value_b")
    } else {
        (label_a, label_b)
    };

    Ok(DataFrame::new(vec![
        Series::new("entity", entity),
        Series::new("year", year),
        Series::new(label_a, value_a),
        Series::new(label_b, value_b),
    ])?)
}

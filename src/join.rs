//! Joiner - Inner join of two record sets on `(entity, year)`

use crate::error::{AnalysisError, Result};
use crate::records::{NormalizedRecord, PairedObservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What to do when a side holds more than one record for the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Emit every pairing of the duplicate records.
    #[default]
    CrossProduct,
    /// Keep the first record per key on each side.
    FirstWins,
    /// Fail with `AnalysisError::DuplicateKey`.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub matched_keys: usize,
    pub left_only_keys: usize,
    pub right_only_keys: usize,
    pub duplicate_keys: usize,
    pub pairs: usize,
}

#[derive(Debug, Clone)]
pub struct Joined {
    pub pairs: Vec<PairedObservation>,
    pub report: JoinReport,
}

type KeyIndex<'a> = BTreeMap<(&'a str, i32), Vec<f64>>;

#[derive(Debug, Clone, Default)]
pub struct Joiner {
    policy: DuplicateKeyPolicy,
}

impl Joiner {
    pub fn new(policy: DuplicateKeyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DuplicateKeyPolicy {
        self.policy
    }

    /// Pair every key present on both sides. Output is sorted by `(entity, year)`;
    /// within a key, pairings follow source order of `left` then `right`.
    pub fn join(&self, left: &[NormalizedRecord], right: &[NormalizedRecord]) -> Result<Joined> {
        let left_index = self.index("left", left)?;
        let right_index = self.index("right", right)?;

        let mut report = JoinReport::default();
        let mut pairs = Vec::new();

        for ((entity, year), left_values) in &left_index {
            let Some(right_values) = right_index.get(&(*entity, *year)) else {
                report.left_only_keys += 1;
                continue;
            };
            report.matched_keys += 1;
            if left_values.len() > 1 || right_values.len() > 1 {
                report.duplicate_keys += 1;
            }
            for &value_a in left_values {
                for &value_b in right_values {
                    pairs.push(PairedObservation::new(*entity, *year, value_a, value_b));
                }
            }
        }
        report.right_only_keys = right_index
            .keys()
            .filter(|key| !left_index.contains_key(*key))
            .count();
        report.pairs = pairs.len();

        if report.duplicate_keys > 0 {
            warn!(
                "{} joined keys had duplicate records; emitted their cross product",
                report.duplicate_keys
            );
        }
        info!(
            "Joined {} keys into {} pairs ({} left-only, {} right-only)",
            report.matched_keys, report.pairs, report.left_only_keys, report.right_only_keys
        );

        Ok(Joined { pairs, report })
    }

    fn index<'a>(&self, side: &str, records: &'a [NormalizedRecord]) -> Result<KeyIndex<'a>> {
        let mut index: KeyIndex<'a> = BTreeMap::new();
        for record in records {
            let values = index.entry(record.key()).or_default();
            if !values.is_empty() {
                match self.policy {
                    DuplicateKeyPolicy::CrossProduct => {}
                    DuplicateKeyPolicy::FirstWins => continue,
                    DuplicateKeyPolicy::Reject => {
                        return Err(AnalysisError::DuplicateKey {
                            side: side.to_string(),
                            entity: record.entity.clone(),
                            year: record.year,
                        })
                    }
                }
            }
            values.push(record.value);
        }
        Ok(index)
    }
}

//! Row Filter - Keeps entities with enough observations, or a chosen subset

use crate::records::NormalizedRecord;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Default minimum number of observations an entity needs to be kept.
pub const DEFAULT_MIN_OBSERVATIONS: usize = 10;

/// Observation count per entity.
pub fn observation_counts(records: &[NormalizedRecord]) -> HashMap<&str, usize> {
    records.iter().map(|r| r.entity.as_str()).counts()
}

/// Keep only records whose entity has at least `min_count` records.
///
/// Entities below the threshold are dropped entirely. Input order is preserved,
/// so re-applying with the same or a lower threshold is a no-op.
pub fn filter_min_observations(
    records: &[NormalizedRecord],
    min_count: usize,
) -> Vec<NormalizedRecord> {
    let counts = observation_counts(records);
    let kept: Vec<NormalizedRecord> = records
        .iter()
        .filter(|r| counts.get(r.entity.as_str()).copied().unwrap_or(0) >= min_count)
        .cloned()
        .collect();

    let dropped_entities = counts.values().filter(|&&c| c < min_count).count();
    if dropped_entities > 0 {
        info!(
            "Dropped {} entities ({} records) with fewer than {} observations",
            dropped_entities,
            records.len() - kept.len(),
            min_count
        );
    }

    kept
}

/// Result of restricting a record set to a caller-chosen list of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Requested entities that have data, in the requested order.
    pub entities: Vec<String>,
    /// Records of those entities, grouped in the requested order.
    pub records: Vec<NormalizedRecord>,
    /// Requested entities with no records at all.
    pub missing: Vec<String>,
}

/// Keep only the listed entities, ordered as listed.
pub fn select_entities(records: &[NormalizedRecord], wanted: &[String]) -> Selection {
    let mut by_entity: HashMap<&str, Vec<&NormalizedRecord>> = HashMap::new();
    for record in records {
        by_entity.entry(record.entity.as_str()).or_default().push(record);
    }

    let mut selection = Selection {
        entities: Vec::new(),
        records: Vec::new(),
        missing: Vec::new(),
    };

    let mut seen = HashSet::new();
    for name in wanted {
        if !seen.insert(name.as_str()) {
            continue;
        }
        match by_entity.get(name.as_str()) {
            Some(rows) => {
                selection.entities.push(name.clone());
                selection.records.extend(rows.iter().map(|r| (*r).clone()));
            }
            None => selection.missing.push(name.clone()),
        }
    }

    if !selection.missing.is_empty() {
        warn!("Selected entities without data: {:?}", selection.missing);
    }
    debug!(
        "Selected {} of {} requested entities",
        selection.entities.len(),
        seen.len()
    );

    selection
}

/// The `n` entities with the most observations, ties broken by name.
pub fn top_entities_by_count(records: &[NormalizedRecord], n: usize) -> Vec<(String, usize)> {
    observation_counts(records)
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .take(n)
        .map(|(entity, count)| (entity.to_string(), count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(entity: &str, n: usize) -> Vec<NormalizedRecord> {
        (0..n)
            .map(|i| NormalizedRecord::new(entity, 2000 + i as i32, i as f64))
            .collect()
    }

    #[test]
    fn test_threshold_drops_whole_entities() {
        let mut records = series("X", 9);
        records.extend(series("Y", 11));

        let kept = filter_min_observations(&records, 10);

        assert_eq!(kept.len(), 11);
        assert!(kept.iter().all(|r| r.entity == "Y"));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let mut records = series("A", 3);
        records.extend(series("B", 5));
        records.extend(series("C", 12));

        let once = filter_min_observations(&records, 5);
        assert_eq!(filter_min_observations(&once, 5), once);
        assert_eq!(filter_min_observations(&once, 2), once);
    }

    #[test]
    fn test_select_entities_keeps_requested_order() {
        let mut records = series("France", 2);
        records.extend(series("Germany", 1));
        let wanted = vec![
            "Germany".to_string(),
            "Greece".to_string(),
            "France".to_string(),
        ];

        let selection = select_entities(&records, &wanted);

        assert_eq!(selection.entities, vec!["Germany", "France"]);
        assert_eq!(selection.missing, vec!["Greece"]);
        assert_eq!(selection.records[0].entity, "Germany");
        assert_eq!(selection.records.len(), 3);
    }

    #[test]
    fn test_top_entities_by_count() {
        let mut records = series("Chile", 3);
        records.extend(series("Brazil", 3));
        records.extend(series("Spain", 5));
        records.extend(series("Japan", 1));

        let top = top_entities_by_count(&records, 3);

        assert_eq!(
            top,
            vec![
                ("Spain".to_string(), 5),
                ("Brazil".to_string(), 3),
                ("Chile".to_string(), 3),
            ]
        );
    }
}

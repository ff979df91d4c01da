//! Pipeline - load → normalize → filter → (profile | join → correlate → summary)
//!
//! Every stage takes its inputs as parameters and returns owned results; the
//! renderer receives finished tables and nothing else.

use crate::config::{AnalysisConfig, CorrelationJob, DatasetConfig};
use crate::correlation::{CorrelationAnalyzer, CorrelationReport, CorrelationResult};
use crate::error::{AnalysisError, Result};
use crate::filter::{
    filter_min_observations, select_entities, top_entities_by_count, Selection,
    DEFAULT_MIN_OBSERVATIONS,
};
use crate::join::{JoinReport, Joiner};
use crate::normalize::{NormalizationReport, Normalized, SchemaNormalizer};
use crate::raw_table::RawTable;
use crate::records::{NormalizedRecord, PairedObservation};
use crate::render::ChartRenderer;
use crate::stats::{summarize_dataset, summarize_entities, DatasetSummary, EntitySummary};
use crate::summary::write_summary_csv;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Load a dataset's CSV and normalize it.
pub fn load_dataset(config: &DatasetConfig) -> Result<Normalized> {
    let table = RawTable::load_csv(&config.path, config.skip_rows)?;
    normalize_table(&table, config)
}

pub fn normalize_table(table: &RawTable, config: &DatasetConfig) -> Result<Normalized> {
    SchemaNormalizer::new(&config.layout, &config.aliases).normalize(table)
}

/// Everything the renderer needs for a single-dataset deck.
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    pub name: String,
    /// Records of entities meeting the observation minimum.
    pub records: Vec<NormalizedRecord>,
    pub min_observations: usize,
    pub normalization: NormalizationReport,
    pub summary: DatasetSummary,
    pub entities: Vec<EntitySummary>,
    /// Entities with the most observations, before the minimum is applied.
    pub top_entities: Vec<(String, usize)>,
    /// Present when the configuration lists selected entities. Drawn from the
    /// unfiltered records, as the selected-country decks are.
    pub selection: Option<Selection>,
}

pub fn profile_dataset(config: &DatasetConfig, normalized: &Normalized) -> DatasetProfile {
    let min_observations = config.min_observations.unwrap_or(DEFAULT_MIN_OBSERVATIONS);
    let records = filter_min_observations(&normalized.records, min_observations);
    let summary = summarize_dataset(&records);
    let entities = summarize_entities(&records);
    let top_entities = config
        .top_n
        .map(|n| top_entities_by_count(&normalized.records, n))
        .unwrap_or_default();
    let selection = (!config.selected_entities.is_empty())
        .then(|| select_entities(&normalized.records, &config.selected_entities));

    info!(
        "{}: {} entities with at least {} observations, {} records",
        config.name, summary.entities, min_observations, summary.records
    );

    DatasetProfile {
        name: config.name.clone(),
        records,
        min_observations,
        normalization: normalized.report.clone(),
        summary,
        entities,
        top_entities,
        selection,
    }
}

/// Everything the renderer needs for a pairwise correlation deck.
#[derive(Debug, Clone)]
pub struct CorrelationDeck {
    pub name: String,
    pub left: String,
    pub right: String,
    pub pairs: Vec<PairedObservation>,
    pub join: JoinReport,
    pub correlations: CorrelationReport,
}

/// Join two record sets and correlate them.
pub fn correlate_records(
    name: &str,
    (left_name, left): (&str, &[NormalizedRecord]),
    (right_name, right): (&str, &[NormalizedRecord]),
    joiner: &Joiner,
    analyzer: &CorrelationAnalyzer,
) -> Result<CorrelationDeck> {
    let joined = joiner.join(left, right)?;
    let correlations = analyzer.analyze(&joined.pairs);

    if let Some(all) = &correlations.aggregate {
        info!(
            "{}: pooled r = {:.3} (p = {:.3e}, N = {})",
            name, all.coefficient, all.p_value, all.sample_size
        );
    } else {
        info!("{}: no paired data", name);
    }

    Ok(CorrelationDeck {
        name: name.to_string(),
        left: left_name.to_string(),
        right: right_name.to_string(),
        pairs: joined.pairs,
        join: joined.report,
        correlations,
    })
}

/// Rows written to the summary file for a job.
pub fn summary_rows(job: &CorrelationJob, report: &CorrelationReport) -> Vec<CorrelationResult> {
    let mut rows = report.per_entity.clone();
    if job.include_aggregate {
        rows.extend(report.aggregate.clone());
    }
    rows
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub profiles: Vec<DatasetProfile>,
    pub decks: Vec<CorrelationDeck>,
    pub summaries_written: Vec<PathBuf>,
}

/// Run every dataset profile and correlation job of a configuration.
pub fn run_config(config: &AnalysisConfig, renderer: &mut dyn ChartRenderer) -> Result<RunSummary> {
    config.validate()?;

    let mut loaded: HashMap<&str, Normalized> = HashMap::new();
    let mut run = RunSummary::default();

    for dataset in &config.datasets {
        let normalized = load_dataset(dataset)?;
        let profile = profile_dataset(dataset, &normalized);
        renderer.render_profile(&profile)?;
        run.profiles.push(profile);
        loaded.insert(dataset.name.as_str(), normalized);
    }

    for job in &config.correlations {
        let left = job_records(config.dataset(&job.left)?, &loaded)?;
        let right = job_records(config.dataset(&job.right)?, &loaded)?;

        let deck = correlate_records(
            &job.name,
            (job.left.as_str(), left.as_slice()),
            (job.right.as_str(), right.as_slice()),
            &Joiner::new(job.duplicate_policy),
            &CorrelationAnalyzer::new(job.min_samples),
        )?;

        // Persisted before rendering starts
        write_summary_csv(&job.summary_path, &summary_rows(job, &deck.correlations), job.order)?;
        run.summaries_written.push(job.summary_path.clone());

        renderer.render_correlation(&deck)?;
        run.decks.push(deck);
    }

    Ok(run)
}

fn job_records(
    dataset: &DatasetConfig,
    loaded: &HashMap<&str, Normalized>,
) -> Result<Vec<NormalizedRecord>> {
    let normalized = loaded
        .get(dataset.name.as_str())
        .ok_or_else(|| AnalysisError::UnknownDataset(dataset.name.clone()))?;
    Ok(match dataset.min_observations {
        Some(k) => filter_min_observations(&normalized.records, k),
        None => normalized.records.clone(),
    })
}

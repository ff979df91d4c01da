//! Analysis configuration: which sources to load and which pairs to correlate
//!
//! Loaded from a single JSON file. Relative dataset and summary paths are
//! resolved against the directory holding that file.

use crate::alias::EntityAliasMap;
use crate::correlation::{SortOrder, DEFAULT_MIN_SAMPLES};
use crate::error::{AnalysisError, Result};
use crate::join::DuplicateKeyPolicy;
use crate::normalize::SourceLayout;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub path: PathBuf,
    /// Preamble lines before the CSV header.
    #[serde(default)]
    pub skip_rows: usize,
    pub layout: SourceLayout,
    #[serde(default)]
    pub aliases: EntityAliasMap,
    /// Minimum observations per entity. Profiles fall back to
    /// `DEFAULT_MIN_OBSERVATIONS`; correlation jobs only filter when set.
    #[serde(default)]
    pub min_observations: Option<usize>,
    /// Entities for the "selected" view, in presentation order.
    #[serde(default)]
    pub selected_entities: Vec<String>,
    /// Size of the "most observations" view.
    #[serde(default)]
    pub top_n: Option<usize>,
}

impl DatasetConfig {
    pub fn new(name: &str, path: impl Into<PathBuf>, layout: SourceLayout) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            skip_rows: 0,
            layout,
            aliases: EntityAliasMap::new(),
            min_observations: None,
            selected_entities: Vec::new(),
            top_n: None,
        }
    }

    /// Built-in description of one of the known demographic exports.
    pub fn preset(preset: DatasetPreset, path: impl Into<PathBuf>) -> Self {
        match preset {
            DatasetPreset::ContraceptivePrevalence => Self::new(
                "contraceptive_prevalence",
                path,
                SourceLayout::long("Location", "Time", "Value"),
            ),
            DatasetPreset::FertilityRate => Self::new(
                "fertility_rate",
                path,
                SourceLayout::long("Country", "TIME_PERIOD", "OBS_VALUE"),
            ),
            DatasetPreset::OldAgeDependency => Self::new(
                "old_age_dependency",
                path,
                SourceLayout::long("Country", "TIME_PERIOD", "OBS_VALUE"),
            ),
            DatasetPreset::FemaleLaborParticipation => {
                let mut config = Self::new(
                    "female_labor_participation",
                    path,
                    SourceLayout::wide("Country Name"),
                );
                // World Bank exports carry four metadata lines above the header
                config.skip_rows = 4;
                config.aliases = EntityAliasMap::new()
                    .with_alias("Korea, Rep.", "Korea")
                    .with_alias("Korea, Republic of", "Korea");
                config
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetPreset {
    ContraceptivePrevalence,
    FertilityRate,
    FemaleLaborParticipation,
    OldAgeDependency,
}

impl DatasetPreset {
    pub const NAMES: [&'static str; 4] = [
        "contraceptive",
        "fertility",
        "female-labor",
        "old-age-dependency",
    ];
}

impl FromStr for DatasetPreset {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "contraceptive" | "contraceptive-prevalence" => Ok(DatasetPreset::ContraceptivePrevalence),
            "fertility" | "fertility-rate" => Ok(DatasetPreset::FertilityRate),
            "female-labor" | "female-labor-participation" => Ok(DatasetPreset::FemaleLaborParticipation),
            "old-age-dependency" | "old-age" => Ok(DatasetPreset::OldAgeDependency),
            other => Err(AnalysisError::Config(format!(
                "Unknown preset '{}', expected one of {:?}",
                other,
                DatasetPreset::NAMES
            ))),
        }
    }
}

fn default_min_samples() -> usize {
    DEFAULT_MIN_SAMPLES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationJob {
    pub name: String,
    /// Dataset providing `value_a`.
    pub left: String,
    /// Dataset providing `value_b`.
    pub right: String,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default)]
    pub duplicate_policy: DuplicateKeyPolicy,
    pub summary_path: PathBuf,
    #[serde(default)]
    pub order: SortOrder,
    /// Also write the pooled "ALL" row into the summary.
    #[serde(default)]
    pub include_aggregate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub correlations: Vec<CorrelationJob>,
}

impl AnalysisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config: AnalysisConfig = serde_json::from_str(&content)
            .map_err(|e| AnalysisError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Make relative paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for dataset in &mut self.datasets {
            if dataset.path.is_relative() {
                dataset.path = base.join(&dataset.path);
            }
        }
        for job in &mut self.correlations {
            if job.summary_path.is_relative() {
                job.summary_path = base.join(&job.summary_path);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                return Err(AnalysisError::Config("Dataset with empty name".to_string()));
            }
            if !names.insert(dataset.name.as_str()) {
                return Err(AnalysisError::Config(format!(
                    "Dataset '{}' defined more than once",
                    dataset.name
                )));
            }
            if dataset.layout.required_columns().iter().any(|c| c.trim().is_empty()) {
                return Err(AnalysisError::Config(format!(
                    "Dataset '{}' has an empty column name",
                    dataset.name
                )));
            }
        }

        for job in &self.correlations {
            for side in [&job.left, &job.right] {
                if !names.contains(side.as_str()) {
                    return Err(AnalysisError::UnknownDataset(format!(
                        "{} (referenced by correlation '{}')",
                        side, job.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| AnalysisError::UnknownDataset(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "datasets": [
            {
                "name": "labor",
                "path": "data/labor.csv",
                "skip_rows": 4,
                "layout": { "kind": "wide", "entity_column": "Country Name" },
                "aliases": { "Korea, Rep.": "Korea" }
            },
            {
                "name": "fertility",
                "path": "/abs/fertility.csv",
                "layout": {
                    "kind": "long",
                    "entity_column": "Country",
                    "year_column": "TIME_PERIOD",
                    "value_column": "OBS_VALUE"
                },
                "min_observations": 10
            }
        ],
        "correlations": [
            {
                "name": "labor_vs_fertility",
                "left": "labor",
                "right": "fertility",
                "summary_path": "out/summary.csv"
            }
        ]
    }"#;

    #[test]
    fn test_parse_and_defaults() {
        let mut config: AnalysisConfig = serde_json::from_str(CONFIG).unwrap();
        config.resolve_paths(Path::new("/work"));
        config.validate().unwrap();

        let labor = config.dataset("labor").unwrap();
        assert_eq!(labor.path, PathBuf::from("/work/data/labor.csv"));
        assert_eq!(labor.skip_rows, 4);
        assert_eq!(labor.aliases.resolve("Korea, Rep."), "Korea");
        assert_eq!(labor.min_observations, None);

        let fertility = config.dataset("fertility").unwrap();
        assert_eq!(fertility.path, PathBuf::from("/abs/fertility.csv"));
        assert_eq!(fertility.min_observations, Some(10));

        let job = &config.correlations[0];
        assert_eq!(job.min_samples, DEFAULT_MIN_SAMPLES);
        assert_eq!(job.duplicate_policy, DuplicateKeyPolicy::CrossProduct);
        assert_eq!(job.order, SortOrder::Ascending);
        assert_eq!(job.summary_path, PathBuf::from("/work/out/summary.csv"));
    }

    #[test]
    fn test_unknown_dataset_in_job() {
        let mut config: AnalysisConfig = serde_json::from_str(CONFIG).unwrap();
        config.correlations[0].right = "old_age".to_string();

        assert!(matches!(
            config.validate(),
            Err(AnalysisError::UnknownDataset(_))
        ));
    }

    #[test]
    fn test_duplicate_dataset_names() {
        let mut config: AnalysisConfig = serde_json::from_str(CONFIG).unwrap();
        config.datasets[1].name = "labor".to_string();
        config.correlations.clear();

        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_presets() {
        let labor = DatasetConfig::preset(
            "female_labor".parse().unwrap(),
            "Female labor force participation rate.csv",
        );
        assert_eq!(labor.skip_rows, 4);
        assert_eq!(labor.layout, SourceLayout::wide("Country Name"));
        assert_eq!(labor.aliases.resolve("Korea, Republic of"), "Korea");

        let contraceptive = DatasetConfig::preset(DatasetPreset::ContraceptivePrevalence, "c.csv");
        assert_eq!(contraceptive.layout, SourceLayout::long("Location", "Time", "Value"));

        assert!("population".parse::<DatasetPreset>().is_err());
    }
}

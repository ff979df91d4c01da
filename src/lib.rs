pub mod alias;
pub mod config;
pub mod correlation;
pub mod error;
pub mod filter;
pub mod join;
pub mod normalize;
pub mod pipeline;
pub mod raw_table;
pub mod records;
pub mod render;
pub mod stats;
pub mod summary;

pub use alias::EntityAliasMap;
pub use config::{AnalysisConfig, CorrelationJob, DatasetConfig, DatasetPreset};
pub use correlation::{
    CorrelationAnalyzer, CorrelationReport, CorrelationResult, SignificanceBand, SortOrder,
    AGGREGATE_ENTITY,
};
pub use error::{AnalysisError, Result};
pub use join::{DuplicateKeyPolicy, Joiner};
pub use normalize::{SchemaNormalizer, SourceLayout};
pub use raw_table::RawTable;
pub use records::{NormalizedRecord, PairedObservation};

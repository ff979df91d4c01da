use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use demography_analytics::config::{AnalysisConfig, DatasetConfig, DatasetPreset};
use demography_analytics::correlation::{CorrelationAnalyzer, SortOrder};
use demography_analytics::join::{DuplicateKeyPolicy, Joiner};
use demography_analytics::pipeline::{
    correlate_records, load_dataset, profile_dataset, run_config, CorrelationDeck, DatasetProfile,
};
use demography_analytics::render::{ChartRenderer, NullRenderer, TableExportRenderer};
use demography_analytics::summary::write_summary_csv;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "demography-analytics")]
#[command(about = "Normalize demographic indicator exports and correlate them per country")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean one dataset and print its per-entity profile
    Profile {
        csv: PathBuf,

        /// Known export layout (contraceptive, fertility, female-labor, old-age-dependency)
        #[arg(short, long)]
        preset: String,

        /// Minimum observations an entity needs to be kept
        #[arg(long, default_value_t = 10)]
        min_observations: usize,

        /// Also list the N entities with the most observations
        #[arg(long)]
        top: Option<usize>,

        /// Entities to select, in presentation order
        #[arg(long = "select", num_args = 1..)]
        selected: Vec<String>,

        /// Directory for exported tables
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Join two datasets on (entity, year) and correlate them
    Correlate {
        left: PathBuf,
        right: PathBuf,

        #[arg(long)]
        left_preset: String,

        #[arg(long)]
        right_preset: String,

        /// Minimum paired observations per entity
        #[arg(long, default_value_t = 2)]
        min_samples: usize,

        #[arg(long, value_enum, default_value_t = PolicyArg::CrossProduct)]
        duplicate_policy: PolicyArg,

        /// Where to write entity,coefficient,p_value,sample_size
        #[arg(long, default_value = "correlation_summary.csv")]
        summary: PathBuf,

        #[arg(long, value_enum, default_value_t = OrderArg::Ascending)]
        order: OrderArg,

        /// Include the pooled ALL row in the summary file
        #[arg(long)]
        include_aggregate: bool,

        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Run every dataset and correlation job of a JSON configuration
    Run {
        config: PathBuf,

        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    CrossProduct,
    FirstWins,
    Reject,
}

impl From<PolicyArg> for DuplicateKeyPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::CrossProduct => DuplicateKeyPolicy::CrossProduct,
            PolicyArg::FirstWins => DuplicateKeyPolicy::FirstWins,
            PolicyArg::Reject => DuplicateKeyPolicy::Reject,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Ascending,
    Descending,
}

impl From<OrderArg> for SortOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Ascending => SortOrder::Ascending,
            OrderArg::Descending => SortOrder::Descending,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Profile {
            csv,
            preset,
            min_observations,
            top,
            selected,
            export_dir,
        } => {
            let mut dataset = DatasetConfig::preset(preset.parse::<DatasetPreset>()?, csv);
            dataset.min_observations = Some(min_observations);
            dataset.top_n = top;
            dataset.selected_entities = selected;

            let normalized = load_dataset(&dataset)
                .with_context(|| format!("Failed to load {}", dataset.path.display()))?;
            let profile = profile_dataset(&dataset, &normalized);

            let mut renderer = renderer_for(export_dir)?;
            renderer.render_profile(&profile)?;
            print_profile(&profile);
        }

        Command::Correlate {
            left,
            right,
            left_preset,
            right_preset,
            min_samples,
            duplicate_policy,
            summary,
            order,
            include_aggregate,
            export_dir,
        } => {
            let left = DatasetConfig::preset(left_preset.parse::<DatasetPreset>()?, left);
            let right = DatasetConfig::preset(right_preset.parse::<DatasetPreset>()?, right);

            let left_records = load_dataset(&left)
                .with_context(|| format!("Failed to load {}", left.path.display()))?
                .records;
            let right_records = load_dataset(&right)
                .with_context(|| format!("Failed to load {}", right.path.display()))?
                .records;

            let name = format!("{}_vs_{}", left.name, right.name);
            let deck = correlate_records(
                &name,
                (left.name.as_str(), left_records.as_slice()),
                (right.name.as_str(), right_records.as_slice()),
                &Joiner::new(duplicate_policy.into()),
                &CorrelationAnalyzer::new(min_samples),
            )?;

            let mut rows = deck.correlations.per_entity.clone();
            if include_aggregate {
                rows.extend(deck.correlations.aggregate.clone());
            }
            write_summary_csv(&summary, &rows, order.into())
                .with_context(|| format!("Failed to write {}", summary.display()))?;

            let mut renderer = renderer_for(export_dir)?;
            renderer.render_correlation(&deck)?;
            print_deck(&deck, order.into());
        }

        Command::Run { config, export_dir } => {
            let analysis = AnalysisConfig::load(&config)
                .with_context(|| format!("Failed to load config {}", config.display()))?;
            let mut renderer = renderer_for(export_dir)?;
            let run = run_config(&analysis, renderer.as_mut())?;

            for profile in &run.profiles {
                print_profile(profile);
            }
            for deck in &run.decks {
                print_deck(deck, SortOrder::Descending);
            }
            info!("Wrote {} summary files", run.summaries_written.len());
        }
    }

    Ok(())
}

fn renderer_for(export_dir: Option<PathBuf>) -> Result<Box<dyn ChartRenderer>> {
    Ok(match export_dir {
        Some(dir) => Box::new(TableExportRenderer::new(dir)?),
        None => Box::new(NullRenderer),
    })
}

fn print_profile(profile: &DatasetProfile) {
    println!("\n=== {} ===", profile.name);
    println!(
        "{} records kept of {} candidates ({} dropped)",
        profile.normalization.kept,
        profile.normalization.candidates,
        profile.normalization.dropped()
    );
    if let Some((first, last)) = profile.summary.year_range {
        println!(
            "{} entities with at least {} observations, {}-{}",
            profile.summary.entities, profile.min_observations, first, last
        );
    }
    for entity in &profile.entities {
        println!(
            "  {:<30} n={:<4} {}-{} mean={:.2}",
            entity.entity, entity.observations, entity.first_year, entity.last_year, entity.mean
        );
    }
    if !profile.top_entities.is_empty() {
        println!("Most observations:");
        for (entity, count) in &profile.top_entities {
            println!("  {:<30} {}", entity, count);
        }
    }
    if let Some(selection) = &profile.selection {
        if !selection.missing.is_empty() {
            println!("Selected entities without data: {}", selection.missing.join(", "));
        }
    }
}

fn print_deck(deck: &CorrelationDeck, order: SortOrder) {
    println!("\n=== {} ({} vs {}) ===", deck.name, deck.left, deck.right);
    println!(
        "{} paired observations over {} matched keys",
        deck.join.pairs, deck.join.matched_keys
    );
    if let Some(all) = &deck.correlations.aggregate {
        println!(
            "  {:<30} r={:>7.3} p={:.3e} N={} {}",
            all.entity,
            all.coefficient,
            all.p_value,
            all.sample_size,
            all.significance().marker()
        );
    }
    for result in deck.correlations.ranked(order) {
        if result.is_defined() {
            println!(
                "  {:<30} r={:>7.3} p={:.3e} N={} {}",
                result.entity,
                result.coefficient,
                result.p_value,
                result.sample_size,
                result.significance().marker()
            );
        } else {
            println!("  {:<30} undefined (N={})", result.entity, result.sample_size);
        }
    }
    for (entity, n) in &deck.correlations.skipped {
        println!("  {:<30} skipped (N={})", entity, n);
    }
}

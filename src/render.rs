//! Chart renderer seam
//!
//! Figure layout and PDF composition live outside this crate. A renderer is
//! handed finished profiles and correlation decks; `TableExportRenderer` writes
//! the underlying tables to CSV so any plotting tool can pick them up.

use crate::correlation::SortOrder;
use crate::error::Result;
use crate::normalize::pivot_wide;
use crate::pipeline::{CorrelationDeck, DatasetProfile};
use crate::records::{pairs_to_frame, records_to_frame};
use crate::stats::entity_summaries_to_frame;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait ChartRenderer {
    fn render_profile(&mut self, profile: &DatasetProfile) -> Result<()>;
    fn render_correlation(&mut self, deck: &CorrelationDeck) -> Result<()>;
}

/// Renderer that draws nothing.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl ChartRenderer for NullRenderer {
    fn render_profile(&mut self, _profile: &DatasetProfile) -> Result<()> {
        Ok(())
    }

    fn render_correlation(&mut self, _deck: &CorrelationDeck) -> Result<()> {
        Ok(())
    }
}

/// Writes each handoff table as `<name>_<table>.csv` under one directory.
#[derive(Debug)]
pub struct TableExportRenderer {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl TableExportRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&mut self, name: &str, table: &str, df: &mut DataFrame) -> Result<()> {
        let path = self.dir.join(format!("{}_{}.csv", name, table));
        write_frame(&path, df)?;
        debug!("Exported {} rows to {}", df.height(), path.display());
        self.written.push(path);
        Ok(())
    }
}

fn write_frame(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

impl ChartRenderer for TableExportRenderer {
    fn render_profile(&mut self, profile: &DatasetProfile) -> Result<()> {
        self.write(&profile.name, "records", &mut records_to_frame(&profile.records)?)?;
        self.write(&profile.name, "wide", &mut pivot_wide(&profile.records, "entity")?)?;
        self.write(
            &profile.name,
            "entities",
            &mut entity_summaries_to_frame(&profile.entities)?,
        )?;
        if let Some(selection) = &profile.selection {
            self.write(&profile.name, "selected", &mut records_to_frame(&selection.records)?)?;
        }
        Ok(())
    }

    fn render_correlation(&mut self, deck: &CorrelationDeck) -> Result<()> {
        self.write(
            &deck.name,
            "pairs",
            &mut pairs_to_frame(&deck.pairs, &deck.left, &deck.right)?,
        )?;
        self.write(
            &deck.name,
            "correlations",
            &mut deck.correlations.to_frame(SortOrder::Descending)?,
        )?;
        Ok(())
    }
}

//! Export of recorded breakthrough curves
//!
//! # Architecture
//!
//! The [`Exporter`] trait abstracts the file format; each format lives in
//! its own sub-module. Adding a format means adding a file and an
//! implementation, without touching the recorder.
//!
//! | Format | Module    |
//! |--------|-----------|
//! | CSV    | [`csv`]   |
//!
//! # Usage example
//!
//! ```rust,ignore
//! use rtcouple_rs::output::export::{CsvExporter, Exporter};
//!
//! let exporter = CsvExporter::default();
//! exporter.export(engine.breakthrough(), engine.species(), "btc.csv")?;
//! ```

pub mod csv;

pub use csv::{CsvConfig, CsvMetadata, export_breakthrough_csv};

use std::path::Path;

use crate::error::CouplingError;
use crate::output::breakthrough::BreakthroughRecorder;
use crate::physics::SpeciesTable;

/// Abstraction over export formats
///
/// Each format picks its own error type.
pub trait Exporter {
    type Error: std::error::Error;

    /// Write every recorded sample of `recorder`
    ///
    /// # Errors
    ///
    /// Nothing recorded, or the file cannot be written.
    fn export(&self, recorder: &BreakthroughRecorder, species: &SpeciesTable, path: &Path)
    -> Result<(), Self::Error>;
}

/// CSV implementation of [`Exporter`]
#[derive(Debug, Clone, Default)]
pub struct CsvExporter {
    pub config: CsvConfig,
}

impl CsvExporter {
    pub fn new(config: CsvConfig) -> Self {
        Self { config }
    }
}

impl Exporter for CsvExporter {
    type Error = CouplingError;

    fn export(&self, recorder: &BreakthroughRecorder, species: &SpeciesTable, path: &Path) -> Result<(), CouplingError> {
        let samples = recorder.samples();
        let times: Vec<i64> = samples.iter().map(|s| s.time).collect();
        let rows: Vec<Vec<f64>> = samples.iter().map(|s| s.values.clone()).collect();

        let mut config = self.config.clone();
        if let Some(metadata) = config.metadata.as_mut() {
            metadata.steps.get_or_insert(samples.len());
            if metadata.locations.is_empty() {
                metadata.locations = recorder.locations().to_vec();
            }
        }

        export_breakthrough_csv(&times, &recorder.column_labels(species), &rows, path, Some(&config))
    }
}

//! Reported state of a coupling run
//!
//! - **Breakthrough**: per-step `log10` concentrations at monitored volumes,
//!   with point-source injection blending
//! - **Export**: CSV files for external analysis
//!
//! # Architecture
//!
//! ```text
//! output/
//! ├── mod.rs              ← This file
//! ├── breakthrough.rs     ← Recorder and injection blend
//! └── export/             ← Data export
//!     ├── mod.rs          ← Exporter trait
//!     └── csv.rs
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rtcouple_rs::output::export::{CsvExporter, Exporter};
//!
//! // after running the engine
//! CsvExporter::default().export(engine.breakthrough(), engine.species(), "btc.csv".as_ref())?;
//! ```

pub mod breakthrough;
pub mod export;

pub use breakthrough::{BreakthroughRecorder, BreakthroughSample, ResolvedInjection};
pub use export::{CsvConfig, CsvExporter, CsvMetadata, Exporter, export_breakthrough_csv};

//! CSV export of breakthrough curves
//!
//! One row per recorded coupling step, one column per monitored
//! `(species, location)` pair. The file opens with an optional block of
//! `#` comment lines describing the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use rtcouple_rs::output::export::{CsvConfig, CsvMetadata, export_breakthrough_csv};
//!
//! let metadata = CsvMetadata {
//!     run_name: Some("hillslope".to_string()),
//!     stepsize: Some(60),
//!     ..Default::default()
//! };
//! let config = CsvConfig::default().with_metadata(metadata);
//!
//! export_breakthrough_csv(&[0, 60], &["Cl@4".into()], &[vec![-4.0], vec![-3.9]], "btc.csv", Some(&config))?;
//! ```
//!
//! **Output** (`btc.csv`):
//! ```csv
//! # Reactive Transport Breakthrough Data
//! # Generated: 2026-02-11T15:30:00Z
//! # Run: hillslope
//! # Coupling Step: 60 s
//! #
//! Time (s),Cl@4
//! 0,-4.000000
//! 60,-3.900000
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{CouplingError, Result};

// =============================================================================
// Configuration Structures
// =============================================================================

/// Configuration for CSV export
#[derive(Debug, Clone)]
pub struct CsvConfig {
    /// Column delimiter (default: ',')
    pub delimiter: char,

    /// Decimal separator (default: '.')
    pub decimal_separator: char,

    /// Number of decimal places for floating-point values (default: 6)
    pub precision: usize,

    /// Include metadata header comments (default: false)
    pub include_metadata: bool,

    /// Metadata to include in header
    pub metadata: Option<CsvMetadata>,

    /// Header of the time column (default: "Time (s)")
    pub time_header: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            decimal_separator: '.',
            precision: 6,
            include_metadata: false,
            metadata: None,
            time_header: "Time (s)".to_string(),
        }
    }
}

impl CsvConfig {
    /// Semicolon delimiter, comma decimal separator
    pub fn european() -> Self {
        Self { delimiter: ';', decimal_separator: ',', ..Default::default() }
    }

    /// 12 decimal places
    pub fn high_precision() -> Self {
        Self { precision: 12, ..Default::default() }
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Enable the metadata header
    pub fn with_metadata(mut self, metadata: CsvMetadata) -> Self {
        self.include_metadata = true;
        self.metadata = Some(metadata);
        self
    }
}

/// Metadata for CSV header comments; only `Some` fields are written
#[derive(Debug, Clone, Default)]
pub struct CsvMetadata {
    pub run_name: Option<String>,

    /// Reaction delay (seconds)
    pub reaction_delay: Option<i64>,

    /// Coupling interval (seconds)
    pub stepsize: Option<i64>,

    /// Number of coupling steps recorded
    pub steps: Option<usize>,

    /// Monitored volume indices
    pub locations: Vec<usize>,

    /// Additional custom parameters
    pub custom: Vec<(String, String)>,
}

impl CsvMetadata {
    pub fn add_custom(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom.push((key.into(), value.into()));
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn write_metadata_header(out: &mut impl Write, metadata: &CsvMetadata) -> std::io::Result<()> {
    writeln!(out, "# Reactive Transport Breakthrough Data")?;

    let now = chrono::Utc::now();
    writeln!(out, "# Generated: {}", now.to_rfc3339())?;

    if let Some(name) = &metadata.run_name {
        writeln!(out, "# Run: {}", name)?;
    }
    if let Some(delay) = metadata.reaction_delay {
        writeln!(out, "# Reaction Delay: {} s", delay)?;
    }
    if let Some(step) = metadata.stepsize {
        writeln!(out, "# Coupling Step: {} s", step)?;
    }
    if let Some(steps) = metadata.steps {
        writeln!(out, "# Steps: {}", steps)?;
    }
    if !metadata.locations.is_empty() {
        let list: Vec<String> = metadata.locations.iter().map(usize::to_string).collect();
        writeln!(out, "# Locations: {}", list.join(" "))?;
    }

    for (key, value) in &metadata.custom {
        writeln!(out, "# {}: {}", key, value)?;
    }

    writeln!(out, "#")
}

/// Format number with configured precision and decimal separator
fn format_number(value: f64, config: &CsvConfig) -> String {
    let formatted = format!("{:.prec$}", value, prec = config.precision);

    if config.decimal_separator != '.' {
        formatted.replace('.', &config.decimal_separator.to_string())
    } else {
        formatted
    }
}

fn export_error(msg: String) -> CouplingError {
    CouplingError::Export(msg)
}

// =============================================================================
// Export Functions
// =============================================================================

/// Write breakthrough rows to CSV
///
/// # Errors
///
/// - empty data
/// - a row whose width differs from `columns`
/// - `times` and `rows` of different lengths
/// - NaN values (`-inf` from zero concentrations is written as is)
/// - file creation or write failures
pub fn export_breakthrough_csv(
    times: &[i64],
    columns: &[String],
    rows: &[Vec<f64>],
    output_path: impl AsRef<Path>,
    configuration: Option<&CsvConfig>,
) -> Result<()> {
    // ============================= Validation =============================

    if times.is_empty() || columns.is_empty() {
        return Err(export_error("Empty data: no time steps or no columns".into()));
    }

    if times.len() != rows.len() {
        return Err(export_error(format!(
            "Data length mismatch: {} time points versus {} rows",
            times.len(),
            rows.len()
        )));
    }

    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(export_error(format!(
                "Row {} width mismatch: {} values versus {} columns",
                i,
                row.len(),
                columns.len()
            )));
        }
        if let Some(c) = row.iter().position(|v| v.is_nan()) {
            return Err(export_error(format!("Invalid data: NaN in column {} at row {}", columns[c], i)));
        }
    }

    // ============================= Configuration ==========================

    let binding = CsvConfig::default();
    let configuration = configuration.unwrap_or(&binding);
    let delimiter = configuration.delimiter.to_string();

    // ============================= Write ==================================

    let mut out = BufWriter::new(File::create(output_path)?);

    if configuration.include_metadata
        && let Some(metadata) = &configuration.metadata
    {
        write_metadata_header(&mut out, metadata)?;
    }

    writeln!(out, "{}{}{}", configuration.time_header, delimiter, columns.join(&delimiter))?;

    for (time, row) in times.iter().zip(rows) {
        write!(out, "{}", time)?;
        for value in row {
            write!(out, "{}{}", delimiter, format_number(*value, configuration))?;
        }
        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    fn columns() -> Vec<String> {
        vec!["Cl@4".to_string(), "Br@4".to_string()]
    }

    #[test]
    fn test_basic_export() {
        let file = NamedTempFile::new().unwrap();
        export_breakthrough_csv(&[0, 60], &columns(), &[vec![-4.0, -5.0], vec![-3.5, -5.0]], file.path(), None)
            .unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Time (s),Cl@4,Br@4");
        assert_eq!(lines[1], "0,-4.000000,-5.000000");
        assert_eq!(lines[2], "60,-3.500000,-5.000000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_metadata_header() {
        let file = NamedTempFile::new().unwrap();
        let mut metadata = CsvMetadata {
            run_name: Some("hillslope".into()),
            stepsize: Some(60),
            locations: vec![4, 7],
            ..Default::default()
        };
        metadata.add_custom("Injection", "none");
        let config = CsvConfig::default().with_metadata(metadata);

        export_breakthrough_csv(&[0], &columns(), &[vec![-4.0, -5.0]], file.path(), Some(&config)).unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("# Reactive Transport Breakthrough Data"));
        assert!(content.contains("# Generated: "));
        assert!(content.contains("# Run: hillslope"));
        assert!(content.contains("# Coupling Step: 60 s"));
        assert!(content.contains("# Locations: 4 7"));
        assert!(content.contains("# Injection: none"));
        assert!(content.contains("#\nTime (s),"));
    }

    #[test]
    fn test_european_format() {
        let file = NamedTempFile::new().unwrap();
        let config = CsvConfig::european().precision(2);
        export_breakthrough_csv(&[30], &columns(), &[vec![-4.25, -1.5]], file.path(), Some(&config)).unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().nth(1).unwrap(), "30;-4,25;-1,50");
    }

    #[test]
    fn test_negative_infinity_is_written() {
        let file = NamedTempFile::new().unwrap();
        export_breakthrough_csv(&[0], &columns(), &[vec![f64::NEG_INFINITY, -1.0]], file.path(), None).unwrap();
        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("-inf"));
    }

    #[test]
    fn test_rejects_nan() {
        let file = NamedTempFile::new().unwrap();
        let err = export_breakthrough_csv(&[0], &columns(), &[vec![f64::NAN, -1.0]], file.path(), None).unwrap_err();
        assert!(matches!(err, CouplingError::Export(msg) if msg.contains("Cl@4")));
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let file = NamedTempFile::new().unwrap();
        let result = export_breakthrough_csv(&[0], &columns(), &[vec![1.0]], file.path(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty() {
        let file = NamedTempFile::new().unwrap();
        assert!(export_breakthrough_csv(&[], &columns(), &[], file.path(), None).is_err());
    }

    #[test]
    fn test_bad_path_is_io_error() {
        let err = export_breakthrough_csv(&[0], &columns(), &[vec![1.0, 2.0]], "/nonexistent/dir/btc.csv", None)
            .unwrap_err();
        assert!(matches!(err, CouplingError::Io(_)));
    }
}

//! Error types for engine setup and configuration
//!
//! Only recoverable failures live here: bad configuration, inconsistent
//! species tables, broken topology, malformed forcing data and export I/O.
//!
//! Numerical degeneracy is never an error (it is clamped in place), and a
//! flow/transport geometry desynchronization is a contract violation that
//! panics instead of returning a value.

use thiserror::Error;

/// Errors raised while building or configuring the coupling engine.
#[derive(Debug, Error)]
pub enum CouplingError {
    /// A configuration value is outside its admissible range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A species definition or the stoichiometry matrix is inconsistent.
    #[error("Species table error: {0}")]
    SpeciesTable(String),

    /// A species name referenced by configuration or forcing does not exist.
    #[error("Unknown species '{0}'")]
    UnknownSpecies(String),

    /// Element/river cross-references are out of range or contradictory.
    #[error("Topology error: {0}")]
    Topology(String),

    /// Two collections that must have the same length do not.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Precipitation forcing series is malformed.
    #[error("Forcing error: {0}")]
    Forcing(String),

    /// Result export rejected its input.
    #[error("Export error: {0}")]
    Export(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CouplingError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { what, expected, actual }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CouplingError>;

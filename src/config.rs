//! Run configuration
//!
//! Every option that used to be a build-time variant (land-surface-model ET,
//! deep-bedrock zones, record/replay) is a runtime field here, evaluated once
//! when the engine is built.
//!
//! # Example
//!
//! ```rust
//! use rtcouple_rs::config::{CouplingConfig, PrecipitationMode};
//!
//! let config = CouplingConfig::from_json_str(r#"{
//!     "reaction_delay": 86400,
//!     "averaging_scale": 2,
//!     "precipitation": { "mode": "constant" },
//!     "rain_chemistry": { "Cl": 1e-5 }
//! }"#).unwrap();
//!
//! assert_eq!(config.precipitation, PrecipitationMode::Constant);
//! assert_eq!(config.speciation_interval, 3600);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CouplingError, Result};
use crate::models::{ConcentrationSeries, EtPolicy};

/// Seconds in one simulated day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// How rainwater chemistry reaches the precipitation reservoir
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PrecipitationMode {
    /// No precipitation input: the precipitation reservoir holds zero
    #[default]
    Disabled,
    /// Constant `rain_chemistry`
    Constant,
    /// `rain_chemistry` overwritten from a step-wise series
    TimeSeries { series: ConcentrationSeries },
}

impl PrecipitationMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Multiplier applied to one species in the precipitation reservoir
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub species: String,
    pub factor: f64,
}

/// Point-source injection blended into breakthrough values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    /// First monitored volume index affected
    pub location: usize,
    pub species: String,
    /// Injected concentration **\[mol/L\]**
    pub concentration: f64,
    /// Injected flow rate, same unit as the daily discharge
    pub flow_rate: f64,
}

/// Coupling-engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingConfig {
    /// Elapsed time before transport and reaction start **\[s\]**
    #[serde(default)]
    pub reaction_delay: i64,

    /// Batch reaction runs every `averaging_scale` coupling intervals
    #[serde(default = "default_averaging_scale")]
    pub averaging_scale: i64,

    /// Scales sorbed mass removed before and restored after transport
    #[serde(default = "default_one")]
    pub sorption_time_factor: f64,

    /// Precipitation concentration factor
    #[serde(default = "default_one")]
    pub condensation: f64,

    #[serde(default)]
    pub precipitation: PrecipitationMode,

    /// Rainwater concentration per primary species name; missing species are zero
    #[serde(default)]
    pub rain_chemistry: BTreeMap<String, f64>,

    #[serde(default)]
    pub calibration: Option<Calibration>,

    /// Record/replay mode: no batch reaction, hourly speciation of every cell
    #[serde(default)]
    pub replay: bool,

    /// Deep-bedrock groundwater and unsaturated zones
    #[serde(default)]
    pub deep_zones: bool,

    #[serde(default)]
    pub et_policy: EtPolicy,

    /// Monitored volume indices
    #[serde(default)]
    pub breakthrough: Vec<usize>,

    /// Breakthrough samples kept in memory; `None` keeps the whole run
    #[serde(default)]
    pub breakthrough_history: Option<usize>,

    #[serde(default)]
    pub injection: Option<Injection>,

    /// Speciation cadence **\[s\]**
    #[serde(default = "default_speciation_interval")]
    pub speciation_interval: i64,

    /// Consecutive reaction failures before a cell is isolated
    #[serde(default = "default_isolation_threshold")]
    pub isolation_threshold: u32,

    /// Concentration written into isolated cells
    #[serde(default = "default_concentration_floor")]
    pub concentration_floor: f64,

    /// Admissible |height_t - height_int| **\[m\]**
    #[serde(default = "default_height_tolerance")]
    pub height_tolerance: f64,
}

fn default_averaging_scale() -> i64 {
    1
}

fn default_one() -> f64 {
    1.0
}

fn default_speciation_interval() -> i64 {
    3600
}

fn default_isolation_threshold() -> u32 {
    20
}

fn default_concentration_floor() -> f64 {
    1.0e-10
}

fn default_height_tolerance() -> f64 {
    1.0e-6
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            reaction_delay: 0,
            averaging_scale: default_averaging_scale(),
            sorption_time_factor: default_one(),
            condensation: default_one(),
            precipitation: PrecipitationMode::default(),
            rain_chemistry: BTreeMap::new(),
            calibration: None,
            replay: false,
            deep_zones: false,
            et_policy: EtPolicy::default(),
            breakthrough: Vec::new(),
            breakthrough_history: None,
            injection: None,
            speciation_interval: default_speciation_interval(),
            isolation_threshold: default_isolation_threshold(),
            concentration_floor: default_concentration_floor(),
            height_tolerance: default_height_tolerance(),
        }
    }
}

impl CouplingConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges
    ///
    /// Species names are resolved later, against the species table, when
    /// the engine is built.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(CouplingError::InvalidConfig(msg))
        }

        if self.reaction_delay < 0 {
            return invalid(format!("reaction_delay must be >= 0, got {}", self.reaction_delay));
        }
        if self.averaging_scale < 1 {
            return invalid(format!("averaging_scale must be >= 1, got {}", self.averaging_scale));
        }
        if !self.sorption_time_factor.is_finite() {
            return invalid("sorption_time_factor must be finite".into());
        }
        if !(self.condensation.is_finite() && self.condensation >= 0.0) {
            return invalid(format!("condensation must be finite and >= 0, got {}", self.condensation));
        }
        if let Some((name, c)) = self.rain_chemistry.iter().find(|(_, c)| !(c.is_finite() && **c >= 0.0)) {
            return invalid(format!("rain_chemistry '{name}' must be finite and >= 0, got {c}"));
        }
        if let Some(cal) = &self.calibration
            && !cal.factor.is_finite()
        {
            return invalid(format!("calibration factor for '{}' must be finite", cal.species));
        }
        if let EtPolicy::BareSoil { depression_storage } = self.et_policy
            && !(depression_storage >= 0.0)
        {
            return invalid(format!("depression_storage must be >= 0, got {depression_storage}"));
        }
        if let Some(inj) = &self.injection
            && !(inj.flow_rate >= 0.0 && inj.concentration >= 0.0)
        {
            return invalid("injection flow_rate and concentration must be >= 0".into());
        }
        if self.breakthrough_history == Some(0) {
            return invalid("breakthrough_history must be >= 1".into());
        }
        if self.speciation_interval <= 0 {
            return invalid(format!("speciation_interval must be > 0, got {}", self.speciation_interval));
        }
        if self.isolation_threshold == 0 {
            return invalid("isolation_threshold must be >= 1".into());
        }
        if !(self.concentration_floor > 0.0) {
            return invalid(format!("concentration_floor must be > 0, got {}", self.concentration_floor));
        }
        if !(self.height_tolerance > 0.0) {
            return invalid(format!("height_tolerance must be > 0, got {}", self.height_tolerance));
        }
        if let PrecipitationMode::TimeSeries { series } = &self.precipitation {
            series.validate()?;
        }
        Ok(())
    }
}

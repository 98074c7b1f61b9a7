//! Precipitation-concentration forcing
//!
//! A multi-column time series of rainwater concentrations. Each column is
//! bound to a primary species by name when the series is attached to a
//! species table; columns naming unknown species are kept but ignored.
//!
//! Lookup uses **no interpolation**: the value at `t` is the last record
//! whose time is `<= t`. Before the first record the first record applies.
//!
//! # Example
//!
//! ```rust
//! use rtcouple_rs::models::ConcentrationSeries;
//!
//! let series = ConcentrationSeries::new(
//!     vec!["Ca".into(), "Cl".into()],
//!     vec![(0, vec![1e-4, 2e-4]), (86_400, vec![3e-4, 2e-4])],
//! ).unwrap();
//!
//! assert_eq!(series.value_at(43_200), &[1e-4, 2e-4]);
//! assert_eq!(series.value_at(86_400), &[3e-4, 2e-4]);
//! ```

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::config::{CouplingConfig, PrecipitationMode};
use crate::error::{CouplingError, Result};
use crate::physics::SpeciesTable;

/// One forcing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcingRecord {
    /// Time **\[s\]**
    pub time: i64,
    /// One concentration per column
    pub values: Vec<f64>,
}

/// Lookup position held by the caller to speed up monotone queries
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesCursor {
    pub last_index: usize,
}

/// Step-wise concentration time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationSeries {
    columns: Vec<String>,
    records: Vec<ForcingRecord>,
}

impl ConcentrationSeries {
    /// Build from column names and `(time, values)` records
    ///
    /// # Errors
    ///
    /// - no columns or no records
    /// - a record width differs from the column count
    /// - times not strictly increasing
    pub fn new(columns: Vec<String>, records: Vec<(i64, Vec<f64>)>) -> Result<Self> {
        let records = records.into_iter().map(|(time, values)| ForcingRecord { time, values }).collect();
        let series = Self { columns, records };
        series.validate()?;
        Ok(series)
    }

    /// Parse a JSON series (`{"columns": [...], "records": [{"time":.., "values":[..]}]}`)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let series: Self = serde_json::from_str(json)?;
        series.validate()?;
        Ok(series)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(CouplingError::Forcing("series has no columns".into()));
        }
        if self.records.is_empty() {
            return Err(CouplingError::Forcing("series has no records".into()));
        }
        for (i, rec) in self.records.iter().enumerate() {
            if rec.values.len() != self.columns.len() {
                return Err(CouplingError::dimension_mismatch(
                    "forcing record width",
                    self.columns.len(),
                    rec.values.len(),
                ));
            }
            if i > 0 && rec.time <= self.records[i - 1].time {
                return Err(CouplingError::Forcing(format!(
                    "times must be strictly increasing: record {i} at {} follows {}",
                    rec.time,
                    self.records[i - 1].time
                )));
            }
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Map each column to a primary species index; unknown names map to `None`
    pub fn species_index(&self, table: &SpeciesTable) -> Vec<Option<usize>> {
        self.columns
            .iter()
            .map(|name| {
                let index = table.index_of(name);
                if index.is_none() {
                    log::warn!("precipitation forcing column '{name}' is not a primary species; ignored");
                }
                index
            })
            .collect()
    }

    fn position(&self, t: i64) -> usize {
        // first record strictly after t, minus one; clamp before the start
        self.records.partition_point(|r| r.time <= t).saturating_sub(1)
    }

    /// Values in effect at `t`
    pub fn value_at(&self, t: i64) -> &[f64] {
        &self.records[self.position(t)].values
    }

    /// Values in effect at `t`, scanning forward from the cursor
    pub fn value_at_with_cursor(&self, t: i64, cursor: &mut SeriesCursor) -> &[f64] {
        let mut i = cursor.last_index.min(self.records.len() - 1);
        if self.records[i].time > t {
            i = self.position(t);
        } else {
            while i + 1 < self.records.len() && self.records[i + 1].time <= t {
                i += 1;
            }
        }
        cursor.last_index = i;
        &self.records[i].values
    }
}

// =================================================================================================
// Precipitation state
// =================================================================================================

#[derive(Debug, Clone)]
struct AttachedSeries {
    series: ConcentrationSeries,
    index: Vec<Option<usize>>,
    cursor: SeriesCursor,
}

/// Rainwater chemistry feeding the two virtual reservoirs
///
/// Holds the current rain concentration per primary species. With a
/// time-series mode, [`update`](Self::update) overwrites the species whose
/// value changed.
#[derive(Debug, Clone)]
pub struct PrecipitationForcing {
    enabled: bool,
    concentrations: DVector<f64>,
    series: Option<AttachedSeries>,
    condensation: f64,
    calibration: Option<(usize, f64)>,
}

impl PrecipitationForcing {
    /// Resolve rain chemistry and calibration names against the species table
    ///
    /// # Errors
    ///
    /// [`CouplingError::UnknownSpecies`] for a rain-chemistry or calibration
    /// name that is not a primary species.
    pub fn from_config(config: &CouplingConfig, species: &SpeciesTable) -> Result<Self> {
        let mut concentrations = DVector::zeros(species.n_total());
        for (name, &value) in &config.rain_chemistry {
            concentrations[species.require(name)?] = value;
        }

        let calibration = match &config.calibration {
            Some(cal) => Some((species.require(&cal.species)?, cal.factor)),
            None => None,
        };

        let series = match &config.precipitation {
            PrecipitationMode::TimeSeries { series } => Some(AttachedSeries {
                index: series.species_index(species),
                series: series.clone(),
                cursor: SeriesCursor::default(),
            }),
            _ => None,
        };

        Ok(Self {
            enabled: config.precipitation.is_enabled(),
            concentrations,
            series,
            condensation: config.condensation,
            calibration,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current rain concentration per primary species
    pub fn concentrations(&self) -> &DVector<f64> {
        &self.concentrations
    }

    /// Pull the series value at `t`; returns every `(species, value)` that changed
    pub fn update(&mut self, t: i64, species: &SpeciesTable) -> Vec<(usize, f64)> {
        let Some(attached) = self.series.as_mut() else {
            return Vec::new();
        };

        let values = attached.series.value_at_with_cursor(t, &mut attached.cursor);
        let mut changed = Vec::new();
        for (column, &value) in values.iter().enumerate() {
            let Some(j) = attached.index[column] else {
                continue;
            };
            if self.concentrations[j] != value {
                self.concentrations[j] = value;
                log::info!("{} in precipitation is changed to {:.4e}", species.species(j).name, value);
                changed.push((j, value));
            }
        }
        changed
    }

    /// Precipitation-reservoir concentration of species `j` (enabled mode)
    pub fn precipitation_value(&self, j: usize) -> f64 {
        let base = self.concentrations[j] * self.condensation;
        match self.calibration {
            Some((k, factor)) if k == j => base * factor,
            _ => base,
        }
    }

    /// Boundary-reservoir concentration of species `j`
    pub fn boundary_value(&self, j: usize) -> f64 {
        self.concentrations[j] * self.condensation
    }
}

//! Breakthrough curves
//!
//! A breakthrough value is the `log10` concentration reported at a
//! monitored volume for every primary species, once per coupling step.
//! Downstream of a point-source injection the injected species is blended
//! with the carrier discharge:
//!
//! ```text
//! btc = log10((c · Q + c_inj · Q_inj) / (Q + Q_inj))
//! ```
//!
//! where `c = 10^log_reference` is the cell's own concentration and `Q` the
//! daily-average outlet discharge.
//!
//! The recorder keeps a history of samples for export. Long runs either cap
//! it with [`BreakthroughRecorder::with_history_limit`] or drain it
//! periodically with [`BreakthroughRecorder::take_samples`]; the latest
//! sample survives both.

use std::collections::VecDeque;

use crate::config::Injection;
use crate::error::{CouplingError, Result};
use crate::physics::{ControlVolume, SpeciesTable};

/// Injection with its species resolved to an index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedInjection {
    pub location: usize,
    pub species: usize,
    pub concentration: f64,
    pub flow_rate: f64,
}

impl ResolvedInjection {
    pub fn resolve(injection: &Injection, species: &SpeciesTable) -> Result<Self> {
        Ok(Self {
            location: injection.location,
            species: species.require(&injection.species)?,
            concentration: injection.concentration,
            flow_rate: injection.flow_rate,
        })
    }

    /// Whether the blend applies to `species` at monitored volume `location`
    pub fn applies(&self, location: usize, species: usize) -> bool {
        location >= self.location && species == self.species
    }

    /// Blended log10 concentration; `None` when there is no flow to mix into
    pub fn blend(&self, log_concentration: f64, discharge: f64) -> Option<f64> {
        let total_flow = discharge + self.flow_rate;
        if !(total_flow > 0.0) {
            return None;
        }
        let c = 10f64.powf(log_concentration);
        Some(((c * discharge + self.concentration * self.flow_rate) / total_flow).log10())
    }
}

/// Breakthrough values of one coupling step
#[derive(Debug, Clone, PartialEq)]
pub struct BreakthroughSample {
    pub time: i64,
    /// `[location][species]`, flattened location-major
    pub values: Vec<f64>,
}

/// Records breakthrough values at monitored volumes
#[derive(Debug, Clone)]
pub struct BreakthroughRecorder {
    locations: Vec<usize>,
    n_species: usize,
    injection: Option<ResolvedInjection>,
    samples: VecDeque<BreakthroughSample>,
    latest: Option<BreakthroughSample>,
    history_limit: Option<usize>,
}

impl BreakthroughRecorder {
    /// # Errors
    ///
    /// - [`CouplingError::InvalidConfig`] for a location outside the volume store
    /// - [`CouplingError::UnknownSpecies`] for an injected species name
    pub fn new(
        locations: Vec<usize>,
        injection: Option<&Injection>,
        species: &SpeciesTable,
        n_volumes: usize,
    ) -> Result<Self> {
        if let Some(&bad) = locations.iter().find(|&&loc| loc >= n_volumes) {
            return Err(CouplingError::InvalidConfig(format!(
                "breakthrough location {bad} out of range ({n_volumes} volumes)"
            )));
        }
        let injection = injection.map(|inj| ResolvedInjection::resolve(inj, species)).transpose()?;
        Ok(Self {
            locations,
            n_species: species.n_total(),
            injection,
            samples: VecDeque::new(),
            latest: None,
            history_limit: None,
        })
    }

    /// Keep at most `limit` samples, dropping the oldest; `None` keeps all
    ///
    /// # Errors
    ///
    /// [`CouplingError::InvalidConfig`] for a limit of zero
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Result<Self> {
        if limit == Some(0) {
            return Err(CouplingError::InvalidConfig("breakthrough history limit must be >= 1".into()));
        }
        self.history_limit = limit;
        if let Some(limit) = limit {
            let excess = self.samples.len().saturating_sub(limit);
            self.samples.drain(..excess);
        }
        Ok(self)
    }

    pub fn locations(&self) -> &[usize] {
        &self.locations
    }

    pub fn injection(&self) -> Option<&ResolvedInjection> {
        self.injection.as_ref()
    }

    /// Retained samples, oldest first
    pub fn samples(&self) -> &VecDeque<BreakthroughSample> {
        &self.samples
    }

    pub fn latest(&self) -> Option<&BreakthroughSample> {
        self.latest.as_ref()
    }

    /// Remove and return the retained samples, oldest first
    pub fn take_samples(&mut self) -> Vec<BreakthroughSample> {
        self.samples.drain(..).collect()
    }

    /// Value at monitored location `k` for species `j` in `sample`
    pub fn value(&self, sample: &BreakthroughSample, k: usize, j: usize) -> f64 {
        sample.values[k * self.n_species + j]
    }

    /// Compute and store this step's values
    ///
    /// Without a blend (or when the carrier and injected flows are both
    /// zero) the value is the cell's `log_reference`.
    pub fn record(&mut self, time: i64, volumes: &[ControlVolume], discharge: f64) {
        if self.locations.is_empty() {
            return;
        }
        let mut values = Vec::with_capacity(self.locations.len() * self.n_species);
        for &loc in &self.locations {
            let cv = &volumes[loc];
            for j in 0..self.n_species {
                let own = cv.log_reference[j];
                let value = match &self.injection {
                    Some(inj) if inj.applies(loc, j) => inj.blend(own, discharge).unwrap_or(own),
                    _ => own,
                };
                values.push(value);
            }
        }
        let sample = BreakthroughSample { time, values };
        if let Some(limit) = self.history_limit
            && self.samples.len() >= limit
        {
            self.samples.pop_front();
        }
        self.samples.push_back(sample.clone());
        self.latest = Some(sample);
    }

    /// Column labels `<species>@<location>`, matching the flattened order
    pub fn column_labels(&self, species: &SpeciesTable) -> Vec<String> {
        self.locations
            .iter()
            .flat_map(|loc| species.primary().iter().map(move |sp| format!("{}@{}", sp.name, loc)))
            .collect()
    }
}

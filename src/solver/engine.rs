//! Coupling engine
//!
//! [`CouplingEngine`] is the owned context of a run: configuration, species
//! table, volume store, flux network, collaborators, forcing and
//! breakthrough state. The outer simulation loop calls [`step`] once per
//! hydrologic time step with the flow solver's latest snapshot.
//!
//! ```rust,ignore
//! let mut engine = CouplingEngine::new(config, species, &hydrology, Collaborators::default())?;
//! engine.set_initial_concentrations(Zone::Groundwater, &[1e-4, 2e-3])?;
//!
//! for k in 0..n_steps {
//!     flow_solver.advance(&mut hydrology);
//!     engine.partition_et(&mut hydrology);
//!     engine.step(start + k * 60, 60, &hydrology)?;
//! }
//! ```
//!
//! [`step`]: CouplingEngine::step

use std::time::{Duration, Instant};

use crate::config::CouplingConfig;
use crate::error::{CouplingError, Result};
use crate::models::{Collaborators, EtPartitioner, PrecipitationForcing, TranspirationWeighting};
use crate::output::{BreakthroughRecorder, BreakthroughSample};
use crate::physics::{ControlVolume, FluxFace, Hydrology, Layout, SpeciesTable, VolumeId, Zone};

use super::controller::{self, ControllerReport};
use super::flux_mapping::{DischargeAccumulator, FluxMapping, MappingReport};
use super::network::CouplingState;

/// Wall-clock time spent in the engine, accumulated over every step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepTimings {
    pub mapping: Duration,
    pub transport: Duration,
    pub reaction: Duration,
    pub steps: usize,
}

impl StepTimings {
    fn add(&mut self, mapping: Duration, controller: &ControllerReport) {
        self.mapping += mapping;
        self.transport += controller.transport_time;
        self.reaction += controller.reaction_time;
        self.steps += 1;
    }
}

/// Outcome of one coupling step
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub time: i64,
    /// `time - start_time`
    pub elapsed: i64,
    pub mapping: MappingReport,
    pub controller: ControllerReport,
    /// Daily-average outlet discharge of the last completed day
    pub daily_discharge: f64,
}

/// Owned coupling context
pub struct CouplingEngine {
    config: CouplingConfig,
    species: SpeciesTable,
    state: CouplingState,
    collaborators: Collaborators,
    mapping: FluxMapping,
    et: EtPartitioner,
    breakthrough: BreakthroughRecorder,
    timings: StepTimings,
}

impl std::fmt::Debug for CouplingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouplingEngine")
            .field("layout", &self.state.layout)
            .field("species", &self.species.n_total())
            .field("timings", &self.timings)
            .finish()
    }
}

impl CouplingEngine {
    /// Validate the configuration, build the network and resolve every
    /// species name the configuration refers to
    ///
    /// # Errors
    ///
    /// Invalid configuration, topology errors in `hydrology`, unknown rain,
    /// calibration or injected species, or a monitored location outside
    /// the volume store.
    pub fn new(
        config: CouplingConfig,
        species: SpeciesTable,
        hydrology: &Hydrology,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let state = CouplingState::build(hydrology, &species, config.deep_zones, collaborators.unsat.as_ref())?;
        let forcing = PrecipitationForcing::from_config(&config, &species)?;
        let breakthrough = BreakthroughRecorder::new(
            config.breakthrough.clone(),
            config.injection.as_ref(),
            &species,
            state.layout.n_volumes(),
        )?
        .with_history_limit(config.breakthrough_history)?;
        let et = EtPartitioner::new(config.et_policy);

        log::info!(
            "coupling engine: {} elements, {} river segments, {} species ({} mobile), deep zones {}, replay {}",
            state.layout.n_elem(),
            state.layout.n_river(),
            species.n_total(),
            species.n_mobile(),
            config.deep_zones,
            config.replay
        );

        Ok(Self {
            config,
            species,
            state,
            collaborators,
            mapping: FluxMapping::new(forcing),
            et,
            breakthrough,
            timings: StepTimings::default(),
        })
    }

    /// Replace the transpiration weighting of land-surface-model ET
    pub fn with_transpiration_weighting(mut self, weighting: Box<dyn TranspirationWeighting>) -> Self {
        self.et = EtPartitioner::with_weighting(self.config.et_policy, weighting);
        self
    }

    /// Set total and reference concentrations of every volume in `zone`
    pub fn set_initial_concentrations(&mut self, zone: Zone, concentrations: &[f64]) -> Result<()> {
        self.state.set_zone_concentrations(zone, concentrations)
    }

    /// Set secondary-species concentrations of every volume in `zone`
    pub fn set_initial_secondary(&mut self, zone: Zone, secondary: &[f64]) -> Result<()> {
        self.state.set_zone_secondary(zone, secondary)
    }

    /// Write ET sources into every element of `hydrology`
    ///
    /// Runs before the flow solver's water balance, outside [`step`](Self::step).
    pub fn partition_et(&self, hydrology: &mut Hydrology) {
        self.et.apply(hydrology);
    }

    /// Advance one coupling interval ending at `t`
    ///
    /// Runs the flux mapping, then the transport-reaction controller, then
    /// records breakthrough values.
    ///
    /// # Errors
    ///
    /// - [`CouplingError::InvalidConfig`] for a non-positive `stepsize`
    /// - [`CouplingError::DimensionMismatch`] when `hydrology` does not
    ///   match the network the engine was built for
    ///
    /// # Panics
    ///
    /// Panics when the flow and transport geometries desynchronize.
    pub fn step(&mut self, t: i64, stepsize: i64, hydrology: &Hydrology) -> Result<StepReport> {
        if stepsize <= 0 {
            return Err(CouplingError::InvalidConfig(format!("stepsize must be > 0, got {stepsize}")));
        }
        let layout = &self.state.layout;
        if hydrology.elements.len() != layout.n_elem() {
            return Err(CouplingError::dimension_mismatch("elements", layout.n_elem(), hydrology.elements.len()));
        }
        if hydrology.rivers.len() != layout.n_river() {
            return Err(CouplingError::dimension_mismatch("river segments", layout.n_river(), hydrology.rivers.len()));
        }

        let elapsed = t - hydrology.start_time;
        let geometry = self.collaborators.geometry.as_ref();
        let unsat = self.collaborators.unsat.as_ref();

        let start = Instant::now();
        let mapping = self.mapping.run(&mut self.state, hydrology, &self.species, geometry, unsat, t, stepsize);
        let mapping_time = start.elapsed();

        let controller = controller::run(
            &mut self.state,
            hydrology,
            &self.species,
            &self.config,
            &self.collaborators,
            elapsed,
            stepsize,
        );

        let daily_discharge = self.mapping.discharge().daily_average();
        self.breakthrough.record(t, &self.state.volumes, daily_discharge);
        self.timings.add(mapping_time, &controller);

        Ok(StepReport { time: t, elapsed, mapping, controller, daily_discharge })
    }

    // ======================================== access ========================================

    pub fn config(&self) -> &CouplingConfig {
        &self.config
    }

    pub fn species(&self) -> &SpeciesTable {
        &self.species
    }

    pub fn layout(&self) -> &Layout {
        &self.state.layout
    }

    pub fn state(&self) -> &CouplingState {
        &self.state
    }

    /// Mutable state, for collaborators driven outside the engine
    pub fn state_mut(&mut self) -> &mut CouplingState {
        &mut self.state
    }

    pub fn volume(&self, id: VolumeId) -> &ControlVolume {
        self.state.volume(id)
    }

    pub fn faces(&self) -> &[FluxFace] {
        &self.state.faces
    }

    pub fn forcing(&self) -> &PrecipitationForcing {
        self.mapping.forcing()
    }

    pub fn discharge(&self) -> &DischargeAccumulator {
        self.mapping.discharge()
    }

    pub fn breakthrough(&self) -> &BreakthroughRecorder {
        &self.breakthrough
    }

    /// Drain the recorded breakthrough samples, e.g. after a periodic export
    pub fn take_breakthrough_samples(&mut self) -> Vec<BreakthroughSample> {
        self.breakthrough.take_samples()
    }

    pub fn timings(&self) -> &StepTimings {
        &self.timings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Element, Neighbor, RiverSegment, Species, WaterStorage};

    fn species() -> SpeciesTable {
        SpeciesTable::primary_only(vec![Species::aqueous("Cl", 1e-9, 0.1)]).unwrap()
    }

    fn hydrology() -> Hydrology {
        let elem = Element {
            area: 100.0,
            edges: [10.0; 3],
            neighbors: [Neighbor::River(0), Neighbor::None, Neighbor::None],
            storage: WaterStorage { gw: 1.0, unsat: 0.2, ..Default::default() },
            ..Default::default()
        };
        Hydrology::new(vec![elem], vec![RiverSegment::default()], 0)
    }

    fn engine(config: CouplingConfig) -> CouplingEngine {
        CouplingEngine::new(config, species(), &hydrology(), Collaborators::default()).unwrap()
    }

    #[test]
    fn test_step_reports_and_timings() {
        let mut e = engine(CouplingConfig { breakthrough: vec![2], ..Default::default() });
        e.set_initial_concentrations(Zone::River, &[1e-3]).unwrap();
        let hydro = hydrology();

        let report = e.step(0, 60, &hydro).unwrap();
        assert_eq!(report.elapsed, 0);
        assert!(report.controller.transported);
        assert!(report.controller.speciated);
        e.step(60, 60, &hydro).unwrap();

        assert_eq!(e.timings().steps, 2);
        assert_eq!(e.breakthrough().samples().len(), 2);
    }

    #[test]
    fn test_breakthrough_history_bounded_and_drained() {
        let config = CouplingConfig { breakthrough: vec![2], breakthrough_history: Some(3), ..Default::default() };
        let mut e = engine(config);
        let hydro = hydrology();
        for k in 0..5 {
            e.step(60 * k, 60, &hydro).unwrap();
        }
        assert_eq!(e.breakthrough().samples().len(), 3);

        let drained = e.take_breakthrough_samples();
        assert_eq!(drained.iter().map(|s| s.time).collect::<Vec<_>>(), vec![120, 180, 240]);
        assert!(e.breakthrough().samples().is_empty());
        assert_eq!(e.breakthrough().latest().map(|s| s.time), Some(240));
    }

    #[test]
    fn test_rejects_mismatched_snapshot() {
        let mut e = engine(CouplingConfig::default());
        let mut hydro = hydrology();
        hydro.elements.push(hydro.elements[0].clone());
        assert!(matches!(
            e.step(0, 60, &hydro),
            Err(CouplingError::DimensionMismatch { what: "elements", expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_rejects_zero_stepsize() {
        let mut e = engine(CouplingConfig::default());
        assert!(e.step(0, 0, &hydrology()).is_err());
    }

    #[test]
    fn test_unknown_injected_species_fails_setup() {
        let config = CouplingConfig {
            breakthrough: vec![2],
            injection: Some(crate::config::Injection {
                location: 2,
                species: "Zn".into(),
                concentration: 1.0,
                flow_rate: 1.0,
            }),
            ..Default::default()
        };
        let err = CouplingEngine::new(config, species(), &hydrology(), Collaborators::default()).unwrap_err();
        assert!(matches!(err, CouplingError::UnknownSpecies(_)));
    }

    #[test]
    fn test_invalid_config_fails_setup() {
        let config = CouplingConfig { averaging_scale: 0, ..Default::default() };
        assert!(CouplingEngine::new(config, species(), &hydrology(), Collaborators::default()).is_err());
    }
}

//! Adaptive transport-reaction controller
//!
//! Operator splitting for one coupling interval. Steps 1-6 only run once
//! the reaction delay has elapsed; the face reset, speciation and log
//! caches run every step.
//!
//! 1. [`apply_sorption`] with a negative sign: remove sorbed mass from the
//!    mobile totals of groundwater and unsaturated cells
//! 2. transport over the whole interval (sub-stepped by the collaborator)
//! 3. [`apply_sorption`] with a positive sign: restore the same mass
//! 4. [`react_cells`] over one interval, every `averaging_scale` intervals,
//!    outside replay mode
//! 5. [`reconcile_minerals`]: thickness-weighted mineral average
//! 6. [`check_and_isolate`]: fatal geometry check, then isolation of ill cells
//! 7. [`reset_faces`]
//! 8. [`speciate`] every `speciation_interval` seconds
//! 9. [`refresh_log_caches`]
//!
//! Breakthrough values (the rest of step 9) are recorded by the engine,
//! which owns the monitored locations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::config::CouplingConfig;
use crate::models::{Collaborators, ReactionOutcome, ReactionSolver, SpeciationSolver};
use crate::physics::{ControlVolume, Hydrology, SpeciesTable};

use super::network::CouplingState;
use super::{par_for_each_mut, par_zip_mut};

/// Relative size of the initial guess written into river reference
/// concentrations before speciation
pub const SPECIATION_GUESS_FRACTION: f64 = 0.1;

/// What the controller did in one coupling step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerReport {
    /// The reaction delay had elapsed: transport ran
    pub transported: bool,
    /// Batch reaction ran
    pub reacted: bool,
    /// Speciation ran
    pub speciated: bool,
    /// Volume indices isolated this step
    pub isolated: Vec<usize>,
    /// Number of failed reaction calls
    pub failed_reactions: usize,
    pub transport_time: Duration,
    pub reaction_time: Duration,
}

/// Run the controller for one coupling step
///
/// `elapsed` is `t - start_time` and `stepsize` the coupling interval, both
/// in seconds.
///
/// # Panics
///
/// Panics when a physical volume's end-of-step height differs from the
/// flow solver's interpolated height by `height_tolerance` or more.
pub fn run(
    state: &mut CouplingState,
    hydrology: &Hydrology,
    species: &SpeciesTable,
    config: &CouplingConfig,
    collaborators: &Collaborators,
    elapsed: i64,
    stepsize: i64,
) -> ControllerReport {
    let mut report = ControllerReport::default();

    if elapsed >= config.reaction_delay {
        report.transported = true;

        // Steps 1-3: transport the mobile part only
        let factor = config.sorption_time_factor;
        let sorption = species.has_sorption();
        if sorption {
            apply_sorption(state, species, -factor);
        }
        let start = Instant::now();
        collaborators.transport.advance(stepsize as f64, &state.faces, &mut state.volumes, species);
        report.transport_time = start.elapsed();
        if sorption {
            apply_sorption(state, species, factor);
        }

        // Step 4: batch reaction on the coarser cadence, over one coupling interval
        let cadence = config.averaging_scale * stepsize;
        if !config.replay && cadence > 0 && elapsed % cadence == 0 {
            log::debug!("reaction at elapsed {elapsed} s over {stepsize} s");
            let start = Instant::now();
            report.failed_reactions =
                react_cells(state, species, collaborators.reaction.as_ref(), stepsize as f64);
            report.reaction_time = start.elapsed();
            report.reacted = true;
        }

        // Step 5: minerals do not partition between zones
        reconcile_minerals(state, hydrology, species);

        // Step 6
        report.isolated = check_and_isolate(state, config);
    }

    // Step 7
    reset_faces(state);

    // Step 8
    if elapsed % config.speciation_interval == 0 {
        speciate(state, species, collaborators.speciation.as_ref(), config.replay);
        report.speciated = true;
    }

    // Step 9
    refresh_log_caches(state);

    report
}

// =================================================================================================
// Steps 1 and 3: sorption correction
// =================================================================================================

/// Add `sign_factor · Σ coeff · secondary[k]` to every mobile total with
/// sorbed contributions, in groundwater and unsaturated cells
///
/// Called with `-factor` before transport and `+factor` after it; the
/// secondaries are not touched in between, so the two calls cancel.
pub fn apply_sorption(state: &mut CouplingState, species: &SpeciesTable, sign_factor: f64) {
    let blocks = state.volume_blocks_mut();
    let correct = |_: usize, cv: &mut ControlVolume| {
        for j in 0..species.n_mobile() {
            for &(k, coeff) in species.sorption_terms(j) {
                cv.total[j] += sign_factor * coeff * cv.secondary[k];
            }
        }
    };
    par_for_each_mut(blocks.groundwater, correct);
    par_for_each_mut(blocks.unsaturated, correct);
}

// =================================================================================================
// Step 4: batch reaction
// =================================================================================================

/// React every groundwater and unsaturated cell; returns the failure count
///
/// A failure raises the cell's illness counter, a converged call resets it.
pub fn react_cells(
    state: &mut CouplingState,
    species: &SpeciesTable,
    reaction: &dyn ReactionSolver,
    interval: f64,
) -> usize {
    let failures = AtomicUsize::new(0);
    let blocks = state.volume_blocks_mut();
    let react = |_: usize, cv: &mut ControlVolume| match reaction.react(interval, species, cv) {
        ReactionOutcome::Converged => cv.illness = 0,
        ReactionOutcome::Failed => {
            cv.illness += 1;
            failures.fetch_add(1, Ordering::Relaxed);
            log::warn!("reaction failed in cell {} (illness {})", cv.index, cv.illness);
        }
    };
    par_for_each_mut(blocks.groundwater, react);
    par_for_each_mut(blocks.unsaturated, react);
    failures.into_inner()
}

// =================================================================================================
// Step 5: mineral reconciliation
// =================================================================================================

/// Replace mineral totals of each element's two cells by their
/// thickness-weighted mean
///
/// `c = (c_gw · h + c_unsat · (depth - h)) / depth` with `h` the
/// groundwater cell's end-of-step height. Both cells receive the same
/// value in total and reference.
pub fn reconcile_minerals(state: &mut CouplingState, hydrology: &Hydrology, species: &SpeciesTable) {
    let minerals: Vec<usize> = species.mineral_indices().collect();
    if minerals.is_empty() {
        return;
    }
    let elements = &hydrology.elements;
    let blocks = state.volume_blocks_mut();
    par_zip_mut(blocks.groundwater, blocks.unsaturated, |e, gw, unsat| {
        let depth = elements[e].soil.depth;
        let h = gw.geometry.height_t;
        for &j in &minerals {
            let c = (gw.total[j] * h + unsat.total[j] * (depth - h)) / depth;
            gw.total[j] = c;
            gw.reference[j] = c;
            unsat.total[j] = c;
            unsat.reference[j] = c;
        }
    });
}

// =================================================================================================
// Step 6: consistency and isolation
// =================================================================================================

/// Assert geometry consistency, then isolate cells whose illness reached
/// the threshold; returns the isolated volume indices
///
/// # Panics
///
/// Panics on `|height_t - height_int| >= height_tolerance` in any physical
/// volume: the flow and transport layers have desynchronized.
pub fn check_and_isolate(state: &mut CouplingState, config: &CouplingConfig) -> Vec<usize> {
    let mut isolated = Vec::new();
    for cv in state.volumes.iter_mut().filter(|cv| !cv.is_virtual()) {
        let g = &cv.geometry;
        if (g.height_t - g.height_int).abs() >= config.height_tolerance {
            log::error!(
                "cell {}: end-of-step height {} differs from interpolated height {}",
                cv.index,
                g.height_t,
                g.height_int
            );
            panic!(
                "geometry desynchronized in cell {}: height_t = {}, height_int = {}",
                cv.index, g.height_t, g.height_int
            );
        }
        if cv.illness >= config.isolation_threshold {
            cv.isolate(config.concentration_floor);
            log::warn!("cell {} isolated", cv.index);
            isolated.push(cv.index);
        }
    }
    isolated
}

// =================================================================================================
// Steps 7-9
// =================================================================================================

/// Zero the per-step numeric fields of every face
pub fn reset_faces(state: &mut CouplingState) {
    par_for_each_mut(&mut state.faces, |_, face| face.reset());
}

/// Speciate river cells, or every physical volume in replay mode
///
/// Outside replay mode each river cell first gets a fresh initial guess:
/// `reference = total` for minerals and `|0.1 · total|` otherwise.
pub fn speciate(state: &mut CouplingState, species: &SpeciesTable, solver: &dyn SpeciationSolver, replay: bool) {
    if replay {
        let physical = state.layout.physical_volumes();
        par_for_each_mut(&mut state.volumes[physical], |_, cv| solver.speciate(species, cv));
        return;
    }

    let blocks = state.volume_blocks_mut();
    par_for_each_mut(blocks.river, |_, cv| {
        for j in 0..species.n_total() {
            cv.reference[j] = if species.species(j).is_mineral() {
                cv.total[j]
            } else {
                (SPECIATION_GUESS_FRACTION * cv.total[j]).abs()
            };
        }
        solver.speciate(species, cv);
    });
}

/// Refresh `log10` caches of every volume
pub fn refresh_log_caches(state: &mut CouplingState) {
    par_for_each_mut(&mut state.volumes, |_, cv| cv.refresh_log_caches());
}

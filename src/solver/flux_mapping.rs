//! Flux-mapping stage
//!
//! Refreshes every flux face and control volume from the latest flow-solver
//! snapshot, then rebuilds the stability-limited internal step sizes. The
//! sub-passes form a dependency chain and run in this order:
//!
//! | Step | Pass                          | Writes                                   | Reads                       |
//! |------|-------------------------------|------------------------------------------|-----------------------------|
//! | 1    | [`map_element_fluxes`]        | element-face `flux`, vadose `area`       | element flows, volume heights |
//! | 2    | [`map_river_fluxes`]          | river-face `flux`, `flux_trib`           | river flow vectors          |
//! | 3    | [`PrecipitationForcing::update`] | rain concentrations                   | forcing series              |
//! | 4    | [`refresh_geometry`]          | volume geometry                          | element/river storages      |
//! | 5    | [`update_face_geometry`]      | lateral/recharge `area`, `velocity`      | volume heights              |
//! | 6    | [`reconcile_aquifer_faces`]   | river aquifer `area`, `velocity`         | lateral groundwater faces   |
//! | 7    | [`refresh_reservoirs`]        | virtual reservoir concentrations         | rain concentrations         |
//! | 8    | [`compute_step_sizes`]        | volume `step_size`                       | dispersive faces            |
//!
//! Inside each step the loop runs through the parallel dispatch helpers;
//! the pass borrows only the block it writes.

use crate::config::SECONDS_PER_DAY;
use crate::models::{GeometryUpdate, PrecipitationForcing, UnsatEquivalence};
use crate::physics::{
    ControlVolume, FaceCondition, FaceKind, FluxFace, Hydrology, MIN_STORAGE_HEIGHT, NUM_EDGE, RiverSegment,
    SpeciesTable, river_flow,
};

use super::network::CouplingState;
use super::par_for_each_mut;
use super::stability::compute_step_sizes;

/// Divisor turning the accumulated daily outlet volume into the reported
/// daily discharge (one sample per simulated minute)
pub const DISCHARGE_SAMPLES_PER_DAY: f64 = 1440.0;

// =================================================================================================
// Outlet discharge
// =================================================================================================

/// Running daily total of outlet discharge
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DischargeAccumulator {
    accumulated: f64,
    daily_average: f64,
}

impl DischargeAccumulator {
    /// Add this step's outlet discharge; roll over at whole days
    ///
    /// Every outlet segment contributes `flow[DOWN_CHANNEL] · 86400`. When
    /// `elapsed` is a multiple of one day the total becomes the daily
    /// average (÷ [`DISCHARGE_SAMPLES_PER_DAY`]) and the accumulator resets.
    /// Returns whether a roll-over happened.
    pub fn record(&mut self, rivers: &[RiverSegment], elapsed: i64) -> bool {
        self.accumulated += rivers
            .iter()
            .filter(|seg| seg.is_outlet())
            .map(|seg| seg.flow[river_flow::DOWN_CHANNEL] * SECONDS_PER_DAY as f64)
            .sum::<f64>();

        if elapsed % SECONDS_PER_DAY != 0 {
            return false;
        }
        self.daily_average = self.accumulated / DISCHARGE_SAMPLES_PER_DAY;
        self.accumulated = 0.0;
        log::debug!("day {} outlet discharge {:.6e}", elapsed / SECONDS_PER_DAY, self.daily_average);
        true
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    /// Discharge of the last completed day
    pub fn daily_average(&self) -> f64 {
        self.daily_average
    }
}

// =================================================================================================
// Stage driver
// =================================================================================================

/// Outcome of one flux-mapping run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingReport {
    /// The discharge accumulator rolled over this step
    pub day_rolled_over: bool,
    /// `(species, value)` of every rain concentration that changed
    pub forcing_changes: Vec<(usize, f64)>,
}

/// Flux-mapping stage with the state it carries between steps
#[derive(Debug, Clone)]
pub struct FluxMapping {
    forcing: PrecipitationForcing,
    discharge: DischargeAccumulator,
}

impl FluxMapping {
    pub fn new(forcing: PrecipitationForcing) -> Self {
        Self { forcing, discharge: DischargeAccumulator::default() }
    }

    pub fn forcing(&self) -> &PrecipitationForcing {
        &self.forcing
    }

    pub fn discharge(&self) -> &DischargeAccumulator {
        &self.discharge
    }

    /// Run steps 1-8 at simulation time `t` for a coupling interval of `stepsize` seconds
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        state: &mut CouplingState,
        hydrology: &Hydrology,
        species: &SpeciesTable,
        geometry: &dyn GeometryUpdate,
        unsat: &dyn UnsatEquivalence,
        t: i64,
        stepsize: i64,
    ) -> MappingReport {
        let elapsed = t - hydrology.start_time;

        // Step 1: element faces
        map_element_fluxes(state, hydrology);

        // Step 2: outlet discharge and river faces
        let day_rolled_over = self.discharge.record(&hydrology.rivers, elapsed);
        map_river_fluxes(state, hydrology);

        // Step 3: rain chemistry
        let forcing_changes = self.forcing.update(t, species);

        // Step 4: volume geometry
        refresh_geometry(state, hydrology, geometry, unsat);

        // Step 5: lateral and recharge contact areas
        update_face_geometry(state);

        // Step 6: river side of the aquifer interface
        reconcile_aquifer_faces(state, hydrology);

        // Step 7: virtual reservoirs
        refresh_reservoirs(state, &self.forcing, species);

        // Step 8: stability-limited step sizes
        compute_step_sizes(state, species, stepsize as f64);

        MappingReport { day_rolled_over, forcing_changes }
    }
}

// =================================================================================================
// Step 1: element faces
// =================================================================================================

/// Copy element flows into lateral, recharge and infiltration faces
///
/// Vadose lateral faces carry no flux; only their dispersive contact area
/// `edge · (h_up + h_down) / 2` is set, from end-of-step heights of the
/// previous geometry refresh.
pub fn map_element_fluxes(state: &mut CouplingState, hydrology: &Hydrology) {
    let CouplingState { layout, volumes, faces } = state;
    let volumes = &*volumes;
    let elements = &hydrology.elements;

    par_for_each_mut(&mut faces[layout.faces(FaceKind::LateralGroundwater)], |i, face| {
        face.flux = elements[i / NUM_EDGE].flows.subsurface[i % NUM_EDGE];
    });
    vadose_contact_area(&mut faces[layout.faces(FaceKind::LateralUnsaturated)], volumes);

    par_for_each_mut(&mut faces[layout.faces(FaceKind::RechargeUnsaturated)], |e, face| {
        face.flux = elements[e].flows.recharge * elements[e].area;
    });
    par_for_each_mut(&mut faces[layout.faces(FaceKind::RechargeGroundwater)], |e, face| {
        face.flux = -elements[e].flows.recharge * elements[e].area;
    });
    par_for_each_mut(&mut faces[layout.faces(FaceKind::Infiltration)], |e, face| {
        face.flux = -elements[e].flows.infiltration.max(0.0) * elements[e].area;
    });

    // deep blocks are empty without deep zones
    par_for_each_mut(&mut faces[layout.faces(FaceKind::LateralDeepGroundwater)], |i, face| {
        face.flux = elements[i / NUM_EDGE].flows.deep_lateral[i % NUM_EDGE];
    });
    vadose_contact_area(&mut faces[layout.faces(FaceKind::LateralDeepUnsaturated)], volumes);
    par_for_each_mut(&mut faces[layout.faces(FaceKind::DeepRechargeUnsaturated)], |e, face| {
        face.flux = elements[e].flows.deep_recharge * elements[e].area;
    });
    par_for_each_mut(&mut faces[layout.faces(FaceKind::DeepRechargeGroundwater)], |e, face| {
        face.flux = -elements[e].flows.deep_recharge * elements[e].area;
    });
}

fn vadose_contact_area(block: &mut [FluxFace], volumes: &[ControlVolume]) {
    par_for_each_mut(block, |_, face| {
        if face.condition == FaceCondition::NoFlow {
            return;
        }
        let up = volumes[face.node_up.index()].geometry.height_t;
        let down = volumes[face.node_down.index()].geometry.height_t;
        face.flux = 0.0;
        face.area = 0.5 * face.edge * (up + down);
    });
}

// =================================================================================================
// Step 2: river faces
// =================================================================================================

fn river_face_flux(kind: FaceKind, flow: &[f64; river_flow::COMPONENTS]) -> f64 {
    use river_flow::*;
    match kind {
        FaceKind::LeftSurfaceToRiver => flow[LEFT_SURFACE],
        FaceKind::RightSurfaceToRiver => flow[RIGHT_SURFACE],
        FaceKind::LeftAquiferToRiver => flow[LEFT_AQUIFER_TO_AQUIFER] + flow[LEFT_AQUIFER],
        FaceKind::RightAquiferToRiver => flow[RIGHT_AQUIFER_TO_AQUIFER] + flow[RIGHT_AQUIFER],
        FaceKind::DownRiverToRiver => flow[DOWN_AQUIFER] + flow[DOWN_CHANNEL],
        FaceKind::UpRiverToRiver => flow[UP_AQUIFER] + flow[UP_CHANNEL],
        // element faces never reach here
        _ => 0.0,
    }
}

/// Copy river flow vectors into the six river face blocks
///
/// The up-river face of a confluence also receives the tributary inflow
/// `-(flow[DOWN_AQUIFER] + flow[DOWN_CHANNEL])` of the tributary segment.
pub fn map_river_fluxes(state: &mut CouplingState, hydrology: &Hydrology) {
    let CouplingState { layout, faces, .. } = state;
    let rivers = &hydrology.rivers;

    for kind in [
        FaceKind::LeftSurfaceToRiver,
        FaceKind::RightSurfaceToRiver,
        FaceKind::LeftAquiferToRiver,
        FaceKind::RightAquiferToRiver,
        FaceKind::DownRiverToRiver,
        FaceKind::UpRiverToRiver,
    ] {
        par_for_each_mut(&mut faces[layout.faces(kind)], |s, face| {
            face.flux = river_face_flux(kind, &rivers[s].flow);
            if kind == FaceKind::UpRiverToRiver
                && let Some(trib) = rivers[s].tributary()
            {
                let flow = &rivers[trib].flow;
                face.flux_trib = -(flow[river_flow::DOWN_AQUIFER] + flow[river_flow::DOWN_CHANNEL]);
            }
        });
    }
}

// =================================================================================================
// Step 4: volume geometry
// =================================================================================================

/// Refresh height, volume and saturation of every physical volume
///
/// | Block                  | Height                                      | Saturation |
/// |------------------------|---------------------------------------------|------------|
/// | groundwater            | `max(gw, 1e-5)`                             | 1          |
/// | unsaturated            | `max(heqv, 1e-5)`                           | `satn`     |
/// | deep analogues         | same with geology and deep storages         |            |
/// | river                  | `max(gw, 1e-5) + max(stage, 1e-5) / φ`      | 1          |
pub fn refresh_geometry(
    state: &mut CouplingState,
    hydrology: &Hydrology,
    geometry: &dyn GeometryUpdate,
    unsat: &dyn UnsatEquivalence,
) {
    let elements = &hydrology.elements;
    let rivers = &hydrology.rivers;
    let blocks = state.volume_blocks_mut();

    par_for_each_mut(blocks.groundwater, |e, cv| {
        geometry.update(elements[e].storage.gw.max(MIN_STORAGE_HEIGHT), 1.0, &mut cv.geometry);
    });

    par_for_each_mut(blocks.unsaturated, |e, cv| {
        let elem = &elements[e];
        let s = &elem.storage;
        let heqv = unsat.equivalent_height(&elem.soil, s.unsat, s.gw);
        let satn = unsat.saturation_ratio(elem.soil.depth, s.unsat, s.gw);
        geometry.update(heqv.max(MIN_STORAGE_HEIGHT), satn, &mut cv.geometry);
    });

    par_for_each_mut(blocks.deep_groundwater, |e, cv| {
        geometry.update(elements[e].storage.deep_gw.max(MIN_STORAGE_HEIGHT), 1.0, &mut cv.geometry);
    });

    par_for_each_mut(blocks.deep_unsaturated, |e, cv| {
        let elem = &elements[e];
        let geol = elem.geology.unwrap_or(elem.soil);
        let s = &elem.storage;
        let heqv = unsat.equivalent_height(&geol, s.deep_unsat, s.deep_gw);
        let satn = unsat.saturation_ratio(geol.depth, s.deep_unsat, s.deep_gw);
        geometry.update(heqv.max(MIN_STORAGE_HEIGHT), satn, &mut cv.geometry);
    });

    par_for_each_mut(blocks.river, |r, cv| {
        let seg = &rivers[r];
        let height =
            seg.storage.gw.max(MIN_STORAGE_HEIGHT) + seg.storage.stage.max(MIN_STORAGE_HEIGHT) / seg.porosity;
        geometry.update(height, 1.0, &mut cv.geometry);
    });
}

// =================================================================================================
// Step 5: contact areas
// =================================================================================================

/// Upwinded lateral contact area and recharge area, with derived velocity
///
/// A lateral face uses `edge · mean_height` of `node_up` when its flux is
/// positive and of `node_down` otherwise. Recharge faces use the plan area
/// of their volume. Velocity falls back to the negligible floor when the
/// area is degenerate.
pub fn update_face_geometry(state: &mut CouplingState) {
    let CouplingState { layout, volumes, faces } = state;
    let volumes = &*volumes;

    for kind in [FaceKind::LateralGroundwater, FaceKind::LateralDeepGroundwater] {
        par_for_each_mut(&mut faces[layout.faces(kind)], |_, face| {
            if face.condition == FaceCondition::NoFlow {
                return;
            }
            let side = if face.flux > 0.0 { face.node_up } else { face.node_down };
            let area = face.edge * volumes[side.index()].geometry.mean_height();
            face.set_area_and_velocity(area);
        });
    }

    for kind in [
        FaceKind::RechargeUnsaturated,
        FaceKind::RechargeGroundwater,
        FaceKind::DeepRechargeUnsaturated,
        FaceKind::DeepRechargeGroundwater,
    ] {
        par_for_each_mut(&mut faces[layout.faces(kind)], |_, face| {
            let area = volumes[face.node_up.index()].geometry.area;
            face.set_area_and_velocity(area);
        });
    }
}

// =================================================================================================
// Step 6: aquifer interface
// =================================================================================================

/// Mirror each bank's lateral groundwater face onto the river aquifer face
///
/// Both faces describe the same interface seen from opposite sides: the
/// river face takes the element face's area and the negated velocity.
pub fn reconcile_aquifer_faces(state: &mut CouplingState, hydrology: &Hydrology) {
    let layout = &state.layout;
    let base = layout.river_face_base();
    let (element_faces, river_faces) = state.faces.split_at_mut(base);
    let element_faces = &*element_faces;

    for kind in [FaceKind::LeftAquiferToRiver, FaceKind::RightAquiferToRiver] {
        let range = layout.faces(kind);
        par_for_each_mut(&mut river_faces[range.start - base..range.end - base], |s, face| {
            let seg = &hydrology.rivers[s];
            let bank = if kind == FaceKind::LeftAquiferToRiver { seg.left_element } else { seg.right_element };
            let Some(edge) = hydrology.elements[bank].edge_to_river(s) else {
                return;
            };
            let lateral = &element_faces[layout.element_face(FaceKind::LateralGroundwater, bank, edge).index()];
            face.area = lateral.area;
            face.velocity = -lateral.velocity;
        });
    }
}

// =================================================================================================
// Step 7: virtual reservoirs
// =================================================================================================

/// Write rain chemistry into the precipitation and boundary reservoirs
///
/// The precipitation reservoir holds `conc · condensation` (times the
/// calibration factor for the calibrated species) for mobile species, or
/// zero for every species when precipitation is disabled. The boundary
/// reservoir holds `conc · condensation` in both total and reference.
pub fn refresh_reservoirs(state: &mut CouplingState, forcing: &PrecipitationForcing, species: &SpeciesTable) {
    let precipitation = state.layout.precipitation();
    let boundary = state.layout.boundary();

    let cv = state.volume_mut(precipitation);
    if forcing.is_enabled() {
        for k in 0..species.n_mobile() {
            cv.total[k] = forcing.precipitation_value(k);
        }
    } else {
        cv.total.fill(0.0);
    }

    let cv = state.volume_mut(boundary);
    for j in 0..species.n_total() {
        let c = forcing.boundary_value(j);
        cv.total[j] = c;
        cv.reference[j] = c;
    }
}

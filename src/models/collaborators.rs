//! Black-box collaborators
//!
//! The coupling engine drives five numerical components it does not own:
//!
//! | Trait                 | Contract                                                       |
//! |-----------------------|----------------------------------------------------------------|
//! | [`GeometryUpdate`]    | new storage height + saturation → volume bookkeeping           |
//! | [`UnsatEquivalence`]  | soil bounds + storages → equivalent height, saturation ratio   |
//! | [`TransportSolver`]   | faces + volumes + interval → transported totals, in place      |
//! | [`ReactionSolver`]    | one volume + interval → reacted totals, in place               |
//! | [`SpeciationSolver`]  | one volume → secondary and reference concentrations, in place  |
//!
//! Each trait ships with a simple reference implementation so the crate runs
//! end-to-end; production runs plug in their own geochemistry.

use nalgebra::{DMatrix, DVector};

use crate::physics::{ControlVolume, FaceCondition, FluxFace, SoilProperties, SpeciesTable, VolumeGeometry};
use crate::solver::par_map;

// =================================================================================================
// Geometry
// =================================================================================================

/// Refreshes a control volume's height/volume bookkeeping
pub trait GeometryUpdate: Send + Sync {
    /// Roll the end-of-step state into the start-of-step state and apply the
    /// new equivalent `height` and `saturation`
    fn update(&self, height: f64, saturation: f64, geometry: &mut VolumeGeometry);
}

/// `vol = area × height`, with the flow solver's height taken as the
/// interpolated cross-check value
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageGeometry;

impl GeometryUpdate for StorageGeometry {
    fn update(&self, height: f64, saturation: f64, g: &mut VolumeGeometry) {
        g.height_o = g.height_t;
        g.vol_o = g.area * g.height_o;
        g.height_t = height;
        g.height_int = height;
        g.vol = g.area * height;
        g.saturation = saturation;
    }
}

/// Equivalent height and saturation ratio of an unsaturated zone
pub trait UnsatEquivalence: Send + Sync {
    /// Equivalent water height of the unsaturated zone **\[m\]**
    fn equivalent_height(&self, soil: &SoilProperties, unsat: f64, gw: f64) -> f64;

    /// Unsaturated storage over the unsaturated thickness, in `[0, 1]`
    fn saturation_ratio(&self, depth: f64, unsat: f64, gw: f64) -> f64;
}

/// Moisture-content based equivalence
///
/// ```text
/// deficit = depth - gw
/// satn    = clamp(unsat / deficit, 0, 1)
/// θ       = θr + (θs - θr) · satn
/// heqv    = deficit · θ / θs
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SoilMoistureEquivalence;

impl UnsatEquivalence for SoilMoistureEquivalence {
    fn equivalent_height(&self, soil: &SoilProperties, unsat: f64, gw: f64) -> f64 {
        let deficit = soil.depth - gw;
        if deficit <= 0.0 || soil.porosity_max <= 0.0 {
            return 0.0;
        }
        let satn = self.saturation_ratio(soil.depth, unsat, gw);
        let theta = soil.porosity_min + (soil.porosity_max - soil.porosity_min) * satn;
        deficit * theta / soil.porosity_max
    }

    fn saturation_ratio(&self, depth: f64, unsat: f64, gw: f64) -> f64 {
        let deficit = depth - gw;
        if deficit <= 0.0 {
            return 1.0;
        }
        (unsat / deficit).clamp(0.0, 1.0)
    }
}

// =================================================================================================
// Transport
// =================================================================================================

/// Advection-dispersion solver over the whole flux network
pub trait TransportSolver: Send + Sync {
    /// Advance mobile total concentrations across `interval` seconds
    ///
    /// Internal sub-steps must not exceed the smallest `step_size` of any
    /// non-virtual volume. Virtual volumes are fixed-concentration
    /// reservoirs and must not be modified.
    fn advance(&self, interval: f64, faces: &[FluxFace], volumes: &mut [ControlVolume], species: &SpeciesTable);
}

/// Explicit upwind finite-volume transport
///
/// Each face updates only its `node_up` volume (the network holds one face
/// per direction). Advection carries the upwind concentration; dispersive
/// faces add `(D + α|v|) · A / d · (c_up - c_down)`. Water volumes are
/// interpolated linearly between `vol_o` and `vol` across the sub-steps.
#[derive(Debug, Clone, Copy)]
pub struct UpwindTransport {
    /// Upper bound on sub-steps per interval
    pub max_substeps: usize,
}

impl Default for UpwindTransport {
    fn default() -> Self {
        Self { max_substeps: 10_000 }
    }
}

impl UpwindTransport {
    fn substeps(&self, interval: f64, volumes: &[ControlVolume]) -> usize {
        let dt_min = volumes
            .iter()
            .filter(|v| !v.is_virtual() && v.step_size > 0.0)
            .map(|v| v.step_size)
            .fold(interval, f64::min);
        let n = (interval / dt_min).ceil();
        if n.is_finite() { (n as usize).clamp(1, self.max_substeps) } else { self.max_substeps }
    }

    /// Mass leaving `node_up` per second, per mobile species
    fn face_rate(face: &FluxFace, conc: &[DVector<f64>], species: &SpeciesTable) -> Option<DVector<f64>> {
        if face.condition == FaceCondition::NoFlow {
            return None;
        }
        let up = &conc[face.node_up.index()];
        let down = &conc[face.node_down.index()];
        let q = face.flux;

        let rate = DVector::from_fn(up.len(), |j, _| {
            let advection = if q >= 0.0 {
                q * up[j]
            } else if let Some(trib) = face.node_trib {
                (q - face.flux_trib) * down[j] + face.flux_trib * conc[trib.index()][j]
            } else {
                q * down[j]
            };

            let dispersion = if face.is_dispersive() && face.distance > 0.0 {
                let sp = species.species(j);
                let coeff = sp.diffusion + sp.dispersivity * face.velocity.abs();
                coeff * face.area / face.distance * (up[j] - down[j])
            } else {
                0.0
            };

            advection + dispersion
        });
        Some(rate)
    }
}

impl TransportSolver for UpwindTransport {
    fn advance(&self, interval: f64, faces: &[FluxFace], volumes: &mut [ControlVolume], species: &SpeciesTable) {
        let n_mobile = species.n_mobile();
        if n_mobile == 0 || interval <= 0.0 {
            return;
        }

        let n_sub = self.substeps(interval, volumes);
        let dt = interval / n_sub as f64;

        let mut conc: Vec<DVector<f64>> =
            volumes.iter().map(|v| DVector::from_fn(n_mobile, |j, _| v.total[j])).collect();
        let mut mass: Vec<DVector<f64>> =
            volumes.iter().zip(&conc).map(|(v, c)| c * v.geometry.vol_o).collect();

        for k in 1..=n_sub {
            let rates = par_map(faces, |_, face| Self::face_rate(face, &conc, species));

            for (face, rate) in faces.iter().zip(rates) {
                let up = face.node_up.index();
                if let Some(rate) = rate
                    && !volumes[up].is_virtual()
                {
                    mass[up] -= rate * dt;
                }
            }

            let frac = k as f64 / n_sub as f64;
            for ((v, m), c) in volumes.iter().zip(mass.iter_mut()).zip(conc.iter_mut()) {
                if v.is_virtual() {
                    continue;
                }
                let g = &v.geometry;
                let vol = g.vol_o + (g.vol - g.vol_o) * frac;
                m.apply(|x| *x = x.max(0.0));
                if vol > 0.0 {
                    *c = &*m / vol;
                }
            }
        }

        for (v, c) in volumes.iter_mut().zip(&conc) {
            if !v.is_virtual() {
                v.total.rows_mut(0, n_mobile).copy_from(c);
            }
        }
    }
}

// =================================================================================================
// Reaction
// =================================================================================================

/// Result of one batch-reaction call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Converged,
    /// The solver gave up; the volume keeps whatever state the solver left
    Failed,
}

/// Batch kinetic/equilibrium reaction of one volume
pub trait ReactionSolver: Send + Sync {
    fn react(&self, interval: f64, species: &SpeciesTable, volume: &mut ControlVolume) -> ReactionOutcome;
}

/// Leaves every volume unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReaction;

impl ReactionSolver for NoReaction {
    fn react(&self, _interval: f64, _species: &SpeciesTable, _volume: &mut ControlVolume) -> ReactionOutcome {
        ReactionOutcome::Converged
    }
}

/// First-order decay `c ← c · exp(-k Δt)` per primary species
///
/// Fails on non-finite or negative totals, which are left untouched.
#[derive(Debug, Clone)]
pub struct FirstOrderDecay {
    /// Rate constant per primary species **\[1/s\]**
    pub rates: Vec<f64>,
}

impl ReactionSolver for FirstOrderDecay {
    fn react(&self, interval: f64, _species: &SpeciesTable, volume: &mut ControlVolume) -> ReactionOutcome {
        if volume.total.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return ReactionOutcome::Failed;
        }
        for (c, k) in volume.total.iter_mut().zip(&self.rates) {
            *c *= (-k * interval).exp();
        }
        ReactionOutcome::Converged
    }
}

// =================================================================================================
// Speciation
// =================================================================================================

/// Equilibrium speciation of one volume
pub trait SpeciationSolver: Send + Sync {
    fn speciate(&self, species: &SpeciesTable, volume: &mut ControlVolume);
}

/// Smallest reference concentration written by the reference speciation
/// solvers, so the log10 caches stay finite
pub const MIN_REFERENCE_CONCENTRATION: f64 = 1.0e-20;

/// Every primary is free: `reference = total`, secondaries untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeIonSpeciation;

impl SpeciationSolver for FreeIonSpeciation {
    fn speciate(&self, _species: &SpeciesTable, volume: &mut ControlVolume) {
        volume.reference = volume.total.map(|c| c.max(MIN_REFERENCE_CONCENTRATION));
    }
}

/// Linear partitioning `secondary = K · total`
///
/// The free (reference) concentration of each primary is its total minus
/// the amount bound in secondaries through the stoichiometry matrix.
#[derive(Debug, Clone)]
pub struct LinearPartition {
    /// `[n_secondary × n_total]` distribution coefficients
    pub distribution: DMatrix<f64>,
}

impl SpeciationSolver for LinearPartition {
    fn speciate(&self, species: &SpeciesTable, volume: &mut ControlVolume) {
        let n_total = species.n_total();
        volume.secondary = &self.distribution * &volume.total;

        let stoich = species.total_matrix();
        for j in 0..n_total {
            let bound: f64 = (0..species.n_secondary()).map(|k| stoich[(j, n_total + k)] * volume.secondary[k]).sum();
            volume.reference[j] = (volume.total[j] - bound).max(MIN_REFERENCE_CONCENTRATION);
        }
    }
}

// =================================================================================================
// Bundle
// =================================================================================================

/// The full set of collaborators an engine drives
pub struct Collaborators {
    pub geometry: Box<dyn GeometryUpdate>,
    pub unsat: Box<dyn UnsatEquivalence>,
    pub transport: Box<dyn TransportSolver>,
    pub reaction: Box<dyn ReactionSolver>,
    pub speciation: Box<dyn SpeciationSolver>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            geometry: Box::new(StorageGeometry),
            unsat: Box::new(SoilMoistureEquivalence),
            transport: Box::new(UpwindTransport::default()),
            reaction: Box::new(NoReaction),
            speciation: Box::new(FreeIonSpeciation),
        }
    }
}

impl Collaborators {
    pub fn with_transport(mut self, transport: impl TransportSolver + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    pub fn with_reaction(mut self, reaction: impl ReactionSolver + 'static) -> Self {
        self.reaction = Box::new(reaction);
        self
    }

    pub fn with_speciation(mut self, speciation: impl SpeciationSolver + 'static) -> Self {
        self.speciation = Box::new(speciation);
        self
    }

    pub fn with_geometry(mut self, geometry: impl GeometryUpdate + 'static) -> Self {
        self.geometry = Box::new(geometry);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{FaceKind, Species, VolumeId, VolumeKind};
    use approx::assert_relative_eq;

    fn table() -> SpeciesTable {
        SpeciesTable::primary_only(vec![Species::aqueous("Cl", 0.0, 0.0)]).unwrap()
    }

    fn cell(index: usize, conc: f64) -> ControlVolume {
        let mut v = ControlVolume::new(index, VolumeKind::Groundwater, VolumeGeometry::new(10.0, 1.0, 0.4), 1, 0);
        v.set_initial(&[conc]);
        v.step_size = 100.0;
        v
    }

    #[test]
    fn test_storage_geometry_rolls_heights() {
        let mut g = VolumeGeometry::new(2.0, 1.0, 0.4);
        StorageGeometry.update(1.5, 0.8, &mut g);
        assert_eq!(g.height_o, 1.0);
        assert_eq!(g.height_t, 1.5);
        assert_eq!(g.height_int, 1.5);
        assert_eq!(g.vol_o, 2.0);
        assert_eq!(g.vol, 3.0);
        assert_eq!(g.saturation, 0.8);
    }

    #[test]
    fn test_soil_moisture_equivalence() {
        let soil = SoilProperties { porosity_max: 0.5, porosity_min: 0.1, depth: 2.0, infiltration_depth: 0.1 };
        let eq = SoilMoistureEquivalence;
        assert_relative_eq!(eq.saturation_ratio(2.0, 0.5, 1.0), 0.5);
        // θ = 0.1 + 0.4 · 0.5 = 0.3 ; heqv = 1.0 · 0.3 / 0.5
        assert_relative_eq!(eq.equivalent_height(&soil, 0.5, 1.0), 0.6, epsilon = 1e-12);
        assert_eq!(eq.equivalent_height(&soil, 0.5, 2.5), 0.0);
        assert_eq!(eq.saturation_ratio(2.0, 0.5, 2.0), 1.0);
    }

    #[test]
    fn test_upwind_transport_conserves_mass_between_cells() {
        let species = table();
        let mut volumes = vec![cell(0, 1.0), cell(1, 0.0)];
        let mut out = FluxFace::new(FaceKind::LateralGroundwater, VolumeId(0), VolumeId(1), FaceCondition::Advection, 1.0);
        out.flux = 0.01;
        let mut back = FluxFace::new(FaceKind::LateralGroundwater, VolumeId(1), VolumeId(0), FaceCondition::Advection, 1.0);
        back.flux = -0.01;

        UpwindTransport::default().advance(100.0, &[out, back], &mut volumes, &species);

        let total_mass: f64 = volumes.iter().map(|v| v.total[0] * v.geometry.vol).sum();
        assert_relative_eq!(total_mass, 10.0, epsilon = 1e-9);
        assert!(volumes[1].total[0] > 0.0);
        assert!(volumes[0].total[0] < 1.0);
    }

    #[test]
    fn test_transport_dilutes_with_volume_growth() {
        let species = table();
        let mut v = cell(0, 1.0);
        v.geometry.vol = 2.0 * v.geometry.vol_o;
        let mut volumes = vec![v];
        UpwindTransport::default().advance(10.0, &[], &mut volumes, &species);
        assert_relative_eq!(volumes[0].total[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_transport_leaves_reservoirs_alone() {
        let species = table();
        let mut volumes = vec![cell(0, 0.0), ControlVolume::reservoir(1, 1, 0)];
        volumes[1].set_initial(&[5.0]);
        let mut inflow = FluxFace::new(FaceKind::Infiltration, VolumeId(0), VolumeId(1), FaceCondition::Advection, 0.1);
        inflow.flux = -0.01;
        UpwindTransport::default().advance(100.0, &[inflow], &mut volumes, &species);
        assert_eq!(volumes[1].total[0], 5.0);
        assert!(volumes[0].total[0] > 0.0);
    }

    #[test]
    fn test_first_order_decay() {
        let species = table();
        let mut v = cell(0, 2.0);
        let outcome = FirstOrderDecay { rates: vec![0.1] }.react(10.0, &species, &mut v);
        assert_eq!(outcome, ReactionOutcome::Converged);
        assert_relative_eq!(v.total[0], 2.0 * (-1.0f64).exp(), epsilon = 1e-12);

        v.total[0] = f64::NAN;
        assert_eq!(FirstOrderDecay { rates: vec![0.1] }.react(10.0, &species, &mut v), ReactionOutcome::Failed);
    }

    #[test]
    fn test_linear_partition() {
        let species = SpeciesTable::new(
            vec![Species::aqueous("Ca", 1e-9, 0.1)],
            vec![Species::secondary("Ca(s)", crate::physics::ChemicalClass::Adsorption)],
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
        )
        .unwrap();
        let mut v = ControlVolume::new(0, VolumeKind::River, VolumeGeometry::new(1.0, 1.0, 1.0), 1, 1);
        v.set_initial(&[1.0]);
        LinearPartition { distribution: DMatrix::from_row_slice(1, 1, &[0.25]) }.speciate(&species, &mut v);
        assert_relative_eq!(v.secondary[0], 0.25);
        assert_relative_eq!(v.reference[0], 0.75);
    }
}

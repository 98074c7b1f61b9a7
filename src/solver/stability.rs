//! Peclet number and internal step-size bounds
//!
//! Every dispersive face contributes to the stability budget of the volume
//! it leaves:
//!
//! ```text
//! budget(up) += |Q / V(up)| · (1 + Pe) / Pe
//! step(up)    = min(COURANT_LIMIT / budget(up), stepsize)
//! ```
//!
//! `(1 + Pe) / Pe` is evaluated as `1 + 1 / Pe`, so a huge Peclet number
//! tends to the pure advective limit instead of `inf / inf`.

use crate::physics::{FluxFace, SpeciesTable};

use super::network::CouplingState;
use super::par_map;

/// Lower bound on any Peclet number
pub const MIN_PECLET: f64 = 1.0e-8;

/// Courant-like safety factor of the explicit transport sub-step
pub const COURANT_LIMIT: f64 = 0.6;

/// Cell Peclet number `|v · d / (D + α |v|)|`, floored at [`MIN_PECLET`]
///
/// A zero denominator (no diffusion, no velocity) yields the floor rather
/// than `NaN`.
pub fn peclet(velocity: f64, distance: f64, diffusion: f64, dispersivity: f64) -> f64 {
    let pe = (velocity * distance / (diffusion + dispersivity * velocity.abs())).abs();
    // f64::max drops NaN
    pe.max(MIN_PECLET)
}

/// Smallest Peclet number of a face over the mobile species
///
/// Falls back to every primary species when none is mobile.
pub fn face_peclet(face: &FluxFace, species: &SpeciesTable) -> f64 {
    let n = match species.n_mobile() {
        0 => species.n_total(),
        n => n,
    };
    (0..n)
        .map(|j| {
            let sp = species.species(j);
            peclet(face.velocity, face.distance, sp.diffusion, sp.dispersivity)
        })
        .fold(f64::INFINITY, f64::min)
}

/// Stability contribution of one face to its upstream volume
pub fn face_budget(flux: f64, volume: f64, peclet: f64) -> f64 {
    (flux / volume).abs() * (1.0 + 1.0 / peclet)
}

/// Rebuild every volume's `step_size` from the current faces
///
/// Budgets are zeroed, per-face contributions computed in parallel and
/// scattered sequentially, then each non-virtual volume's budget becomes
/// `min(COURANT_LIMIT / budget, stepsize)`. Virtual reservoirs keep a zero
/// step size.
pub fn compute_step_sizes(state: &mut CouplingState, species: &SpeciesTable, stepsize: f64) {
    for cv in &mut state.volumes {
        cv.step_size = 0.0;
    }

    let volumes = &state.volumes;
    let contributions = par_map(&state.faces, |_, face| {
        if !face.is_dispersive() {
            return None;
        }
        let up = &volumes[face.node_up.index()];
        let vol = up.geometry.vol;
        if up.is_virtual() || !(vol > 0.0) {
            return None;
        }
        Some((face.node_up.index(), face_budget(face.flux, vol, face_peclet(face, species))))
    });

    for (up, budget) in contributions.into_iter().flatten() {
        state.volumes[up].step_size += budget;
    }

    for cv in state.volumes.iter_mut().filter(|cv| !cv.is_virtual()) {
        // 0.6 / 0 = inf, capped below
        cv.step_size = (COURANT_LIMIT / cv.step_size).min(stepsize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SoilMoistureEquivalence;
    use crate::physics::{Element, FaceKind, Hydrology, Neighbor, Species};
    use approx::assert_relative_eq;

    #[test]
    fn test_peclet_value() {
        // v d / (D + α v) = 1e-5 · 10 / (1e-9 + 0.1 · 1e-5)
        let pe = peclet(1e-5, 10.0, 1e-9, 0.1);
        assert_relative_eq!(pe, 1e-4 / (1e-9 + 1e-6), max_relative = 1e-12);
    }

    #[test]
    fn test_peclet_floor() {
        assert_eq!(peclet(0.0, 10.0, 1e-9, 0.1), MIN_PECLET);
        assert_eq!(peclet(0.0, 0.0, 0.0, 0.0), MIN_PECLET);
        assert_eq!(peclet(1e-30, 1e-3, 1.0, 0.0), MIN_PECLET);
    }

    #[test]
    fn test_peclet_sign_independent() {
        assert_eq!(peclet(-2e-6, 5.0, 1e-9, 0.5), peclet(2e-6, 5.0, 1e-9, 0.5));
    }

    #[test]
    fn test_budget_pure_advection_limit() {
        assert_relative_eq!(face_budget(2.0, 4.0, f64::INFINITY), 0.5);
        assert_relative_eq!(face_budget(-2.0, 4.0, 1.0), 1.0);
    }

    fn two_cells() -> (CouplingState, SpeciesTable) {
        let e0 = Element {
            area: 100.0,
            edges: [10.0; 3],
            centroid: [0.0, 0.0],
            neighbors: [Neighbor::Element(1), Neighbor::None, Neighbor::None],
            storage: crate::physics::WaterStorage { gw: 1.0, ..Default::default() },
            ..Default::default()
        };
        let e1 = Element { centroid: [10.0, 0.0], neighbors: [Neighbor::Element(0), Neighbor::None, Neighbor::None], ..e0.clone() };
        let hydro = Hydrology::new(vec![e0, e1], vec![], 0);
        let species = SpeciesTable::primary_only(vec![Species::aqueous("Cl", 1e-9, 0.1)]).unwrap();
        let state = CouplingState::build(&hydro, &species, false, &SoilMoistureEquivalence).unwrap();
        (state, species)
    }

    #[test]
    fn test_step_sizes_without_flow_cap_at_stepsize() {
        let (mut state, species) = two_cells();
        compute_step_sizes(&mut state, &species, 60.0);
        for cv in &state.volumes {
            let expected = if cv.is_virtual() { 0.0 } else { 60.0 };
            assert_eq!(cv.step_size, expected);
        }
    }

    #[test]
    fn test_step_size_from_face_budget() {
        let (mut state, species) = two_cells();
        let id = state.layout.element_face(FaceKind::LateralGroundwater, 0, 0).index();
        state.faces[id].flux = 0.01;
        state.faces[id].set_area_and_velocity(10.0);

        compute_step_sizes(&mut state, &species, 1.0e6);

        let pe = face_peclet(&state.faces[id], &species);
        let vol = state.volumes[0].geometry.vol;
        let expected = COURANT_LIMIT / face_budget(0.01, vol, pe);
        assert_relative_eq!(state.volumes[0].step_size, expected, max_relative = 1e-12);
        // the receiving cell gets nothing from a face it does not own
        assert_eq!(state.volumes[1].step_size, 1.0e6);
    }

    #[test]
    fn test_every_dispersive_face_peclet_above_floor() {
        let (mut state, species) = two_cells();
        for (i, face) in state.faces.iter_mut().enumerate() {
            face.flux = if i % 2 == 0 { 0.0 } else { -1e-3 };
            face.set_area_and_velocity(if i % 3 == 0 { 0.0 } else { 2.0 });
        }
        for face in state.faces.iter().filter(|f| f.is_dispersive()) {
            assert!(face_peclet(face, &species) >= MIN_PECLET);
        }
    }
}

//! Helper functions for integration tests

use nalgebra::DMatrix;
use rtcouple_rs::physics::{
    ChemicalClass, Element, Hydrology, MassAction, Neighbor, RiverSegment, Species, SpeciesTable, WaterStorage,
};

/// Single conservative tracer
pub fn tracer_species() -> SpeciesTable {
    SpeciesTable::primary_only(vec![Species::aqueous("Cl", 1e-9, 0.1)]).unwrap()
}

/// Na sorbing as X-Na, conservative Cl, immobile calcite
pub fn sorbing_species() -> SpeciesTable {
    let primary = vec![
        Species::aqueous("Na", 1e-9, 0.1).with_mass_action(MassAction::Mixed),
        Species::aqueous("Cl", 1e-9, 0.1),
        Species::mineral("Calcite"),
    ];
    let secondary = vec![Species::secondary("XNa", ChemicalClass::CationExchange)];
    let mut total = DMatrix::zeros(3, 4);
    for i in 0..3 {
        total[(i, i)] = 1.0;
    }
    total[(0, 3)] = 1.0;
    SpeciesTable::new(primary, secondary, total).unwrap()
}

/// `n` elements in a row, edge 0 towards the previous element and edge 1
/// towards the next; groundwater heights from `gw`
pub fn hillslope(gw: &[f64]) -> Hydrology {
    let n = gw.len();
    let elements = gw
        .iter()
        .enumerate()
        .map(|(i, &h)| Element {
            area: 100.0,
            edges: [10.0; 3],
            centroid: [10.0 * i as f64, 0.0],
            neighbors: [
                if i > 0 { Neighbor::Element(i - 1) } else { Neighbor::None },
                if i + 1 < n { Neighbor::Element(i + 1) } else { Neighbor::None },
                Neighbor::None,
            ],
            storage: WaterStorage { gw: h, unsat: 0.2, ..Default::default() },
            ..Default::default()
        })
        .collect();
    Hydrology::new(elements, Vec::new(), 0)
}

/// `n` river segments flowing from 0 to `n - 1`, each between its own
/// left and right bank elements (elements `2s` and `2s + 1`)
pub fn river_reach(n: usize) -> Hydrology {
    let mut elements = Vec::with_capacity(2 * n);
    for s in 0..n {
        for side in 0..2 {
            let mut neighbors = [Neighbor::None; 3];
            neighbors[side] = Neighbor::River(s);
            elements.push(Element {
                area: 100.0,
                edges: [10.0; 3],
                centroid: [100.0 * s as f64, if side == 0 { 10.0 } else { -10.0 }],
                neighbors,
                storage: WaterStorage { gw: 1.5, unsat: 0.2, ..Default::default() },
                ..Default::default()
            });
        }
    }
    let rivers = (0..n)
        .map(|s| RiverSegment {
            centroid: [100.0 * s as f64, 0.0],
            down: (s + 1 < n).then_some(s + 1),
            up: [s.checked_sub(1), None],
            left_element: 2 * s,
            right_element: 2 * s + 1,
            ..Default::default()
        })
        .collect();
    Hydrology::new(elements, rivers, 0)
}

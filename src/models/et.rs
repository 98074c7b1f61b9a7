//! Evapotranspiration source partitioning
//!
//! Decides, per element, which store (surface ponding, unsaturated zone or
//! groundwater) supplies the direct-evaporation and transpiration demand
//! computed by the flow solver. The result feeds the water balance that the
//! flux mapping later reads as storages.
//!
//! # Policies
//!
//! | Policy        | Evaporation                                  | Transpiration                    |
//! |---------------|----------------------------------------------|----------------------------------|
//! | `BareSoil`    | surface if ponding ≥ depression storage, else water-table test on infiltration depth | water-table test on root depth |
//! | `LandSurface` | water-table test on infiltration depth only  | weighted by [`TranspirationWeighting`] |
//!
//! A water-table test is a **strict** comparison: the table must be
//! shallower than the threshold (`gw > depth - d`). A table exactly at the
//! threshold draws from the unsaturated zone.

use serde::{Deserialize, Serialize};

use crate::physics::{Element, EtSources, Hydrology, MAX_SOIL_LAYERS};
use crate::solver::par_for_each_mut;

/// Ponding depth above which evaporation draws from surface storage **\[m\]**
pub const DEFAULT_DEPRESSION_STORAGE: f64 = 1.0e-4;

/// ET source policy, chosen once at setup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EtPolicy {
    /// No land-surface model: threshold rules for both demands
    BareSoil {
        /// Surface ponding threshold **\[m\]**
        #[serde(default = "default_depression_storage")]
        depression_storage: f64,
    },

    /// Land-surface model: transpiration split by a root/water-table weighting
    LandSurface,
}

fn default_depression_storage() -> f64 {
    DEFAULT_DEPRESSION_STORAGE
}

impl Default for EtPolicy {
    fn default() -> Self {
        Self::BareSoil { depression_storage: DEFAULT_DEPRESSION_STORAGE }
    }
}

/// Fraction of transpiration drawn from groundwater (land-surface-model mode)
pub trait TranspirationWeighting: Send + Sync {
    /// Groundwater share of `element.flows.transpiration`, in `[0, 1]`
    fn groundwater_fraction(&self, element: &Element) -> f64;
}

/// Default weighting: transpiration of root layers at or below the water table
///
/// Sums `layer_transpiration` over `water_table_layer..root_layers` and
/// divides by the total transpiration. Zero when the table lies below the
/// root zone or there is no transpiration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootLayerWeighting;

impl TranspirationWeighting for RootLayerWeighting {
    fn groundwater_fraction(&self, element: &Element) -> f64 {
        let ett = element.flows.transpiration;
        if ett <= 0.0 {
            return 0.0;
        }
        let roots = &element.roots;
        let upper = roots.root_layers.min(MAX_SOIL_LAYERS);
        if roots.water_table_layer >= upper {
            return 0.0;
        }
        let from_gw: f64 = element.flows.layer_transpiration[roots.water_table_layer..upper].iter().sum();
        (from_gw / ett).clamp(0.0, 1.0)
    }
}

/// Per-element ET source partitioner
pub struct EtPartitioner {
    policy: EtPolicy,
    weighting: Box<dyn TranspirationWeighting>,
}

impl std::fmt::Debug for EtPartitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtPartitioner")
            .field("policy", &self.policy)
            .field("weighting", &"<dyn TranspirationWeighting>")
            .finish()
    }
}

impl EtPartitioner {
    /// Partitioner with the default [`RootLayerWeighting`]
    pub fn new(policy: EtPolicy) -> Self {
        Self::with_weighting(policy, Box::new(RootLayerWeighting))
    }

    pub fn with_weighting(policy: EtPolicy, weighting: Box<dyn TranspirationWeighting>) -> Self {
        Self { policy, weighting }
    }

    pub fn policy(&self) -> EtPolicy {
        self.policy
    }

    /// Source split for one element
    pub fn partition(&self, element: &Element) -> EtSources {
        let edir = element.flows.evaporation;
        let ett = element.flows.transpiration;
        let storage = &element.storage;
        let soil = &element.soil;

        let table_above_infiltration = storage.gw > soil.depth - soil.infiltration_depth;
        let mut sources = EtSources::default();

        match self.policy {
            EtPolicy::BareSoil { depression_storage } => {
                if storage.surface >= depression_storage {
                    sources.evaporation_surface = edir;
                } else if table_above_infiltration {
                    sources.evaporation_gw = edir;
                } else {
                    sources.evaporation_unsat = edir;
                }

                if storage.gw > soil.depth - element.roots.depth {
                    sources.transpiration_gw = ett;
                } else {
                    sources.transpiration_unsat = ett;
                }
            }
            EtPolicy::LandSurface => {
                if table_above_infiltration {
                    sources.evaporation_gw = edir;
                } else {
                    sources.evaporation_unsat = edir;
                }

                let gwet = self.weighting.groundwater_fraction(element);
                sources.transpiration_unsat = (1.0 - gwet) * ett;
                sources.transpiration_gw = gwet * ett;
            }
        }

        sources
    }

    /// Write [`EtSources`] into every element
    pub fn apply(&self, hydrology: &mut Hydrology) {
        par_for_each_mut(&mut hydrology.elements, |_, elem| {
            elem.et = self.partition(elem);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{ElementFlows, RootZone, SoilProperties, WaterStorage};
    use approx::assert_relative_eq;

    fn element(surface: f64, gw: f64, depth: f64, dinf: f64, rzd: f64) -> Element {
        Element {
            area: 1.0,
            soil: SoilProperties { depth, infiltration_depth: dinf, ..Default::default() },
            roots: RootZone { depth: rzd, ..Default::default() },
            storage: WaterStorage { surface, gw, ..Default::default() },
            flows: ElementFlows { evaporation: 2.0, transpiration: 3.0, ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn test_ponded_surface_evaporates_first() {
        let p = EtPartitioner::new(EtPolicy::default());
        let s = p.partition(&element(0.01, 1.95, 2.0, 0.1, 0.3));
        assert_eq!(s.evaporation_surface, 2.0);
        assert_eq!(s.evaporation_gw, 0.0);
        assert_eq!(s.evaporation_unsat, 0.0);
    }

    #[test]
    fn test_shallow_table_feeds_evaporation() {
        let p = EtPartitioner::new(EtPolicy::default());
        let s = p.partition(&element(0.0, 1.95, 2.0, 0.1, 0.3));
        assert_eq!(s.evaporation_gw, 2.0);
        assert_eq!(s.evaporation_surface + s.evaporation_unsat, 0.0);
    }

    #[test]
    fn test_deep_table_evaporates_from_unsat() {
        let p = EtPartitioner::new(EtPolicy::default());
        let s = p.partition(&element(0.0, 0.5, 2.0, 0.1, 0.3));
        assert_eq!(s.evaporation_unsat, 2.0);
        assert_eq!(s.transpiration_unsat, 3.0);
        assert_eq!(s.transpiration_gw, 0.0);
    }

    #[test]
    fn test_transpiration_from_groundwater_above_root_threshold() {
        // depth 1.0, root zone 0.3: the table at 0.8 is above the 0.7 threshold
        let p = EtPartitioner::new(EtPolicy::default());
        let s = p.partition(&element(0.0, 0.8, 1.0, 0.1, 0.3));
        assert_eq!(s.transpiration_gw, 3.0);
        assert_eq!(s.transpiration_unsat, 0.0);
    }

    #[test]
    fn test_transpiration_at_exact_threshold_uses_unsat() {
        // 1.0 - 0.25 == 0.75 exactly in binary floating point
        let p = EtPartitioner::new(EtPolicy::default());
        let s = p.partition(&element(0.0, 0.75, 1.0, 0.1, 0.25));
        assert_eq!(s.transpiration_unsat, 3.0);
        assert_eq!(s.transpiration_gw, 0.0);
    }

    #[test]
    fn test_evaporation_at_exact_threshold_uses_unsat() {
        let p = EtPartitioner::new(EtPolicy::default());
        let s = p.partition(&element(0.0, 0.5, 1.0, 0.5, 0.25));
        assert_eq!(s.evaporation_unsat, 2.0);
        assert_eq!(s.evaporation_gw, 0.0);
    }

    #[test]
    fn test_land_surface_ignores_ponding() {
        let p = EtPartitioner::new(EtPolicy::LandSurface);
        let s = p.partition(&element(1.0, 0.5, 2.0, 0.1, 0.3));
        assert_eq!(s.evaporation_surface, 0.0);
        assert_eq!(s.evaporation_unsat, 2.0);
    }

    #[test]
    fn test_land_surface_weighting_splits_transpiration() {
        let mut elem = element(0.0, 0.5, 2.0, 0.1, 0.3);
        elem.roots = RootZone { depth: 0.3, water_table_layer: 2, root_layers: 4 };
        elem.flows.layer_transpiration[..4].copy_from_slice(&[1.0, 0.5, 0.75, 0.75]);

        let p = EtPartitioner::new(EtPolicy::LandSurface);
        let s = p.partition(&elem);
        assert_relative_eq!(s.transpiration_gw, 1.5, epsilon = 1e-12);
        assert_relative_eq!(s.transpiration_unsat, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_weighting_zero_when_table_below_roots() {
        let mut elem = element(0.0, 0.5, 2.0, 0.1, 0.3);
        elem.roots = RootZone { depth: 0.3, water_table_layer: 5, root_layers: 3 };
        assert_eq!(RootLayerWeighting.groundwater_fraction(&elem), 0.0);
    }

    #[test]
    fn test_apply_covers_every_element() {
        let mut hydro = Hydrology::new(
            vec![element(0.0, 0.8, 1.0, 0.1, 0.3), element(0.0, 0.2, 1.0, 0.1, 0.3)],
            Vec::new(),
            0,
        );
        EtPartitioner::new(EtPolicy::default()).apply(&mut hydro);
        assert_eq!(hydro.elements[0].et.transpiration_gw, 3.0);
        assert_eq!(hydro.elements[1].et.transpiration_unsat, 3.0);
    }
}

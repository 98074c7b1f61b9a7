//! Flow-solver contract
//!
//! The hydrologic state handed to the coupling engine at every coupling
//! step: per-element storages, fluxes and soil properties, and per-river
//! segment flow vectors. The engine only reads this snapshot, except for
//! the ET partitioner which writes [`EtSources`] back into each element.

use super::layout::NUM_EDGE;
use crate::error::{CouplingError, Result};

/// Maximum number of land-surface-model soil layers
pub const MAX_SOIL_LAYERS: usize = 11;

/// Indices into [`RiverSegment::flow`]
pub mod river_flow {
    pub const UP_CHANNEL: usize = 0;
    pub const DOWN_CHANNEL: usize = 1;
    pub const LEFT_SURFACE: usize = 2;
    pub const RIGHT_SURFACE: usize = 3;
    pub const LEFT_AQUIFER: usize = 4;
    pub const RIGHT_AQUIFER: usize = 5;
    pub const CHANNEL_LEAKAGE: usize = 6;
    pub const LEFT_AQUIFER_TO_AQUIFER: usize = 7;
    pub const RIGHT_AQUIFER_TO_AQUIFER: usize = 8;
    pub const DOWN_AQUIFER: usize = 9;
    pub const UP_AQUIFER: usize = 10;

    /// Length of the flow vector
    pub const COMPONENTS: usize = 11;
}

/// Neighbor across one element edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Neighbor {
    /// Domain edge
    #[default]
    None,
    /// Another element (0-based)
    Element(usize),
    /// A river segment (0-based)
    River(usize),
}

impl Neighbor {
    /// Decode a signed, 1-based neighbor id: positive = element,
    /// negative = river segment, zero = none
    pub fn from_signed(id: i64) -> Self {
        match id {
            0 => Self::None,
            id if id > 0 => Self::Element(id as usize - 1),
            id => Self::River((-id) as usize - 1),
        }
    }
}

/// Soil or geology property bundle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilProperties {
    /// Maximum volumetric water content (porosity) **\[-\]**
    pub porosity_max: f64,
    /// Residual volumetric water content **\[-\]**
    pub porosity_min: f64,
    /// Layer depth **\[m\]**
    pub depth: f64,
    /// Depth of the infiltration (surface) layer **\[m\]**
    pub infiltration_depth: f64,
}

impl Default for SoilProperties {
    fn default() -> Self {
        Self { porosity_max: 0.45, porosity_min: 0.05, depth: 2.0, infiltration_depth: 0.1 }
    }
}

/// Root zone description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootZone {
    /// Root-zone depth **\[m\]**
    pub depth: f64,
    /// First layer (0-based) at or below the water table (land-surface-model mode)
    pub water_table_layer: usize,
    /// Number of layers holding roots (land-surface-model mode)
    pub root_layers: usize,
}

impl Default for RootZone {
    fn default() -> Self {
        Self { depth: 0.3, water_table_layer: 4, root_layers: 3 }
    }
}

/// Water storages of one element, as equivalent heights **\[m\]**
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WaterStorage {
    /// Surface ponding
    pub surface: f64,
    /// Unsaturated zone
    pub unsat: f64,
    /// Groundwater table height above the layer bottom
    pub gw: f64,
    /// Deep (bedrock) unsaturated zone
    pub deep_unsat: f64,
    /// Deep (bedrock) groundwater
    pub deep_gw: f64,
}

/// Element water fluxes from the flow solver
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ElementFlows {
    /// Lateral groundwater flow per edge, positive out of the element **\[m³/s\]**
    pub subsurface: [f64; NUM_EDGE],
    /// Unsaturated → groundwater recharge **\[m/s\]**
    pub recharge: f64,
    /// Infiltration **\[m/s\]**
    pub infiltration: f64,
    /// Lateral deep-groundwater flow per edge **\[m³/s\]**
    pub deep_lateral: [f64; NUM_EDGE],
    /// Deep unsaturated → deep groundwater recharge **\[m/s\]**
    pub deep_recharge: f64,
    /// Direct evaporation demand **\[m/s\]**
    pub evaporation: f64,
    /// Transpiration demand **\[m/s\]**
    pub transpiration: f64,
    /// Per-layer transpiration (land-surface-model weighting input) **\[m/s\]**
    pub layer_transpiration: [f64; MAX_SOIL_LAYERS],
}

/// Evaporation / transpiration sources written by the ET partitioner **\[m/s\]**
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EtSources {
    pub evaporation_surface: f64,
    pub evaporation_unsat: f64,
    pub evaporation_gw: f64,
    pub transpiration_unsat: f64,
    pub transpiration_gw: f64,
}

/// One surface/subsurface element
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Plan area **\[m²\]**
    pub area: f64,
    /// Edge lengths **\[m\]**
    pub edges: [f64; NUM_EDGE],
    /// Centroid coordinates **\[m\]**
    pub centroid: [f64; 2],
    pub neighbors: [Neighbor; NUM_EDGE],
    pub soil: SoilProperties,
    /// Deep-zone properties; required when deep zones are enabled
    pub geology: Option<SoilProperties>,
    pub roots: RootZone,
    pub storage: WaterStorage,
    pub flows: ElementFlows,
    pub et: EtSources,
}

impl Element {
    /// Edge that borders river segment `segment`, if any
    pub fn edge_to_river(&self, segment: usize) -> Option<usize> {
        self.neighbors.iter().position(|n| *n == Neighbor::River(segment))
    }
}

/// River segment storages **\[m\]**
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiverStorage {
    /// Bed groundwater height
    pub gw: f64,
    /// Stage
    pub stage: f64,
}

/// One river segment
#[derive(Debug, Clone, PartialEq)]
pub struct RiverSegment {
    /// Centroid coordinates **\[m\]**
    pub centroid: [f64; 2],
    /// Segment length **\[m\]**
    pub length: f64,
    /// Channel width **\[m\]**
    pub width: f64,
    /// Bed porosity **\[-\]**
    pub porosity: f64,
    /// Downstream segment; `None` for an outlet
    pub down: Option<usize>,
    /// Upstream segments: main stem, then tributary
    pub up: [Option<usize>; 2],
    pub left_element: usize,
    pub right_element: usize,
    /// Flow vector, indexed by [`river_flow`] **\[m³/s\]**
    pub flow: [f64; river_flow::COMPONENTS],
    pub storage: RiverStorage,
}

impl RiverSegment {
    pub fn is_outlet(&self) -> bool {
        self.down.is_none()
    }

    /// Whether a tributary joins at this segment's upstream end
    pub fn tributary(&self) -> Option<usize> {
        self.up[1]
    }
}

impl Default for RiverSegment {
    fn default() -> Self {
        Self {
            centroid: [0.0, 0.0],
            length: 100.0,
            width: 5.0,
            porosity: 0.4,
            down: None,
            up: [None, None],
            left_element: 0,
            right_element: 0,
            flow: [0.0; river_flow::COMPONENTS],
            storage: RiverStorage::default(),
        }
    }
}

/// Hydrologic snapshot consumed each coupling step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hydrology {
    pub elements: Vec<Element>,
    pub rivers: Vec<RiverSegment>,
    /// Simulation start time **\[s\]**
    pub start_time: i64,
}

impl Hydrology {
    pub fn new(elements: Vec<Element>, rivers: Vec<RiverSegment>, start_time: i64) -> Self {
        Self { elements, rivers, start_time }
    }

    /// Check every cross-reference
    ///
    /// # Errors
    ///
    /// [`CouplingError::Topology`] when a neighbor or river reference is out
    /// of range, a river's bank element does not border it, or deep zones
    /// are requested without geology.
    pub fn validate(&self, deep_zones: bool) -> Result<()> {
        let ne = self.elements.len();
        let nr = self.rivers.len();

        for (i, elem) in self.elements.iter().enumerate() {
            if !(elem.area > 0.0) {
                return Err(CouplingError::Topology(format!("element {i}: area must be > 0, got {}", elem.area)));
            }
            if !(elem.soil.depth > 0.0) {
                return Err(CouplingError::Topology(format!("element {i}: soil depth must be > 0")));
            }
            if deep_zones && elem.geology.is_none() {
                return Err(CouplingError::Topology(format!(
                    "element {i}: deep zones enabled but no geology properties"
                )));
            }
            for (j, n) in elem.neighbors.iter().enumerate() {
                match *n {
                    Neighbor::Element(k) if k >= ne || k == i => {
                        return Err(CouplingError::Topology(format!("element {i} edge {j}: bad element neighbor {k}")));
                    }
                    Neighbor::River(r) if r >= nr => {
                        return Err(CouplingError::Topology(format!("element {i} edge {j}: bad river neighbor {r}")));
                    }
                    _ => {}
                }
            }
        }

        for (r, seg) in self.rivers.iter().enumerate() {
            let refs = seg.down.iter().chain(seg.up.iter().flatten());
            for &other in refs {
                if other >= nr || other == r {
                    return Err(CouplingError::Topology(format!("river {r}: bad segment reference {other}")));
                }
            }
            for (side, elem) in [("left", seg.left_element), ("right", seg.right_element)] {
                let Some(e) = self.elements.get(elem) else {
                    return Err(CouplingError::Topology(format!("river {r}: {side} element {elem} out of range")));
                };
                if e.edge_to_river(r).is_none() {
                    return Err(CouplingError::Topology(format!(
                        "river {r}: {side} element {elem} has no edge bordering it"
                    )));
                }
            }
            if !(seg.porosity > 0.0) {
                return Err(CouplingError::Topology(format!("river {r}: porosity must be > 0")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_pair() -> Hydrology {
        let left = Element {
            area: 100.0,
            edges: [10.0; 3],
            neighbors: [Neighbor::River(0), Neighbor::None, Neighbor::None],
            ..Default::default()
        };
        let right = Element {
            area: 100.0,
            edges: [10.0; 3],
            neighbors: [Neighbor::None, Neighbor::River(0), Neighbor::None],
            ..Default::default()
        };
        let river = RiverSegment { left_element: 0, right_element: 1, ..Default::default() };
        Hydrology::new(vec![left, right], vec![river], 0)
    }

    #[test]
    fn test_neighbor_from_signed() {
        assert_eq!(Neighbor::from_signed(0), Neighbor::None);
        assert_eq!(Neighbor::from_signed(3), Neighbor::Element(2));
        assert_eq!(Neighbor::from_signed(-1), Neighbor::River(0));
    }

    #[test]
    fn test_edge_to_river() {
        let hydro = bank_pair();
        assert_eq!(hydro.elements[0].edge_to_river(0), Some(0));
        assert_eq!(hydro.elements[1].edge_to_river(0), Some(1));
        assert_eq!(hydro.elements[1].edge_to_river(3), None);
    }

    #[test]
    fn test_validate_ok() {
        assert!(bank_pair().validate(false).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_adjacent_bank() {
        let mut hydro = bank_pair();
        hydro.elements[1].neighbors = [Neighbor::None; 3];
        let err = hydro.validate(false).unwrap_err();
        assert!(err.to_string().contains("right element"));
    }

    #[test]
    fn test_validate_requires_geology_for_deep_zones() {
        assert!(bank_pair().validate(true).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_neighbor() {
        let mut hydro = bank_pair();
        hydro.elements[0].neighbors[2] = Neighbor::Element(9);
        assert!(matches!(hydro.validate(false), Err(CouplingError::Topology(_))));
    }
}

//! Volume store and flux network construction
//!
//! [`CouplingState`] owns the two mutable collections of a run: the
//! control volumes and the flux faces, laid out by [`Layout`]. Everything
//! is allocated once here; afterwards only numeric fields change.
//!
//! # Face topology
//!
//! | Face kind                  | `node_up`        | `node_down`                     | Condition                  |
//! |----------------------------|------------------|---------------------------------|----------------------------|
//! | lateral groundwater        | gw(e)            | gw(n) / river(r) / boundary     | Dispersion / NoFlow        |
//! | lateral unsaturated        | unsat(e)         | unsat(n) / boundary             | Dispersion / NoFlow        |
//! | recharge unsat / gw        | unsat(e) / gw(e) | gw(e) / unsat(e)                | Dispersion                 |
//! | infiltration               | unsat(e)         | precipitation                   | Advection                  |
//! | deep analogues             | deep cells       | deep cells / boundary           | Dispersion / NoFlow        |
//! | left/right surface → river | river(s)         | unsat(bank)                     | Advection                  |
//! | left/right aquifer → river | river(s)         | gw(bank)                        | Dispersion                 |
//! | down / up river            | river(s)         | river(down/up) / boundary       | Advection                  |
//!
//! The up-river face of a confluence also carries the tributary segment as
//! `node_trib`.

use crate::error::{CouplingError, Result};
use crate::models::UnsatEquivalence;
use crate::physics::{
    ControlVolume, Element, FaceCondition, FaceKind, FluxFace, Hydrology, Layout, MIN_STORAGE_HEIGHT, NUM_EDGE, Neighbor,
    SpeciesTable, VolumeGeometry, VolumeId, VolumeKind, Zone,
};

/// Mutable borrows of every volume block at once
pub struct VolumeBlocks<'a> {
    pub groundwater: &'a mut [ControlVolume],
    pub unsaturated: &'a mut [ControlVolume],
    pub deep_groundwater: &'a mut [ControlVolume],
    pub deep_unsaturated: &'a mut [ControlVolume],
    pub river: &'a mut [ControlVolume],
    /// `[precipitation, boundary]`
    pub reservoirs: &'a mut [ControlVolume],
}

/// Control volumes and flux faces of one run
#[derive(Debug, Clone)]
pub struct CouplingState {
    pub layout: Layout,
    pub volumes: Vec<ControlVolume>,
    pub faces: Vec<FluxFace>,
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

impl CouplingState {
    /// Allocate volumes and faces for `hydrology`
    ///
    /// Initial heights come from the snapshot's storages through the same
    /// unsaturated-zone equivalence used every step, so the first step sees
    /// no artificial volume change. Concentrations start at zero.
    ///
    /// # Errors
    ///
    /// Any topology error reported by [`Hydrology::validate`].
    pub fn build(
        hydrology: &Hydrology,
        species: &SpeciesTable,
        deep_zones: bool,
        unsat: &dyn UnsatEquivalence,
    ) -> Result<Self> {
        hydrology.validate(deep_zones)?;

        let layout = Layout::new(hydrology.elements.len(), hydrology.rivers.len(), deep_zones);
        let volumes = Self::build_volumes(&layout, hydrology, species, unsat)?;
        let faces = Self::build_faces(&layout, hydrology);
        debug_assert_eq!(faces.len(), layout.n_faces());

        log::debug!(
            "coupling network: {} volumes, {} faces ({} elements, {} river segments, deep zones {})",
            volumes.len(),
            faces.len(),
            layout.n_elem(),
            layout.n_river(),
            deep_zones
        );

        Ok(Self { layout, volumes, faces })
    }

    fn build_volumes(
        layout: &Layout,
        hydrology: &Hydrology,
        species: &SpeciesTable,
        unsat: &dyn UnsatEquivalence,
    ) -> Result<Vec<ControlVolume>> {
        let n_total = species.n_total();
        let n_sec = species.n_secondary();
        let mut volumes = Vec::with_capacity(layout.n_volumes());

        let cell = |index: usize, kind: VolumeKind, area: f64, height: f64, porosity: f64, saturation: f64| {
            let mut geometry = VolumeGeometry::new(area, height.max(MIN_STORAGE_HEIGHT), porosity);
            geometry.saturation = saturation;
            ControlVolume::new(index, kind, geometry, n_total, n_sec)
        };

        for (e, elem) in hydrology.elements.iter().enumerate() {
            let h = elem.storage.gw;
            volumes.push(cell(e, VolumeKind::Groundwater, elem.area, h, elem.soil.porosity_max, 1.0));
        }
        for (e, elem) in hydrology.elements.iter().enumerate() {
            let s = &elem.storage;
            let heqv = unsat.equivalent_height(&elem.soil, s.unsat, s.gw);
            let satn = unsat.saturation_ratio(elem.soil.depth, s.unsat, s.gw);
            let index = layout.unsaturated(e).index();
            volumes.push(cell(index, VolumeKind::Unsaturated, elem.area, heqv, elem.soil.porosity_max, satn));
        }

        if layout.deep_zones() {
            let geology = |e: usize| {
                hydrology.elements[e]
                    .geology
                    .ok_or_else(|| CouplingError::Topology(format!("element {e}: deep zones enabled but no geology")))
            };
            for (e, elem) in hydrology.elements.iter().enumerate() {
                let geol = geology(e)?;
                let index = layout.zone(Zone::DeepGroundwater).start + e;
                volumes.push(cell(index, VolumeKind::DeepGroundwater, elem.area, elem.storage.deep_gw, geol.porosity_max, 1.0));
            }
            for (e, elem) in hydrology.elements.iter().enumerate() {
                let geol = geology(e)?;
                let s = &elem.storage;
                let heqv = unsat.equivalent_height(&geol, s.deep_unsat, s.deep_gw);
                let satn = unsat.saturation_ratio(geol.depth, s.deep_unsat, s.deep_gw);
                let index = layout.zone(Zone::DeepUnsaturated).start + e;
                volumes.push(cell(index, VolumeKind::DeepUnsaturated, elem.area, heqv, geol.porosity_max, satn));
            }
        }

        for (r, seg) in hydrology.rivers.iter().enumerate() {
            let height = seg.storage.gw.max(MIN_STORAGE_HEIGHT) + seg.storage.stage.max(MIN_STORAGE_HEIGHT) / seg.porosity;
            let index = layout.river(r).index();
            volumes.push(cell(index, VolumeKind::River, seg.length * seg.width, height, seg.porosity, 1.0));
        }

        volumes.push(ControlVolume::reservoir(layout.precipitation().index(), n_total, n_sec));
        volumes.push(ControlVolume::reservoir(layout.boundary().index(), n_total, n_sec));

        debug_assert!(volumes.iter().enumerate().all(|(i, v)| v.index == i));
        Ok(volumes)
    }

    fn build_faces(layout: &Layout, hydrology: &Hydrology) -> Vec<FluxFace> {
        let elements = &hydrology.elements;
        let rivers = &hydrology.rivers;
        let boundary = layout.boundary();
        let mut faces = Vec::with_capacity(layout.n_faces());

        // Neighbor across an edge in a zone without river contact
        let element_target = |zone: fn(&Layout, usize) -> VolumeId| {
            move |n: Neighbor| match n {
                Neighbor::Element(k) => Some((zone(layout, k), elements[k].centroid)),
                _ => None,
            }
        };

        for kind in FaceKind::ALL {
            if layout.faces(kind).is_empty() {
                continue;
            }
            match kind {
                FaceKind::LateralGroundwater => push_lateral(
                    &mut faces,
                    elements,
                    boundary,
                    kind,
                    |e| layout.groundwater(e),
                    |n| match n {
                        Neighbor::Element(k) => Some((layout.groundwater(k), elements[k].centroid)),
                        Neighbor::River(r) => Some((layout.river(r), rivers[r].centroid)),
                        Neighbor::None => None,
                    },
                ),
                FaceKind::LateralUnsaturated => push_lateral(
                    &mut faces,
                    elements,
                    boundary,
                    kind,
                    |e| layout.unsaturated(e),
                    element_target(Layout::unsaturated),
                ),
                FaceKind::LateralDeepGroundwater => push_lateral(
                    &mut faces,
                    elements,
                    boundary,
                    kind,
                    |e| deep_gw(layout, e),
                    element_target(deep_gw),
                ),
                FaceKind::LateralDeepUnsaturated => push_lateral(
                    &mut faces,
                    elements,
                    boundary,
                    kind,
                    |e| deep_unsat(layout, e),
                    element_target(deep_unsat),
                ),
                FaceKind::RechargeUnsaturated | FaceKind::RechargeGroundwater => {
                    for (e, elem) in elements.iter().enumerate() {
                        let (up, down) = if kind == FaceKind::RechargeUnsaturated {
                            (layout.unsaturated(e), layout.groundwater(e))
                        } else {
                            (layout.groundwater(e), layout.unsaturated(e))
                        };
                        faces.push(FluxFace::new(kind, up, down, FaceCondition::Dispersion, 0.5 * elem.soil.depth));
                    }
                }
                FaceKind::DeepRechargeUnsaturated | FaceKind::DeepRechargeGroundwater => {
                    for (e, elem) in elements.iter().enumerate() {
                        let (up, down) = if kind == FaceKind::DeepRechargeUnsaturated {
                            (deep_unsat(layout, e), deep_gw(layout, e))
                        } else {
                            (deep_gw(layout, e), deep_unsat(layout, e))
                        };
                        let depth = elem.geology.map_or(elem.soil.depth, |g| g.depth);
                        faces.push(FluxFace::new(kind, up, down, FaceCondition::Dispersion, 0.5 * depth));
                    }
                }
                FaceKind::Infiltration => {
                    for (e, elem) in elements.iter().enumerate() {
                        faces.push(FluxFace::new(
                            kind,
                            layout.unsaturated(e),
                            layout.precipitation(),
                            FaceCondition::Advection,
                            elem.soil.infiltration_depth,
                        ));
                    }
                }
                FaceKind::LeftSurfaceToRiver
                | FaceKind::RightSurfaceToRiver
                | FaceKind::LeftAquiferToRiver
                | FaceKind::RightAquiferToRiver => {
                    for (s, seg) in rivers.iter().enumerate() {
                        let bank = match kind {
                            FaceKind::LeftSurfaceToRiver | FaceKind::LeftAquiferToRiver => seg.left_element,
                            _ => seg.right_element,
                        };
                        let (down, condition) = match kind {
                            FaceKind::LeftSurfaceToRiver | FaceKind::RightSurfaceToRiver => {
                                (layout.unsaturated(bank), FaceCondition::Advection)
                            }
                            _ => (layout.groundwater(bank), FaceCondition::Dispersion),
                        };
                        let d = distance(seg.centroid, elements[bank].centroid);
                        faces.push(FluxFace::new(kind, layout.river(s), down, condition, d));
                    }
                }
                FaceKind::DownRiverToRiver | FaceKind::UpRiverToRiver => {
                    for (s, seg) in rivers.iter().enumerate() {
                        let other = if kind == FaceKind::DownRiverToRiver { seg.down } else { seg.up[0] };
                        let (down, d) = match other {
                            Some(o) => (layout.river(o), distance(seg.centroid, rivers[o].centroid)),
                            None => (boundary, seg.length),
                        };
                        let mut face = FluxFace::new(kind, layout.river(s), down, FaceCondition::Advection, d);
                        if kind == FaceKind::UpRiverToRiver
                            && let Some(trib) = seg.tributary()
                        {
                            face = face.with_tributary(layout.river(trib));
                        }
                        faces.push(face);
                    }
                }
            }
        }

        faces
    }

    // ======================================== access ========================================

    pub fn volume(&self, id: VolumeId) -> &ControlVolume {
        &self.volumes[id.index()]
    }

    pub fn volume_mut(&mut self, id: VolumeId) -> &mut ControlVolume {
        &mut self.volumes[id.index()]
    }

    /// Faces of one kind
    pub fn face_block(&self, kind: FaceKind) -> &[FluxFace] {
        &self.faces[self.layout.faces(kind)]
    }

    pub fn face_block_mut(&mut self, kind: FaceKind) -> &mut [FluxFace] {
        let range = self.layout.faces(kind);
        &mut self.faces[range]
    }

    /// One volume block
    pub fn zone(&self, zone: Zone) -> &[ControlVolume] {
        &self.volumes[self.layout.zone(zone)]
    }

    /// Split the volume store into its blocks
    pub fn volume_blocks_mut(&mut self) -> VolumeBlocks<'_> {
        let ne = self.layout.n_elem();
        let nd = if self.layout.deep_zones() { ne } else { 0 };
        let nr = self.layout.n_river();

        let (groundwater, rest) = self.volumes.split_at_mut(ne);
        let (unsaturated, rest) = rest.split_at_mut(ne);
        let (deep_groundwater, rest) = rest.split_at_mut(nd);
        let (deep_unsaturated, rest) = rest.split_at_mut(nd);
        let (river, reservoirs) = rest.split_at_mut(nr);

        VolumeBlocks { groundwater, unsaturated, deep_groundwater, deep_unsaturated, river, reservoirs }
    }

    /// Set total and reference concentrations of every volume in a zone
    ///
    /// # Errors
    ///
    /// [`CouplingError::DimensionMismatch`] when `concentrations` does not
    /// hold one value per primary species.
    pub fn set_zone_concentrations(&mut self, zone: Zone, concentrations: &[f64]) -> Result<()> {
        let range = self.layout.zone(zone);
        for cv in &mut self.volumes[range] {
            if concentrations.len() != cv.total.len() {
                return Err(CouplingError::dimension_mismatch("initial concentrations", cv.total.len(), concentrations.len()));
            }
            cv.set_initial(concentrations);
        }
        Ok(())
    }

    /// Set secondary concentrations of every volume in a zone
    pub fn set_zone_secondary(&mut self, zone: Zone, secondary: &[f64]) -> Result<()> {
        let range = self.layout.zone(zone);
        for cv in &mut self.volumes[range] {
            if secondary.len() != cv.secondary.len() {
                return Err(CouplingError::dimension_mismatch("secondary concentrations", cv.secondary.len(), secondary.len()));
            }
            cv.secondary.copy_from_slice(secondary);
        }
        Ok(())
    }
}

/// Lateral faces of one zone; `target` maps a neighbor to the volume across
/// the edge and its centroid, or `None` for a closed edge
fn push_lateral(
    faces: &mut Vec<FluxFace>,
    elements: &[Element],
    boundary: VolumeId,
    kind: FaceKind,
    own: impl Fn(usize) -> VolumeId,
    target: impl Fn(Neighbor) -> Option<(VolumeId, [f64; 2])>,
) {
    for (e, elem) in elements.iter().enumerate() {
        for j in 0..NUM_EDGE {
            let face = match target(elem.neighbors[j]) {
                Some((down, centroid)) => FluxFace::new(
                    kind,
                    own(e),
                    down,
                    FaceCondition::Dispersion,
                    distance(elem.centroid, centroid),
                ),
                None => FluxFace::new(kind, own(e), boundary, FaceCondition::NoFlow, 0.0),
            };
            faces.push(face.with_edge(elem.edges[j]));
        }
    }
}

fn deep_gw(layout: &Layout, e: usize) -> VolumeId {
    VolumeId(layout.zone(Zone::DeepGroundwater).start + e)
}

fn deep_unsat(layout: &Layout, e: usize) -> VolumeId {
    VolumeId(layout.zone(Zone::DeepUnsaturated).start + e)
}

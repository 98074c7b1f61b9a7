//! Stable integer handles for control volumes and flux faces
//!
//! Counts are fixed for the lifetime of a run, so every cross-reference
//! (element → volume, river → face, face → upstream volume) is an index.
//! Volumes and faces are stored in contiguous **blocks** by kind so that a
//! data-parallel pass can borrow exactly the block it writes.
//!
//! # Volume blocks
//!
//! ```text
//! [ groundwater | unsaturated | deep gw* | deep unsat* | river | precipitation | boundary ]
//!   n_elem        n_elem        n_elem     n_elem        n_river   1               1
//! ```
//!
//! # Face blocks
//!
//! ```text
//! [ lat gw (3/elem) | lat unsat (3/elem) | recharge unsat | recharge gw | infiltration |
//!   lat deep gw* | lat deep unsat* | deep recharge unsat* | deep recharge gw* |
//!   left surf | right surf | left aquifer | right aquifer | down river | up river ]
//! ```
//!
//! Blocks marked `*` only exist when deep-bedrock zones are enabled.

use std::ops::Range;

/// Number of edges per (triangular) element
pub const NUM_EDGE: usize = 3;

/// Handle of a control volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(pub usize);

/// Handle of a flux face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub usize);

impl VolumeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl FaceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Volume block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Groundwater,
    Unsaturated,
    DeepGroundwater,
    DeepUnsaturated,
    River,
}

/// Face block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceKind {
    LateralGroundwater,
    LateralUnsaturated,
    RechargeUnsaturated,
    RechargeGroundwater,
    Infiltration,
    LateralDeepGroundwater,
    LateralDeepUnsaturated,
    DeepRechargeUnsaturated,
    DeepRechargeGroundwater,
    LeftSurfaceToRiver,
    RightSurfaceToRiver,
    LeftAquiferToRiver,
    RightAquiferToRiver,
    DownRiverToRiver,
    UpRiverToRiver,
}

impl FaceKind {
    /// Faces per element (3 for lateral kinds, 1 otherwise) or per river segment
    fn multiplicity(self) -> usize {
        match self {
            Self::LateralGroundwater
            | Self::LateralUnsaturated
            | Self::LateralDeepGroundwater
            | Self::LateralDeepUnsaturated => NUM_EDGE,
            _ => 1,
        }
    }

    fn is_deep(self) -> bool {
        matches!(
            self,
            Self::LateralDeepGroundwater
                | Self::LateralDeepUnsaturated
                | Self::DeepRechargeUnsaturated
                | Self::DeepRechargeGroundwater
        )
    }

    fn is_river(self) -> bool {
        matches!(
            self,
            Self::LeftSurfaceToRiver
                | Self::RightSurfaceToRiver
                | Self::LeftAquiferToRiver
                | Self::RightAquiferToRiver
                | Self::DownRiverToRiver
                | Self::UpRiverToRiver
        )
    }

    /// All kinds in storage order
    pub const ALL: [FaceKind; 15] = [
        Self::LateralGroundwater,
        Self::LateralUnsaturated,
        Self::RechargeUnsaturated,
        Self::RechargeGroundwater,
        Self::Infiltration,
        Self::LateralDeepGroundwater,
        Self::LateralDeepUnsaturated,
        Self::DeepRechargeUnsaturated,
        Self::DeepRechargeGroundwater,
        Self::LeftSurfaceToRiver,
        Self::RightSurfaceToRiver,
        Self::LeftAquiferToRiver,
        Self::RightAquiferToRiver,
        Self::DownRiverToRiver,
        Self::UpRiverToRiver,
    ];
}

/// Index layout of the volume store and the flux network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    n_elem: usize,
    n_river: usize,
    deep_zones: bool,
}

impl Layout {
    pub fn new(n_elem: usize, n_river: usize, deep_zones: bool) -> Self {
        Self { n_elem, n_river, deep_zones }
    }

    pub fn n_elem(&self) -> usize {
        self.n_elem
    }

    pub fn n_river(&self) -> usize {
        self.n_river
    }

    pub fn deep_zones(&self) -> bool {
        self.deep_zones
    }

    fn subsurface_zones(&self) -> usize {
        if self.deep_zones { 4 } else { 2 }
    }

    // ======================================== volumes ========================================

    /// Total number of control volumes, including the two virtual reservoirs
    pub fn n_volumes(&self) -> usize {
        self.subsurface_zones() * self.n_elem + self.n_river + 2
    }

    /// Range of a volume block
    ///
    /// Deep zones return an empty range when disabled.
    pub fn zone(&self, zone: Zone) -> Range<usize> {
        let ne = self.n_elem;
        let river_base = self.subsurface_zones() * ne;
        match zone {
            Zone::Groundwater => 0..ne,
            Zone::Unsaturated => ne..2 * ne,
            Zone::DeepGroundwater if self.deep_zones => 2 * ne..3 * ne,
            Zone::DeepUnsaturated if self.deep_zones => 3 * ne..4 * ne,
            Zone::DeepGroundwater | Zone::DeepUnsaturated => river_base..river_base,
            Zone::River => river_base..river_base + self.n_river,
        }
    }

    /// Every volume backed by real geometry (everything but the two reservoirs)
    pub fn physical_volumes(&self) -> Range<usize> {
        0..self.n_volumes() - 2
    }

    pub fn groundwater(&self, elem: usize) -> VolumeId {
        VolumeId(elem)
    }

    pub fn unsaturated(&self, elem: usize) -> VolumeId {
        VolumeId(self.n_elem + elem)
    }

    /// Deep groundwater volume; `None` without deep zones
    pub fn deep_groundwater(&self, elem: usize) -> Option<VolumeId> {
        self.deep_zones.then(|| VolumeId(2 * self.n_elem + elem))
    }

    /// Deep unsaturated volume; `None` without deep zones
    pub fn deep_unsaturated(&self, elem: usize) -> Option<VolumeId> {
        self.deep_zones.then(|| VolumeId(3 * self.n_elem + elem))
    }

    pub fn river(&self, segment: usize) -> VolumeId {
        VolumeId(self.zone(Zone::River).start + segment)
    }

    /// Atmospheric / precipitation reservoir
    pub fn precipitation(&self) -> VolumeId {
        VolumeId(self.n_volumes() - 2)
    }

    /// Domain boundary reservoir
    pub fn boundary(&self) -> VolumeId {
        VolumeId(self.n_volumes() - 1)
    }

    // ========================================= faces =========================================

    fn block_len(&self, kind: FaceKind) -> usize {
        if kind.is_deep() && !self.deep_zones {
            0
        } else if kind.is_river() {
            self.n_river
        } else {
            kind.multiplicity() * self.n_elem
        }
    }

    /// Range of a face block
    pub fn faces(&self, kind: FaceKind) -> Range<usize> {
        let mut start = 0;
        for k in FaceKind::ALL {
            let len = self.block_len(k);
            if k == kind {
                return start..start + len;
            }
            start += len;
        }
        unreachable!("FaceKind::ALL lists every kind")
    }

    /// First index of the river face blocks (all element faces precede it)
    pub fn river_face_base(&self) -> usize {
        self.faces(FaceKind::LeftSurfaceToRiver).start
    }

    /// Total number of faces
    pub fn n_faces(&self) -> usize {
        FaceKind::ALL.iter().map(|&k| self.block_len(k)).sum()
    }

    /// Face of an element-edge kind (`edge` ignored for single-face kinds)
    pub fn element_face(&self, kind: FaceKind, elem: usize, edge: usize) -> FaceId {
        debug_assert!(!kind.is_river(), "{kind:?} is a river face kind");
        let base = self.faces(kind).start;
        FaceId(base + kind.multiplicity() * elem + if kind.multiplicity() > 1 { edge } else { 0 })
    }

    /// Face of a river kind
    pub fn river_face(&self, kind: FaceKind, segment: usize) -> FaceId {
        debug_assert!(kind.is_river(), "{kind:?} is not a river face kind");
        FaceId(self.faces(kind).start + segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_blocks_without_deep_zones() {
        let layout = Layout::new(4, 2, false);
        assert_eq!(layout.n_volumes(), 4 + 4 + 2 + 2);
        assert_eq!(layout.zone(Zone::Groundwater), 0..4);
        assert_eq!(layout.zone(Zone::Unsaturated), 4..8);
        assert_eq!(layout.zone(Zone::River), 8..10);
        assert!(layout.zone(Zone::DeepGroundwater).is_empty());
        assert_eq!(layout.precipitation(), VolumeId(10));
        assert_eq!(layout.boundary(), VolumeId(11));
        assert_eq!(layout.physical_volumes(), 0..10);
        assert!(layout.deep_groundwater(0).is_none());
    }

    #[test]
    fn test_volume_blocks_with_deep_zones() {
        let layout = Layout::new(3, 1, true);
        assert_eq!(layout.zone(Zone::DeepGroundwater), 6..9);
        assert_eq!(layout.zone(Zone::DeepUnsaturated), 9..12);
        assert_eq!(layout.river(0), VolumeId(12));
        assert_eq!(layout.deep_unsaturated(2), Some(VolumeId(11)));
        assert_eq!(layout.n_volumes(), 15);
    }

    #[test]
    fn test_face_blocks_are_contiguous_and_cover_all() {
        for deep in [false, true] {
            let layout = Layout::new(5, 3, deep);
            let mut expected_start = 0;
            for kind in FaceKind::ALL {
                let range = layout.faces(kind);
                assert_eq!(range.start, expected_start, "{kind:?}");
                expected_start = range.end;
            }
            assert_eq!(expected_start, layout.n_faces());
        }
    }

    #[test]
    fn test_face_handles() {
        let layout = Layout::new(2, 1, false);
        assert_eq!(layout.element_face(FaceKind::LateralGroundwater, 1, 2), FaceId(5));
        assert_eq!(layout.element_face(FaceKind::LateralUnsaturated, 0, 0), FaceId(6));
        assert_eq!(layout.element_face(FaceKind::RechargeUnsaturated, 1, 0), FaceId(13));
        assert_eq!(layout.element_face(FaceKind::Infiltration, 0, 0), FaceId(16));
        assert_eq!(layout.river_face_base(), 18);
        assert_eq!(layout.river_face(FaceKind::UpRiverToRiver, 0), FaceId(23));
        assert_eq!(layout.n_faces(), 24);
    }
}

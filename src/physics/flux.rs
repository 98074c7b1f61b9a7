//! Flux faces
//!
//! A flux face is one directed transport pathway out of its upstream
//! (`node_up`) volume. Positive `flux` leaves `node_up` toward `node_down`.
//! Topology and classification are fixed at initialization; the numeric
//! fields are rewritten every coupling step and zeroed at the end of it.

use super::layout::{FaceKind, VolumeId};

/// Area below which `flux / area` is not trusted **\[m²\]**
pub const MIN_FACE_AREA: f64 = 1.0e-4;

/// Velocity substituted when the contact area is degenerate **\[m/s\]**
pub const NEGLIGIBLE_VELOCITY: f64 = 1.0e-10 / 86_400.0;

/// Transport classification of a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceCondition {
    /// Closed; carries nothing
    NoFlow,
    /// Advection plus dispersion; contributes to the stability budget
    Dispersion,
    /// Advection only
    Advection,
}

/// One directed face of the flux network
#[derive(Debug, Clone, PartialEq)]
pub struct FluxFace {
    pub kind: FaceKind,

    /// Volume the face belongs to (flux sign reference)
    pub node_up: VolumeId,

    /// Volume on the other side
    pub node_down: VolumeId,

    /// Tributary volume joining at this face (river confluences only)
    pub node_trib: Option<VolumeId>,

    pub condition: FaceCondition,

    /// Characteristic transport distance **\[m\]**
    pub distance: f64,

    /// Edge length for lateral faces, zero otherwise **\[m\]**
    pub edge: f64,

    /// Volumetric flux, positive leaving `node_up` **\[m³/s\]**
    pub flux: f64,

    /// Contact / cross-sectional area **\[m²\]**
    pub area: f64,

    /// `flux / area` **\[m/s\]**
    pub velocity: f64,

    /// Tributary inflow at a confluence **\[m³/s\]**
    pub flux_trib: f64,
}

impl FluxFace {
    /// New face with zeroed numeric state
    pub fn new(kind: FaceKind, node_up: VolumeId, node_down: VolumeId, condition: FaceCondition, distance: f64) -> Self {
        Self {
            kind,
            node_up,
            node_down,
            node_trib: None,
            condition,
            distance,
            edge: 0.0,
            flux: 0.0,
            area: 0.0,
            velocity: 0.0,
            flux_trib: 0.0,
        }
    }

    /// Builder: set the lateral edge length
    pub fn with_edge(mut self, edge: f64) -> Self {
        self.edge = edge;
        self
    }

    /// Builder: attach a tributary volume
    pub fn with_tributary(mut self, trib: VolumeId) -> Self {
        self.node_trib = Some(trib);
        self
    }

    pub fn is_dispersive(&self) -> bool {
        self.condition == FaceCondition::Dispersion
    }

    /// Set area and derive velocity, substituting [`NEGLIGIBLE_VELOCITY`]
    /// when the area is too small to invert
    pub fn set_area_and_velocity(&mut self, area: f64) {
        self.area = area;
        self.velocity = safe_velocity(self.flux, area);
    }

    /// Zero every per-step numeric field
    pub fn reset(&mut self) {
        self.velocity = 0.0;
        self.flux = 0.0;
        self.flux_trib = 0.0;
        self.area = 0.0;
    }
}

/// `flux / area`, or [`NEGLIGIBLE_VELOCITY`] when `area <= MIN_FACE_AREA`
pub fn safe_velocity(flux: f64, area: f64) -> f64 {
    if area > MIN_FACE_AREA { flux / area } else { NEGLIGIBLE_VELOCITY }
}

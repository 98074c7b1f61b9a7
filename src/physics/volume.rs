//! Control volumes
//!
//! A control volume is one well-mixed chemical reservoir: a groundwater
//! cell, an unsaturated (vadose) cell, a river segment, a deep-bedrock
//! analogue, or one of the two virtual reservoirs (precipitation, domain
//! boundary) that have no real geometry.

use nalgebra::DVector;

/// Minimum height assigned to any storage-backed volume **\[m\]**
pub const MIN_STORAGE_HEIGHT: f64 = 1.0e-5;

/// Kind of control volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    Groundwater,
    Unsaturated,
    DeepGroundwater,
    DeepUnsaturated,
    River,
    /// Precipitation or boundary reservoir; never transported or reacted
    Virtual,
}

impl VolumeKind {
    pub fn is_virtual(self) -> bool {
        self == Self::Virtual
    }
}

/// Geometry and water bookkeeping of a control volume
///
/// `height_o`/`height_t` are the equivalent water heights at the start and
/// end of the current coupling step; `height_int` is the flow solver's own
/// (interpolated) end-of-step height, kept as a cross-check.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumeGeometry {
    /// Plan area **\[m²\]**
    pub area: f64,
    /// Height at start of step **\[m\]**
    pub height_o: f64,
    /// Height at end of step **\[m\]**
    pub height_t: f64,
    /// Flow-solver interpolated end-of-step height **\[m\]**
    pub height_int: f64,
    /// Porosity **\[-\]**
    pub porosity: f64,
    /// Water saturation **\[-\]**
    pub saturation: f64,
    /// Water volume at start of step **\[m³\]**
    pub vol_o: f64,
    /// Water volume at end of step **\[m³\]**
    pub vol: f64,
}

impl VolumeGeometry {
    /// Geometry with the same initial and final height
    pub fn new(area: f64, height: f64, porosity: f64) -> Self {
        let vol = area * height;
        Self {
            area,
            height_o: height,
            height_t: height,
            height_int: height,
            porosity,
            saturation: 1.0,
            vol_o: vol,
            vol,
        }
    }

    /// Average of start and end heights
    pub fn mean_height(&self) -> f64 {
        0.5 * (self.height_o + self.height_t)
    }
}

/// One control volume and its chemical state
#[derive(Debug, Clone)]
pub struct ControlVolume {
    /// Position in the volume store
    pub index: usize,

    pub kind: VolumeKind,

    pub geometry: VolumeGeometry,

    /// Total concentration per primary species (authoritative transport state)
    pub total: DVector<f64>,

    /// Reference concentration per primary species (post-speciation / initial guess)
    pub reference: DVector<f64>,

    /// Secondary-species concentration
    pub secondary: DVector<f64>,

    /// `log10(reference)`, refreshed every coupling step
    pub log_reference: DVector<f64>,

    /// `log10(secondary)`, refreshed every coupling step
    pub log_secondary: DVector<f64>,

    /// Stability budget during accumulation, then the internal step size **\[s\]**
    pub step_size: f64,

    /// Consecutive reaction failures
    pub illness: u32,
}

impl ControlVolume {
    /// Allocate a volume with zeroed chemistry
    pub fn new(index: usize, kind: VolumeKind, geometry: VolumeGeometry, n_total: usize, n_secondary: usize) -> Self {
        Self {
            index,
            kind,
            geometry,
            total: DVector::zeros(n_total),
            reference: DVector::zeros(n_total),
            secondary: DVector::zeros(n_secondary),
            log_reference: DVector::zeros(n_total),
            log_secondary: DVector::zeros(n_secondary),
            step_size: 0.0,
            illness: 0,
        }
    }

    /// Virtual reservoir with no geometry
    pub fn reservoir(index: usize, n_total: usize, n_secondary: usize) -> Self {
        Self::new(index, VolumeKind::Virtual, VolumeGeometry::default(), n_total, n_secondary)
    }

    pub fn is_virtual(&self) -> bool {
        self.kind.is_virtual()
    }

    /// Set total and reference concentrations to the same values
    pub fn set_initial(&mut self, concentrations: &[f64]) {
        debug_assert_eq!(concentrations.len(), self.total.len());
        self.total.copy_from_slice(concentrations);
        self.reference.copy_from_slice(concentrations);
    }

    /// Refresh both log10 caches
    pub fn refresh_log_caches(&mut self) {
        self.log_reference = self.reference.map(f64::log10);
        self.log_secondary = self.secondary.map(f64::log10);
    }

    /// Clamp every total concentration to `floor`
    pub fn isolate(&mut self, floor: f64) {
        self.total.fill(floor);
    }
}

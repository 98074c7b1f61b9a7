//! Mock collaborators for testing
//!
//! Each mock isolates one controller behavior: transport that leaves the
//! totals alone, reaction that never converges or records its interval,
//! and a geometry update that lets the flow and transport heights drift
//! apart.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use rtcouple_rs::models::{GeometryUpdate, ReactionOutcome, ReactionSolver, StorageGeometry, TransportSolver};
use rtcouple_rs::physics::{ControlVolume, FluxFace, SpeciesTable, VolumeGeometry};

// =================================================================================================
// Transport
// =================================================================================================

/// Transport that changes nothing
///
/// With it, any change to the totals across a step comes from the
/// controller's own passes.
#[derive(Debug, Default)]
pub struct IdleTransport;

impl TransportSolver for IdleTransport {
    fn advance(&self, _interval: f64, _faces: &[FluxFace], _volumes: &mut [ControlVolume], _species: &SpeciesTable) {}
}

/// Transport that counts its calls; clones share the counter
#[derive(Debug, Clone, Default)]
pub struct CountingTransport {
    calls: Arc<AtomicUsize>,
}

impl CountingTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl TransportSolver for CountingTransport {
    fn advance(&self, _interval: f64, _faces: &[FluxFace], _volumes: &mut [ControlVolume], _species: &SpeciesTable) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

// =================================================================================================
// Reaction
// =================================================================================================

/// Reaction solver that fails on every call
#[derive(Debug, Default)]
pub struct FailingReaction;

impl ReactionSolver for FailingReaction {
    fn react(&self, _interval: f64, _species: &SpeciesTable, _volume: &mut ControlVolume) -> ReactionOutcome {
        ReactionOutcome::Failed
    }
}

/// Reaction solver that records every interval it is handed; clones share the log
#[derive(Debug, Clone, Default)]
pub struct RecordingReaction {
    intervals: Arc<Mutex<Vec<f64>>>,
}

impl RecordingReaction {
    pub fn intervals(&self) -> Vec<f64> {
        self.intervals.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl ReactionSolver for RecordingReaction {
    fn react(&self, interval: f64, _species: &SpeciesTable, _volume: &mut ControlVolume) -> ReactionOutcome {
        if let Ok(mut log) = self.intervals.lock() {
            log.push(interval);
        }
        ReactionOutcome::Converged
    }
}

// =================================================================================================
// Geometry
// =================================================================================================

/// Geometry update whose interpolated height lags the storage height by `offset`
#[derive(Debug)]
pub struct DriftingGeometry {
    pub offset: f64,
}

impl GeometryUpdate for DriftingGeometry {
    fn update(&self, height: f64, saturation: f64, geometry: &mut VolumeGeometry) {
        StorageGeometry.update(height, saturation, geometry);
        geometry.height_int = height - self.offset;
    }
}

//! Coupling passes
//!
//! This module holds the numerical side of the engine: everything that
//! reads the [`Hydrology`](crate::physics::Hydrology) snapshot and mutates
//! control volumes and flux faces.
//!
//! # Architecture (state vs passes)
//!
//! The crate separates concerns into two layers:
//!
//! 1. **State** ([`crate::physics`]) - WHAT is simulated
//!    - Control volumes, flux faces, species table
//!    - Index layout shared by every pass
//!
//! 2. **Passes** (this module) - HOW a coupling step advances it
//!    - [`flux_mapping`]: flow-solver outputs → faces, geometry, step budgets
//!    - [`controller`]: sorption correction, transport, reaction, speciation
//!    - [`engine`]: owns the state and drives one coupling step
//!
//! # Module Organization
//!
//! - **`network`**: builds the volume store and face topology ([`CouplingState`])
//! - **`flux_mapping`**: the eight ordered mapping sub-passes
//! - **`stability`**: Peclet number and step-budget arithmetic
//! - **`controller`**: the adaptive transport-reaction sequence
//! - **`engine`**: [`CouplingEngine`], the owned context
//!
//! # Workflow Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │ Flow solver     │  (storages + fluxes, external)
//! └────────┬────────┘
//!          │ Hydrology
//! ┌────────▼────────┐
//! │ Flux mapping    │ ← faces, geometry, step budgets
//! └────────┬────────┘
//!          │
//! ┌────────▼──────────────┐
//! │ Transport / reaction  │ ← only after the reaction delay
//! └────────┬──────────────┘
//!          │
//! ┌────────▼────────┐
//! │ Speciation, logs│ ← every step
//! └─────────────────┘
//! ```
//!
//! # Parallel dispatch
//!
//! Every pass is a loop over one disjoint collection (elements, river
//! segments, one face block, one volume block). The loop body receives the
//! item it owns mutably and reads everything else through shared borrows,
//! so the borrow checker enforces the per-pass field ownership. The helpers
//! below pick rayon or a plain loop from the collection size.

// =================================================================================================
// Module Declarations
// =================================================================================================

pub mod controller;
pub mod engine;
pub mod flux_mapping;
pub mod network;
pub mod stability;

// =================================================================================================
// Parallel Execution Threshold
// =================================================================================================
//
// The threshold is stored in an AtomicUsize so that it can be changed at
// runtime (benchmarks and tests) without a mutex on every pass. Relaxed
// ordering is sufficient: the value is a performance hint, not a
// synchronisation point.
// =================================================================================================

use std::sync::atomic::{AtomicUsize, Ordering};

/// Default number of items above which a pass switches to parallel iteration.
///
/// Per-item work in the coupling passes is a handful of flops, so thread
/// dispatch only pays off on fairly large meshes.
const DEFAULT_PARALLEL_THRESHOLD: usize = 999;

/// Runtime-configurable parallel-execution threshold.
static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);

/// Return the current parallel-execution threshold.
///
/// Passes run sequentially when their collection holds at most this many
/// items, and through rayon when it holds more, but only when the crate is
/// compiled with the `parallel` feature.
///
/// # Example
///
/// ```rust
/// use rtcouple_rs::solver::parallel_threshold;
///
/// assert!(parallel_threshold() > 0);
/// ```
pub fn parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

/// Set the parallel-execution threshold to a new value.
///
/// # Panics
///
/// Panics when `threshold == 0`.
///
/// # Example
///
/// ```rust
/// use rtcouple_rs::solver::{parallel_threshold, set_parallel_threshold};
///
/// let previous = parallel_threshold();
/// set_parallel_threshold(2048);
/// assert_eq!(parallel_threshold(), 2048);
/// set_parallel_threshold(previous);
/// ```
pub fn set_parallel_threshold(threshold: usize) {
    assert!(threshold > 0, "parallel threshold must be at least 1");
    PARALLEL_THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// RAII guard that saves the current threshold on construction and restores
/// it on drop.
///
/// Only compiled in test builds.
#[cfg(test)]
pub(crate) struct ThresholdGuard {
    previous: usize,
}

#[cfg(test)]
impl ThresholdGuard {
    pub(crate) fn save(new_value: usize) -> Self {
        let previous = parallel_threshold();
        set_parallel_threshold(new_value);
        Self { previous }
    }
}

#[cfg(test)]
impl Drop for ThresholdGuard {
    fn drop(&mut self) {
        PARALLEL_THRESHOLD.store(self.previous, Ordering::Relaxed);
    }
}

// =================================================================================================
// Dispatch Helpers
// =================================================================================================

/// Apply `f(index, item)` to every item, in parallel above the threshold
pub fn par_for_each_mut<T, F>(items: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    if items.len() > parallel_threshold() {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            items.par_iter_mut().enumerate().for_each(|(i, item)| f(i, item));
            return;
        }
    }
    items.iter_mut().enumerate().for_each(|(i, item)| f(i, item));
}

/// Apply `f(index, a, b)` to paired items of two equally long slices
///
/// # Panics
///
/// Panics when the slices differ in length.
pub fn par_zip_mut<A, B, F>(a: &mut [A], b: &mut [B], f: F)
where
    A: Send,
    B: Send,
    F: Fn(usize, &mut A, &mut B) + Sync + Send,
{
    assert_eq!(a.len(), b.len(), "paired passes need equally long blocks");
    if a.len() > parallel_threshold() {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            a.par_iter_mut()
                .zip(b.par_iter_mut())
                .enumerate()
                .for_each(|(i, (x, y))| f(i, x, y));
            return;
        }
    }
    a.iter_mut().zip(b.iter_mut()).enumerate().for_each(|(i, (x, y))| f(i, x, y));
}

/// Map every item to a value, preserving order
pub fn par_map<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync + Send,
{
    if items.len() > parallel_threshold() {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            return items.par_iter().enumerate().map(|(i, item)| f(i, item)).collect();
        }
    }
    items.iter().enumerate().map(|(i, item)| f(i, item)).collect()
}

// =================================================================================================
// Public Re-exports
// =================================================================================================

pub use controller::ControllerReport;
pub use engine::{CouplingEngine, StepReport, StepTimings};
pub use flux_mapping::{DischargeAccumulator, FluxMapping, MappingReport};
pub use network::{CouplingState, VolumeBlocks};

// =================================================================================================
// Tests
// =================================================================================================

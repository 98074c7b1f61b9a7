//! Companion models around the coupling core
//!
//! The core passes in [`crate::solver`] only move mass between control
//! volumes. Everything they consume from outside lives here:
//!
//! ## [`et`]: evapotranspiration source partitioning
//!
//! Runs before flux mapping in the outer time loop and decides which store
//! supplies evaporation and transpiration for every element.
//!
//! ## [`forcing`]: precipitation concentration series
//!
//! Step-wise time series of rainwater chemistry, looked up without
//! interpolation.
//!
//! ## [`collaborators`]: black-box numerical components
//!
//! Traits for geometry refresh, unsaturated-zone equivalence, transport,
//! batch reaction and speciation, each with a reference implementation.

// =================================================================================================
// Module Declarations
// =================================================================================================

pub mod collaborators;
pub mod et;
pub mod forcing;

// =================================================================================================
// Public Re-exports
// =================================================================================================

pub use collaborators::{
    Collaborators, FirstOrderDecay, FreeIonSpeciation, GeometryUpdate, LinearPartition, NoReaction, ReactionOutcome,
    ReactionSolver, SoilMoistureEquivalence, SpeciationSolver, StorageGeometry, TransportSolver, UnsatEquivalence,
    UpwindTransport,
};
pub use et::{EtPartitioner, EtPolicy, RootLayerWeighting, TranspirationWeighting};
pub use forcing::{ConcentrationSeries, ForcingRecord, PrecipitationForcing, SeriesCursor};

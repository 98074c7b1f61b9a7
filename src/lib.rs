//! rtcouple-rs: Reactive-Transport Coupling Engine
//!
//! Couples a distributed surface/subsurface flow solver with a
//! geochemical transport-reaction solver on an unstructured mesh of
//! triangular land elements and river segments.
//!
//! # Architecture
//!
//! rtcouple-rs is built on two core principles:
//!
//! 1. **Separation of State and Passes**
//!    - [`physics`] holds what is simulated: control volumes, flux faces,
//!      the species table and the flow-solver snapshot
//!    - [`solver`] holds how one coupling step advances it
//!
//! 2. **Pluggable Numerics**
//!    - The transport, reaction and speciation solvers, the geometry
//!      update and the unsaturated-zone equivalence are trait objects
//!      ([`models::Collaborators`]) with simple reference implementations
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rtcouple_rs::prelude::*;
//!
//! let species = SpeciesTable::from_json_str(&std::fs::read_to_string("chem.json")?)?;
//! let config = CouplingConfig::from_path("coupling.json")?;
//! let mut engine = CouplingEngine::new(config, species, &hydrology, Collaborators::default())?;
//!
//! for k in 0..n_steps {
//!     flow_solver.advance(&mut hydrology);
//!     engine.partition_et(&mut hydrology);
//!     engine.step(hydrology.start_time + (k + 1) * 60, 60, &hydrology)?;
//! }
//!
//! CsvExporter::default().export(engine.breakthrough(), engine.species(), "btc.csv".as_ref())?;
//! ```
//!
//! # Modules
//!
//! - [`config`]: run configuration (JSON)
//! - [`error`]: error type
//! - [`physics`]: layout, volumes, faces, species, hydrology contract
//! - [`models`]: ET partitioning, precipitation forcing, collaborator traits
//! - [`solver`]: flux mapping, stability, transport-reaction controller, engine
//! - [`output`]: breakthrough curves and CSV export

pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod physics;
pub mod solver;

pub mod prelude {
    //! Convenient imports for common usage
    //!
    //! ```rust
    //! use rtcouple_rs::prelude::*;
    //! ```
    pub use crate::config::{CouplingConfig, PrecipitationMode};
    pub use crate::error::{CouplingError, Result};
    pub use crate::models::{Collaborators, EtPolicy};
    pub use crate::output::{CsvExporter, Exporter};
    pub use crate::physics::{Hydrology, Species, SpeciesTable, VolumeId, Zone};
    pub use crate::solver::{CouplingEngine, StepReport};
}

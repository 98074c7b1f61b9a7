//! Geochemical data model
//!
//! This module holds the **state** the coupling engine works on, separate
//! from the numerical passes that update it (see [`crate::solver`]):
//!
//! - **Species table** ([`species`]): immutable chemical definitions and
//!   the stoichiometry matrix
//! - **Control volumes** ([`volume`]): well-mixed reservoirs with geometry
//!   and concentration state
//! - **Flux faces** ([`flux`]): directed transport pathways between volumes
//! - **Layout** ([`layout`]): integer handles and the block layout that maps
//!   elements and river segments to volumes and faces
//! - **Hydrology** ([`hydrology`]): the per-step snapshot produced by the
//!   external flow solver
//!
//! # Architecture
//!
//! Control volumes and flux faces refer to each other only through
//! [`VolumeId`]/[`FaceId`] indices. Counts are fixed by the discretization,
//! so nothing is ever removed and no handle is ever invalidated.
//!
//! ```text
//!   Hydrology (flow solver) ──► flux mapping ──► FluxFace[] ─┐
//!                                     │                      ├──► transport / reaction
//!                                     └──────► ControlVolume[] ┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use rtcouple_rs::physics::{Layout, Zone, VolumeId};
//!
//! // 4 elements, 2 river segments, no deep zones
//! let layout = Layout::new(4, 2, false);
//! assert_eq!(layout.zone(Zone::River), 8..10);
//! assert_eq!(layout.precipitation(), VolumeId(10));
//! ```

pub mod flux;
pub mod hydrology;
pub mod layout;
pub mod species;
pub mod volume;

pub use flux::{FaceCondition, FluxFace, MIN_FACE_AREA, NEGLIGIBLE_VELOCITY};
pub use hydrology::{
    Element, ElementFlows, EtSources, Hydrology, MAX_SOIL_LAYERS, Neighbor, RiverSegment, RiverStorage, RootZone,
    SoilProperties, WaterStorage, river_flow,
};
pub use layout::{FaceId, FaceKind, Layout, NUM_EDGE, VolumeId, Zone};
pub use species::{ChemicalClass, ChemistryDefinition, MassAction, Species, SpeciesTable};
pub use volume::{ControlVolume, MIN_STORAGE_HEIGHT, VolumeGeometry, VolumeKind};

//! Common utilities for integration tests

#![allow(dead_code)]

pub mod mock_models;
pub mod test_helpers;

// Re-export commonly used items
pub use mock_models::{CountingTransport, DriftingGeometry, FailingReaction, IdleTransport, RecordingReaction};
pub use test_helpers::{hillslope, river_reach, sorbing_species, tracer_species};

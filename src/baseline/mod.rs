//! Baseline estimation and adaptation.
//!
//! `BaselineCalculator` averages the first frames of a session into the empty-scene
//! reference. `BaselineManager` then owns that reference: it bakes confirmed static
//! reliefs into it and restores it when a baked object is physically removed.

pub mod calculator;
pub mod manager;

pub use calculator::BaselineCalculator;
pub use manager::{BaselineManager, PlacedZone, ZoneRemoval};

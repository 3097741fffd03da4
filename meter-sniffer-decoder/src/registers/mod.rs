//! Register map and plausibility filter
//!
//! This module holds the static register table of the metered device and the
//! per-quantity range checks applied to decoded values.

pub mod map;
pub mod meter;
pub mod plausibility;

// Re-export key types for convenience
pub use map::{
    FloatByteOrder, MapStats, QuantityKind, RegisterDescriptor, RegisterFormat, RegisterMap,
};
pub use plausibility::PlausibilityFilter;

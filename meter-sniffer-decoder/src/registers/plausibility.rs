//! Physical plausibility filter
//!
//! Values outside the band of their quantity kind are replaced with 0.0 and
//! reported, never treated as fatal.

use super::map::RegisterDescriptor;
use crate::config::PlausibilityRanges;
use crate::types::Diagnostic;

/// Range checker built from the configured plausibility bands
#[derive(Debug, Clone, Default)]
pub struct PlausibilityFilter {
    ranges: PlausibilityRanges,
}

impl PlausibilityFilter {
    pub fn new(ranges: PlausibilityRanges) -> Self {
        Self { ranges }
    }

    /// Check a scaled value against the band of its register's quantity kind
    ///
    /// Returns the value to emit and, if it was substituted, the diagnostic.
    pub fn check(&self, descriptor: &RegisterDescriptor, value: f64) -> (f64, Option<Diagnostic>) {
        match self.ranges.for_kind(descriptor.kind) {
            Some(range) if !range.contains(value) => (
                0.0,
                Some(Diagnostic::Implausible {
                    register: descriptor.address,
                    label: descriptor.label.clone(),
                    value,
                    min: range.min,
                    max: range.max,
                }),
            ),
            _ => (value, None),
        }
    }

    pub fn ranges(&self) -> &PlausibilityRanges {
        &self.ranges
    }
}

//! Built-in register table for the three-phase meter
//!
//! The meter answers a single block read with consecutive word-swapped floats
//! starting at 0x2000. Values past the end of this table are still emitted,
//! under generic `Register0x....` names.

use super::map::{QuantityKind, RegisterDescriptor, RegisterMap};
use crate::types::{DecoderError, Result};

/// First register of the measurement block
pub const BLOCK_START: u16 = 0x2000;

const TABLE: &[(&str, &str, QuantityKind)] = &[
    ("Voltage L1", "V", QuantityKind::Voltage),
    ("Voltage L2", "V", QuantityKind::Voltage),
    ("Voltage L3", "V", QuantityKind::Voltage),
    ("Current L1", "A", QuantityKind::Current),
    ("Current L2", "A", QuantityKind::Current),
    ("Current L3", "A", QuantityKind::Current),
    ("Active Power Total", "W", QuantityKind::ActivePower),
    ("Reactive Power Total", "var", QuantityKind::ReactivePower),
    ("Apparent Power Total", "VA", QuantityKind::ApparentPower),
    ("Power Factor Total", "", QuantityKind::PowerFactor),
    ("Frequency", "Hz", QuantityKind::Frequency),
    ("Energy Import", "kWh", QuantityKind::Energy),
    ("Energy Export", "kWh", QuantityKind::Energy),
    ("Reactive Energy", "kvarh", QuantityKind::Energy),
    ("Max Voltage", "V", QuantityKind::Voltage),
    ("Max Current", "A", QuantityKind::Current),
    ("Voltage THD", "%", QuantityKind::Other),
    ("Current THD", "%", QuantityKind::Other),
];

/// Descriptors of the built-in table, `stride` addresses apart
///
/// Fails if the last entry would land past register 0xFFFF.
pub fn descriptors(stride: u16) -> Result<Vec<RegisterDescriptor>> {
    TABLE
        .iter()
        .zip(0u16..)
        .map(|(&(label, unit, kind), index)| {
            let address = index
                .checked_mul(stride)
                .and_then(|offset| BLOCK_START.checked_add(offset))
                .ok_or_else(|| {
                    DecoderError::InvalidRegisterMap(format!(
                        "address stride {} places '{}' past register 0xFFFF",
                        stride, label
                    ))
                })?;
            Ok(RegisterDescriptor::new(address, label, unit, kind))
        })
        .collect()
}

/// Register map of the built-in table with consecutive addresses
pub fn default_map() -> RegisterMap {
    // The table is static and free of duplicates, so construction cannot fail.
    map_with_stride(1).unwrap_or_default()
}

/// Register map of the built-in table with a custom address stride
pub fn map_with_stride(stride: u16) -> Result<RegisterMap> {
    RegisterMap::new(descriptors(stride)?)
}

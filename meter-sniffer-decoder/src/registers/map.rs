//! Register descriptors and the immutable register table
//!
//! The table is built once, validated, and only read afterwards.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::types::{DecoderError, Result};

/// Order of the four bytes of a 32-bit float on the wire
///
/// Letters name the bytes of the standard big-endian IEEE-754 layout `ABCD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FloatByteOrder {
    /// `ABCD`
    BigEndian,
    /// `CDAB`: the two 16-bit words are swapped ("floating inverse")
    #[default]
    WordSwapped,
    /// `DCBA`
    LittleEndian,
    /// `BADC`: bytes swapped inside each word
    ByteSwapped,
}

impl FloatByteOrder {
    /// Rearrange wire bytes into standard big-endian order
    pub fn to_big_endian(self, wire: [u8; 4]) -> [u8; 4] {
        let [a, b, c, d] = wire;
        match self {
            FloatByteOrder::BigEndian => [a, b, c, d],
            FloatByteOrder::WordSwapped => [c, d, a, b],
            FloatByteOrder::LittleEndian => [d, c, b, a],
            FloatByteOrder::ByteSwapped => [b, a, d, c],
        }
    }
}

/// Encoding of one register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisterFormat {
    /// 32-bit IEEE-754 float spread over two 16-bit registers
    Float32 {
        #[serde(default)]
        byte_order: FloatByteOrder,
    },
    /// One unsigned 16-bit register, big-endian
    #[serde(rename = "uint16")]
    UInt16,
    /// One signed 16-bit register, big-endian
    #[serde(rename = "int16")]
    Int16,
}

impl Default for RegisterFormat {
    fn default() -> Self {
        RegisterFormat::Float32 {
            byte_order: FloatByteOrder::WordSwapped,
        }
    }
}

impl RegisterFormat {
    /// Number of payload bytes one value occupies
    pub fn width(&self) -> usize {
        match self {
            RegisterFormat::Float32 { .. } => 4,
            RegisterFormat::UInt16 | RegisterFormat::Int16 => 2,
        }
    }
}

/// Physical quantity measured by a register, selects its plausibility range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Voltage,
    Current,
    ActivePower,
    ReactivePower,
    ApparentPower,
    PowerFactor,
    Frequency,
    Energy,
    #[default]
    Other,
}

/// Static description of one register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    /// Register address
    pub address: u16,
    /// Measurement label used in emitted measurement sets
    pub label: String,
    /// Engineering unit (e.g. "V", "A", "W")
    #[serde(default)]
    pub unit: String,
    /// Factor applied to the decoded raw value
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Quantity kind for plausibility filtering
    #[serde(default)]
    pub kind: QuantityKind,
    /// Wire encoding
    #[serde(default)]
    pub format: RegisterFormat,
}

fn default_scale() -> f64 {
    1.0
}

impl RegisterDescriptor {
    /// Create a word-swapped float descriptor with scale 1.0
    pub fn new(address: u16, label: impl Into<String>, unit: impl Into<String>, kind: QuantityKind) -> Self {
        Self {
            address,
            label: label.into(),
            unit: unit.into(),
            scale: 1.0,
            kind,
            format: RegisterFormat::default(),
        }
    }

    /// Builder method: set the scale factor
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Builder method: set the wire format
    pub fn with_format(mut self, format: RegisterFormat) -> Self {
        self.format = format;
        self
    }
}

/// Immutable register table keyed by address
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    registers: HashMap<u16, RegisterDescriptor>,
}

impl RegisterMap {
    /// Build a register map, rejecting duplicate addresses and unusable scales
    pub fn new(descriptors: Vec<RegisterDescriptor>) -> Result<Self> {
        let mut registers = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !descriptor.scale.is_finite() || descriptor.scale == 0.0 {
                return Err(DecoderError::InvalidRegisterMap(format!(
                    "register 0x{:04X} ({}) has unusable scale {}",
                    descriptor.address, descriptor.label, descriptor.scale
                )));
            }
            if descriptor.label.trim().is_empty() {
                return Err(DecoderError::InvalidRegisterMap(format!(
                    "register 0x{:04X} has an empty label",
                    descriptor.address
                )));
            }
            let address = descriptor.address;
            if let Some(previous) = registers.insert(address, descriptor) {
                return Err(DecoderError::InvalidRegisterMap(format!(
                    "register 0x{:04X} defined twice ('{}')",
                    address, previous.label
                )));
            }
        }
        log::debug!("Register map built with {} registers", registers.len());
        Ok(Self { registers })
    }

    /// Get the descriptor of a register
    pub fn get(&self, address: u16) -> Option<&RegisterDescriptor> {
        self.registers.get(&address)
    }

    /// Label of a register, falling back to a generic name for unknown addresses
    pub fn label(&self, address: u16) -> Cow<'_, str> {
        match self.registers.get(&address) {
            Some(descriptor) => Cow::Borrowed(descriptor.label.as_str()),
            None => Cow::Owned(generic_label(address)),
        }
    }

    /// Wire format of a register (word-swapped float if unknown)
    pub fn format(&self, address: u16) -> RegisterFormat {
        self.registers
            .get(&address)
            .map(|d| d.format)
            .unwrap_or_default()
    }

    /// Descriptors sorted by address
    pub fn descriptors(&self) -> Vec<&RegisterDescriptor> {
        let mut all: Vec<&RegisterDescriptor> = self.registers.values().collect();
        all.sort_unstable_by_key(|d| d.address);
        all
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Get register map statistics
    pub fn stats(&self) -> MapStats {
        MapStats {
            num_registers: self.registers.len(),
            num_range_checked: self
                .registers
                .values()
                .filter(|d| !matches!(d.kind, QuantityKind::Energy | QuantityKind::Other))
                .count(),
        }
    }
}

/// Register map statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapStats {
    /// Total number of register descriptors
    pub num_registers: usize,
    /// Descriptors whose kind has a plausibility range
    pub num_range_checked: usize,
}

/// Name used for registers missing from the map
pub fn generic_label(address: u16) -> String {
    format!("Register0x{:04X}", address)
}

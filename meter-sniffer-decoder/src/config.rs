//! Decoder configuration types
//!
//! Everything the synchronizer needs is passed in here at construction time and
//! never changes afterwards. Device settings (port, baud rate) and output
//! destinations belong to the application layer.

use serde::{Deserialize, Serialize};

use crate::registers::QuantityKind;
use crate::scanner::MAX_FRAME_LEN;
use crate::types::{DecoderError, Result, EXCEPTION_FLAG, READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS};

/// Configuration for the decoder library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Address whose 8-byte read frames are taken as master requests
    #[serde(default = "default_master_address")]
    pub master_address: u8,

    /// Function codes treated as register reads
    #[serde(default = "default_read_functions")]
    pub read_functions: Vec<u8>,

    /// Maximum number of unconsumed bytes kept (at least two full frames)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Start register assumed for responses with no pending request
    #[serde(default = "default_start_register")]
    pub default_start_register: u16,

    /// Also accept CRC trailers transmitted high byte first
    #[serde(default = "default_true")]
    pub accept_big_endian_crc: bool,

    /// Payload bytes implied by one counted register of a request
    #[serde(default = "default_bytes_per_register")]
    pub bytes_per_register: usize,

    /// Register address increment between consecutive decoded values
    #[serde(default = "default_address_stride")]
    pub address_stride: u16,

    /// Ignore pending requests older than this (default: never expire)
    #[serde(default)]
    pub pending_timeout_ms: Option<u64>,

    /// Drop incomplete frames that are still buffered when the line goes idle
    #[serde(default = "default_true")]
    pub idle_flush: bool,

    /// Physical range checks per quantity kind
    #[serde(default)]
    pub plausibility: PlausibilityRanges,

    /// How many warnings of one kind are logged before further ones are suppressed
    #[serde(default = "default_max_warnings")]
    pub max_repeated_warnings: usize,
}

fn default_master_address() -> u8 {
    0x01
}

fn default_read_functions() -> Vec<u8> {
    vec![READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS]
}

fn default_buffer_capacity() -> usize {
    4096
}

fn default_start_register() -> u16 {
    0x2000
}

fn default_true() -> bool {
    true
}

fn default_bytes_per_register() -> usize {
    4
}

fn default_address_stride() -> u16 {
    1
}

fn default_max_warnings() -> usize {
    20
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            master_address: default_master_address(),
            read_functions: default_read_functions(),
            buffer_capacity: default_buffer_capacity(),
            default_start_register: default_start_register(),
            accept_big_endian_crc: true,
            bytes_per_register: default_bytes_per_register(),
            address_stride: default_address_stride(),
            pending_timeout_ms: None,
            idle_flush: true,
            plausibility: PlausibilityRanges::default(),
            max_repeated_warnings: default_max_warnings(),
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the master address
    pub fn with_master_address(mut self, address: u8) -> Self {
        self.master_address = address;
        self
    }

    /// Builder method: set the buffer capacity
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Builder method: set the start register used for uncorrelated responses
    pub fn with_default_start_register(mut self, register: u16) -> Self {
        self.default_start_register = register;
        self
    }

    /// Builder method: enable or disable the high-byte-first CRC fallback
    pub fn with_big_endian_crc(mut self, enabled: bool) -> Self {
        self.accept_big_endian_crc = enabled;
        self
    }

    /// Builder method: expire pending requests after `timeout_ms`
    pub fn with_pending_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.pending_timeout_ms = Some(timeout_ms);
        self
    }

    /// Builder method: set the register address stride
    pub fn with_address_stride(mut self, stride: u16) -> Self {
        self.address_stride = stride;
        self
    }

    /// Builder method: enable or disable idle flushing
    pub fn with_idle_flush(mut self, enabled: bool) -> Self {
        self.idle_flush = enabled;
        self
    }

    /// Builder method: replace the plausibility ranges
    pub fn with_plausibility(mut self, ranges: PlausibilityRanges) -> Self {
        self.plausibility = ranges;
        self
    }

    /// Reject settings the synchronizer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity < 2 * MAX_FRAME_LEN {
            return Err(DecoderError::InvalidConfig(format!(
                "buffer_capacity {} must hold at least two full RTU frames ({} bytes)",
                self.buffer_capacity,
                2 * MAX_FRAME_LEN
            )));
        }
        if self.read_functions.is_empty() {
            return Err(DecoderError::InvalidConfig(
                "read_functions must not be empty".to_string(),
            ));
        }
        if let Some(code) = self
            .read_functions
            .iter()
            .find(|&&code| code == 0 || code & EXCEPTION_FLAG != 0)
        {
            return Err(DecoderError::InvalidConfig(format!(
                "0x{:02X} is not a valid read function code",
                code
            )));
        }
        if self.bytes_per_register == 0 {
            return Err(DecoderError::InvalidConfig(
                "bytes_per_register must be at least 1".to_string(),
            ));
        }
        if self.address_stride == 0 {
            return Err(DecoderError::InvalidConfig(
                "address_stride must be at least 1".to_string(),
            ));
        }
        self.plausibility.validate()
    }
}

/// Inclusive physical range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Plausibility bands per quantity kind
///
/// Energy counters and unclassified registers are never range checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlausibilityRanges {
    pub voltage: Range,
    pub current: Range,
    pub active_power: Range,
    pub reactive_power: Range,
    pub apparent_power: Range,
    pub power_factor: Range,
    pub frequency: Range,
}

impl Default for PlausibilityRanges {
    fn default() -> Self {
        Self {
            voltage: Range::new(0.0, 500.0),
            current: Range::new(0.0, 100.0),
            active_power: Range::new(-50_000.0, 50_000.0),
            reactive_power: Range::new(-50_000.0, 50_000.0),
            apparent_power: Range::new(-50_000.0, 50_000.0),
            power_factor: Range::new(-1.0, 1.0),
            frequency: Range::new(45.0, 65.0),
        }
    }
}

impl PlausibilityRanges {
    /// Range that applies to a quantity kind, if any
    pub fn for_kind(&self, kind: QuantityKind) -> Option<Range> {
        match kind {
            QuantityKind::Voltage => Some(self.voltage),
            QuantityKind::Current => Some(self.current),
            QuantityKind::ActivePower => Some(self.active_power),
            QuantityKind::ReactivePower => Some(self.reactive_power),
            QuantityKind::ApparentPower => Some(self.apparent_power),
            QuantityKind::PowerFactor => Some(self.power_factor),
            QuantityKind::Frequency => Some(self.frequency),
            QuantityKind::Energy | QuantityKind::Other => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let named = [
            ("voltage", self.voltage),
            ("current", self.current),
            ("active_power", self.active_power),
            ("reactive_power", self.reactive_power),
            ("apparent_power", self.apparent_power),
            ("power_factor", self.power_factor),
            ("frequency", self.frequency),
        ];
        for (name, range) in named {
            if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
                return Err(DecoderError::InvalidConfig(format!(
                    "plausibility range '{}' is invalid: [{}, {}]",
                    name, range.min, range.max
                )));
            }
        }
        Ok(())
    }
}

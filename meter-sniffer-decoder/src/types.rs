//! Core types for the meter sniffer decoder library
//!
//! This module defines the frames the synchronizer extracts from the byte stream,
//! the events it emits, and the diagnostics it reports. Recoverable data problems
//! (CRC mismatches, implausible values, ...) are never errors: they are reported
//! as [`Diagnostic`] values while decoding continues.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

use crate::crc::CrcOrder;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Modbus function code: Read Holding Registers
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
/// Modbus function code: Read Input Registers
pub const READ_INPUT_REGISTERS: u8 = 0x04;
/// Modbus function code: Write Multiple Registers
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
/// High bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Errors that can occur while driving the decoder
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Buffer underflow: cannot consume {requested} bytes, only {available} buffered")]
    BufferUnderflow { requested: usize, available: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid register map: {0}")]
    InvalidRegisterMap(String),

    #[error("Sink delivery failed: {0}")]
    SinkError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A CRC-validated Modbus RTU frame
///
/// Owns a copy of its bytes, so it outlives the buffer region it was cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Slave (or master) address byte
    pub address: u8,
    /// Function code byte, including the exception flag if set
    pub function: u8,
    /// Everything between the function code and the CRC trailer
    pub payload: Vec<u8>,
    /// Always true: frames are only constructed after CRC validation
    pub crc_ok: bool,
    /// Byte order in which the trailing CRC matched
    pub crc_order: CrcOrder,
    /// Complete frame bytes, CRC included
    pub raw: Vec<u8>,
}

impl ParsedFrame {
    /// Total frame length in bytes, CRC included
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// True if the frame carries no bytes (never the case for a scanned frame)
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// True if the function code carries the exception flag
    pub fn is_exception(&self) -> bool {
        self.function & EXCEPTION_FLAG != 0
    }

    /// Lower-case hex rendering of the raw frame
    pub fn hex(&self) -> String {
        hex(&self.raw)
    }
}

/// Classification of a validated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Master asks for `register_count` registers starting at `start_register`
    ReadRequest {
        start_register: u16,
        register_count: u16,
    },
    /// Slave answers with `byte_count` payload bytes
    ReadResponse { byte_count: u8 },
    /// Slave refuses the request
    ExceptionResponse { exception_code: u8 },
    /// Master writes registers (observed, not decoded)
    WriteRequest {
        start_register: u16,
        register_count: u16,
    },
    /// Slave acknowledges a register write
    WriteAck {
        start_register: u16,
        register_count: u16,
    },
}

/// Main decoded event type - the primary output of the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// A read request was observed and is now the pending request
    Request {
        timestamp: Timestamp,
        address: u8,
        function: u8,
        start_register: u16,
        register_count: u16,
    },

    /// A read response was decoded into physical values
    Measurements(MeasurementSet),

    /// The slave answered with an exception; the pending request was cleared
    ExceptionResponse {
        timestamp: Timestamp,
        address: u8,
        function: u8,
        exception_code: u8,
    },

    /// A register write (request or acknowledgement) was observed
    Write {
        timestamp: Timestamp,
        address: u8,
        start_register: u16,
        register_count: u16,
        acknowledged: bool,
    },
}

impl DecodedEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DecodedEvent::Request { timestamp, .. } => *timestamp,
            DecodedEvent::Measurements(set) => set.timestamp,
            DecodedEvent::ExceptionResponse { timestamp, .. } => *timestamp,
            DecodedEvent::Write { timestamp, .. } => *timestamp,
        }
    }

    /// Get the bus address of the frame behind this event
    pub fn address(&self) -> u8 {
        match self {
            DecodedEvent::Request { address, .. } => *address,
            DecodedEvent::Measurements(set) => set.slave_address,
            DecodedEvent::ExceptionResponse { address, .. } => *address,
            DecodedEvent::Write { address, .. } => *address,
        }
    }
}

/// A single labelled, scaled and filtered register value
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Register address the value was read from
    pub register: u16,
    /// Label from the register map (or a generic `Register0x....` name)
    pub label: String,
    /// Engineering unit (e.g. "V", "A", "Hz"), empty if unknown
    pub unit: String,
    /// Physical value after scaling, rounding and plausibility filtering
    pub value: f64,
}

/// All values decoded from one response, stamped with the decode time
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSet {
    pub timestamp: Timestamp,
    /// Address of the answering slave
    pub slave_address: u8,
    /// Start register the payload was interpreted from
    pub start_register: u16,
    /// False if no pending request matched and the default start register was used
    pub correlated: bool,
    /// Readings in payload order
    pub readings: Vec<Reading>,
}

impl MeasurementSet {
    /// Label → value mapping
    pub fn values(&self) -> BTreeMap<&str, f64> {
        self.readings
            .iter()
            .map(|r| (r.label.as_str(), r.value))
            .collect()
    }

    /// Look up a value by label
    pub fn get(&self, label: &str) -> Option<f64> {
        self.readings
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.value)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// JSON object of label → value plus a `timestamp` field (RFC 3339, milliseconds)
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(
            "timestamp".to_string(),
            serde_json::Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        for reading in &self.readings {
            let value = serde_json::Number::from_f64(reading.value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
            object.insert(reading.label.clone(), value);
        }
        serde_json::Value::Object(object)
    }
}

/// Recoverable condition observed while decoding
///
/// None of these stop the decoder. They are logged and handed out through
/// [`crate::Decoder::take_diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A structurally plausible frame start failed CRC validation
    CrcMismatch {
        offset: usize,
        address: u8,
        function: u8,
    },
    /// Response byte count differs from what the pending request implies
    LengthMismatch {
        start_register: u16,
        expected: usize,
        actual: usize,
    },
    /// A register could not be decoded to a finite, sane number
    DecodeFailure { register: u16, label: String },
    /// A decoded value was outside its physical range and replaced with 0.0
    Implausible {
        register: u16,
        label: String,
        value: f64,
        min: f64,
        max: f64,
    },
    /// The buffer saturated and the oldest bytes were evicted
    BufferOverflow { discarded: usize, capacity: usize },
    /// An incomplete frame went stale during an idle period and was dropped
    StaleFrameDiscarded { discarded: usize },
    /// A sink failed to accept a measurement set
    SinkFailure { sink: String, reason: String },
}

impl Diagnostic {
    /// Short stable name of the diagnostic kind
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::CrcMismatch { .. } => "crc_mismatch",
            Diagnostic::LengthMismatch { .. } => "length_mismatch",
            Diagnostic::DecodeFailure { .. } => "decode_failure",
            Diagnostic::Implausible { .. } => "implausible",
            Diagnostic::BufferOverflow { .. } => "buffer_overflow",
            Diagnostic::StaleFrameDiscarded { .. } => "stale_frame",
            Diagnostic::SinkFailure { .. } => "sink_failure",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::CrcMismatch {
                offset,
                address,
                function,
            } => write!(
                f,
                "CRC mismatch at offset {} (address {}, function 0x{:02X})",
                offset, address, function
            ),
            Diagnostic::LengthMismatch {
                start_register,
                expected,
                actual,
            } => write!(
                f,
                "Response for register 0x{:04X} has {} bytes, request implied {}",
                start_register, actual, expected
            ),
            Diagnostic::DecodeFailure { register, label } => write!(
                f,
                "Register 0x{:04X} ({}) did not decode to a sane value, using 0.0",
                register, label
            ),
            Diagnostic::Implausible {
                register,
                label,
                value,
                min,
                max,
            } => write!(
                f,
                "{} (0x{:04X}) = {} outside [{}, {}], using 0.0",
                label, register, value, min, max
            ),
            Diagnostic::BufferOverflow {
                discarded,
                capacity,
            } => write!(
                f,
                "Buffer saturated (capacity {}), evicted {} oldest bytes",
                capacity, discarded
            ),
            Diagnostic::StaleFrameDiscarded { discarded } => {
                write!(f, "Discarded {} stale bytes after idle period", discarded)
            }
            Diagnostic::SinkFailure { sink, reason } => {
                write!(f, "Sink '{}' failed: {}", sink, reason)
            }
        }
    }
}

/// Human readable name of a Modbus function code
pub fn function_name(code: u8) -> &'static str {
    match code & !EXCEPTION_FLAG {
        0x01 => "Read Coils",
        0x02 => "Read Discrete Inputs",
        0x03 => "Read Holding Registers",
        0x04 => "Read Input Registers",
        0x05 => "Write Single Coil",
        0x06 => "Write Single Register",
        0x0F => "Write Multiple Coils",
        0x10 => "Write Multiple Registers",
        _ => "Unknown",
    }
}

/// Lower-case hex rendering of a byte slice
pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

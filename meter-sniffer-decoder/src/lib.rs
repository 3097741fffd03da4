//! Meter Sniffer Decoder Library
//!
//! A passive Modbus RTU frame synchronizer for a three-phase power meter. It
//! listens to the serial traffic between a master and the meter, recovers frame
//! boundaries from a noisy byte stream, and decodes read responses into
//! labelled, scaled measurement sets.
//!
//! # Architecture
//!
//! Bytes flow through a fixed pipeline:
//! - [`scanner`] finds the earliest CRC-valid frame in the buffered bytes
//! - [`frame`] classifies it as request, response, exception or write
//! - [`correlator`] pairs responses with the preceding read request
//! - [`register_decoder`] turns the payload into values using the [`registers`] map
//! - [`emitter`] hands measurement sets to the configured sinks
//!
//! The library never transmits on the bus and never talks to a device directly.
//! Serial ports, output formats and brokers are in the application layer
//! (meter-sniffer-cli) behind the [`ByteSource`] and [`MeasurementSink`] traits.
//!
//! # Example Usage
//!
//! ```no_run
//! use meter_sniffer_decoder::{registers::meter, DecodedEvent, Decoder, DecoderConfig};
//!
//! let config = DecoderConfig::new()
//!     .with_master_address(0x01)
//!     .with_pending_timeout_ms(1000);
//! let mut decoder = Decoder::new(config, meter::default_map()).unwrap();
//!
//! decoder.push_bytes(&[0x01, 0x03, 0x20, 0x00, 0x00, 0x12, 0xCE, 0x07]);
//! for event in decoder.decode_available(chrono::Utc::now()) {
//!     if let DecodedEvent::Measurements(set) = event {
//!         println!("{}", set.to_json());
//!     }
//! }
//!
//! for diagnostic in decoder.take_diagnostics() {
//!     eprintln!("{}", diagnostic);
//! }
//! ```

// Public modules
pub mod buffer;
pub mod config;
pub mod correlator;
pub mod crc;
pub mod decoder;
pub mod emitter;
pub mod frame;
pub mod pipeline;
pub mod register_decoder;
pub mod registers;
pub mod scanner;
pub mod source;
pub mod types;

// Re-export main types for convenience
pub use config::{DecoderConfig, PlausibilityRanges, Range};
pub use decoder::{Decoder, DecoderStats};
pub use emitter::{Emitter, MeasurementSink};
pub use pipeline::{Pipeline, PipelineSettings, PipelineSummary};
pub use registers::{QuantityKind, RegisterDescriptor, RegisterFormat, RegisterMap};
pub use source::{ByteSource, ReplaySource};
pub use types::{
    DecodedEvent, DecoderError, Diagnostic, FrameKind, MeasurementSet, ParsedFrame, Reading,
    Result, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

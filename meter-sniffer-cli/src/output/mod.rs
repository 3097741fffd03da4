//! Measurement sinks
//!
//! Each sink implements [`meter_sniffer_decoder::MeasurementSink`] and is
//! registered with the emitter from the `[output]` and `[mqtt]` sections.

pub mod console;
pub mod csv;
pub mod mqtt;

pub use self::console::ConsoleSink;
pub use self::csv::CsvSink;
pub use self::mqtt::MqttSink;

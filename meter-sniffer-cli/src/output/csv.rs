//! CSV export, one row per measurement set
//!
//! The column set is fixed from the register map when the sink is created,
//! so rows of partial reads line up with full ones. Values for registers
//! outside the map are not exported.

use anyhow::Context;
use chrono::SecondsFormat;
use meter_sniffer_decoder::{DecoderError, MeasurementSet, MeasurementSink, RegisterMap, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub struct CsvSink<W: Write> {
    writer: ::csv::Writer<W>,
    columns: Vec<String>,
    header_written: bool,
}

impl CsvSink<File> {
    /// Create (or truncate) a CSV file
    pub fn create(path: &Path, register_map: &RegisterMap) -> anyhow::Result<Self> {
        let writer = ::csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
        log::info!("Writing measurements to {:?}", path);
        Ok(Self::with_writer(writer, register_map))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, register_map: &RegisterMap) -> Self {
        Self::with_writer(::csv::Writer::from_writer(writer), register_map)
    }

    fn with_writer(writer: ::csv::Writer<W>, register_map: &RegisterMap) -> Self {
        let columns = register_map
            .descriptors()
            .into_iter()
            .map(|d| d.label.clone())
            .collect();
        Self {
            writer,
            columns,
            header_written: false,
        }
    }

    fn write_header(&mut self) -> std::result::Result<(), ::csv::Error> {
        let mut header = vec!["timestamp", "slave_address", "start_register"];
        header.extend(self.columns.iter().map(String::as_str));
        self.writer.write_record(&header)
    }
}

impl<W: Write> MeasurementSink for CsvSink<W> {
    fn name(&self) -> &str {
        "csv"
    }

    fn publish(&mut self, set: &MeasurementSet) -> Result<()> {
        if !self.header_written {
            self.write_header().map_err(sink_error)?;
            self.header_written = true;
        }

        let values = set.values();
        let mut record = vec![
            set.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            set.slave_address.to_string(),
            format!("0x{:04X}", set.start_register),
        ];
        record.extend(
            self.columns
                .iter()
                .map(|label| values.get(label.as_str()).map(f64::to_string).unwrap_or_default()),
        );

        self.writer.write_record(&record).map_err(sink_error)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn sink_error(e: ::csv::Error) -> DecoderError {
    DecoderError::SinkError(format!("CSV write failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use meter_sniffer_decoder::registers::meter;
    use meter_sniffer_decoder::{QuantityKind, Reading, RegisterDescriptor};

    fn reading(register: u16, label: &str, value: f64) -> Reading {
        Reading {
            register,
            label: label.to_string(),
            unit: "V".to_string(),
            value,
        }
    }

    fn set(readings: Vec<Reading>) -> MeasurementSet {
        MeasurementSet {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            slave_address: 5,
            start_register: 0x2000,
            correlated: true,
            readings,
        }
    }

    #[test]
    fn test_header_once_and_fixed_columns() {
        let map = RegisterMap::new(vec![
            RegisterDescriptor::new(0x2000, "Voltage L1", "V", QuantityKind::Voltage),
            RegisterDescriptor::new(0x2001, "Voltage L2", "V", QuantityKind::Voltage),
        ])
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path, &map).unwrap();

        sink.publish(&set(vec![reading(0x2000, "Voltage L1", 230.7), reading(0x2001, "Voltage L2", 231.0)]))
            .unwrap();
        sink.publish(&set(vec![
            reading(0x2001, "Voltage L2", 229.5),
            reading(0x2002, "Register0x2002", 1.0),
        ]))
        .unwrap();
        sink.flush().unwrap();
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,slave_address,start_register,Voltage L1,Voltage L2");
        assert_eq!(lines[1], "2023-11-14T22:13:20.000Z,5,0x2000,230.7,231");
        assert_eq!(lines[2], "2023-11-14T22:13:20.000Z,5,0x2000,,229.5");
    }

    #[test]
    fn test_default_map_columns() {
        let sink = CsvSink::new(Vec::new(), &meter::default_map());
        assert_eq!(sink.columns.len(), 18);
        assert_eq!(sink.columns[0], "Voltage L1");
        assert_eq!(sink.columns[17], "Current THD");
    }
}

//! Human readable measurement output

use chrono::SecondsFormat;
use meter_sniffer_decoder::{MeasurementSet, MeasurementSink, Result};
use std::io::{self, Write};

pub struct ConsoleSink<W: Write> {
    writer: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MeasurementSink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn publish(&mut self, set: &MeasurementSet) -> Result<()> {
        writeln!(
            self.writer,
            "[{}] slave {} from 0x{:04X}{}",
            set.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            set.slave_address,
            set.start_register,
            if set.correlated { "" } else { " (assumed start)" }
        )?;

        let width = set.readings.iter().map(|r| r.label.len()).max().unwrap_or(0);
        for reading in &set.readings {
            let line = format!("  {:<width$}: {} {}", reading.label, reading.value, reading.unit, width = width);
            writeln!(self.writer, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

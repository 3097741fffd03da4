//! Serial device byte source

use anyhow::{anyhow, bail, Context, Result};
use meter_sniffer_decoder::ByteSource;
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read};
use std::time::Duration;

use crate::config::{ParityConfig, SerialConfig};

/// Read-only view of a serial port
///
/// [`ByteSource::close`] releases the device; reads after that fail.
pub struct SerialSource {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    timeout: Duration,
}

impl SerialSource {
    /// Open `port_name` with the line settings from `config`
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.read_timeout_ms);
        log::info!(
            "Opening serial port {} at {} baud ({}{}{})",
            port_name,
            config.baud_rate,
            config.data_bits,
            parity_letter(config.parity),
            config.stop_bits
        );

        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(data_bits(config.data_bits)?)
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits)?)
            .timeout(timeout)
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        Ok(Self::from_port(port, port_name, timeout))
    }

    fn from_port(port: Box<dyn SerialPort>, name: &str, timeout: Duration) -> Self {
        Self {
            port: Some(port),
            name: name.to_string(),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ByteSource for SerialSource {
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> meter_sniffer_decoder::Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("serial port {} is closed", self.name))
        })?;
        if timeout != self.timeout {
            port.set_timeout(timeout).map_err(io::Error::from)?;
            self.timeout = timeout;
        }

        let mut buf = vec![0u8; max_bytes];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                log::trace!("Read {} bytes from {}", n, self.name);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> meter_sniffer_decoder::Result<()> {
        if let Some(port) = self.port.take() {
            log::info!("Closing serial port {}", self.name);
            drop(port);
        }
        Ok(())
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    Ok(match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        other => bail!("Unsupported data bits: {}", other),
    })
}

fn stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(anyhow!("Unsupported stop bits: {}", other)),
    }
}

fn parity(parity: ParityConfig) -> Parity {
    match parity {
        ParityConfig::None => Parity::None,
        ParityConfig::Even => Parity::Even,
        ParityConfig::Odd => Parity::Odd,
    }
}

fn parity_letter(parity: ParityConfig) -> char {
    match parity {
        ParityConfig::None => 'N',
        ParityConfig::Even => 'E',
        ParityConfig::Odd => 'O',
    }
}

//! Frame scanner
//!
//! Finds the earliest offset in the buffered bytes where a structurally
//! plausible, CRC-valid Modbus RTU frame starts. RTU has no delimiters, so
//! every offset is tried in turn: read the `(address, function)` pair, derive
//! the candidate frame length(s) from the frame shape, and check the CRC.
//! A failing offset just advances by one byte, which bounds the scan to one
//! pass over the buffer.

use crate::config::DecoderConfig;
use crate::crc::{self, CrcOrder};
use crate::types::{EXCEPTION_FLAG, WRITE_MULTIPLE_REGISTERS};

/// Read request: address, function, start (2), count (2), CRC (2)
pub const REQUEST_LEN: usize = 8;
/// Exception response: address, function|0x80, code, CRC (2)
pub const EXCEPTION_LEN: usize = 5;
/// Response bytes besides the payload: address, function, byte count, CRC (2)
pub const RESPONSE_OVERHEAD: usize = 5;
/// Write Multiple Registers request bytes besides the payload
pub const WRITE_REQUEST_OVERHEAD: usize = 9;
/// Largest RTU frame
pub const MAX_FRAME_LEN: usize = 256;

/// A CRC-valid frame located in the buffer
///
/// Borrows the buffer, so it cannot outlive the next mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFrame<'a> {
    /// Offset of the first frame byte in the scanned slice
    pub start: usize,
    /// Frame bytes, CRC included
    pub bytes: &'a [u8],
    /// Byte order the CRC matched in
    pub crc_order: CrcOrder,
}

impl CandidateFrame<'_> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset one past the last frame byte
    pub fn end(&self) -> usize {
        self.start + self.bytes.len()
    }
}

/// Result of scanning a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome<'a> {
    /// Earliest complete, CRC-valid frame
    Found(CandidateFrame<'a>),
    /// No complete frame; the earliest plausible start needs more bytes
    Incomplete { start: usize },
    /// No offset can start a frame
    NotFound,
}

/// A shape-valid candidate whose CRC did not match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcMiss {
    pub offset: usize,
    pub address: u8,
    pub function: u8,
}

/// Outcome of one scan plus the CRC misses seen on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport<'a> {
    pub outcome: ScanOutcome<'a>,
    pub crc_misses: Vec<CrcMiss>,
}

/// What the bytes at one offset could be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// Not a frame start of this shape
    None,
    /// A frame of this many bytes
    Length(usize),
    /// The length field is not buffered yet
    NeedMore,
}

/// Stateless frame scanner
#[derive(Debug, Clone)]
pub struct FrameScanner {
    master_address: u8,
    read_functions: Vec<u8>,
    accept_big_endian_crc: bool,
}

impl FrameScanner {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            master_address: config.master_address,
            read_functions: config.read_functions.clone(),
            accept_big_endian_crc: config.accept_big_endian_crc,
        }
    }

    /// Scan `data` for the earliest CRC-valid frame
    pub fn scan<'a>(&self, data: &'a [u8]) -> ScanReport<'a> {
        let mut crc_misses = Vec::new();
        let mut incomplete: Option<usize> = None;

        for start in 0..data.len().saturating_sub(1) {
            let window = &data[start..];
            for probe in self.probe(window) {
                match probe {
                    Probe::None => {}
                    Probe::NeedMore => {
                        incomplete.get_or_insert(start);
                    }
                    Probe::Length(len) if len > window.len() => {
                        incomplete.get_or_insert(start);
                    }
                    Probe::Length(len) => {
                        let bytes = &window[..len];
                        match crc::validate_with(bytes, self.accept_big_endian_crc) {
                            Some(crc_order) => {
                                return ScanReport {
                                    outcome: ScanOutcome::Found(CandidateFrame {
                                        start,
                                        bytes,
                                        crc_order,
                                    }),
                                    crc_misses,
                                };
                            }
                            None => {
                                log::trace!("CRC mismatch for {}-byte candidate at offset {}", len, start);
                                crc_misses.push(CrcMiss {
                                    offset: start,
                                    address: window[0],
                                    function: window[1],
                                });
                            }
                        }
                    }
                }
            }
        }

        let outcome = match incomplete {
            Some(start) => ScanOutcome::Incomplete { start },
            None => ScanOutcome::NotFound,
        };
        ScanReport { outcome, crc_misses }
    }

    /// Candidate frame lengths for a window starting at a presumed frame start
    ///
    /// Requests are tried before responses. The two can never have the same
    /// length because response payloads are whole 32-bit registers.
    fn probe(&self, window: &[u8]) -> [Probe; 2] {
        let address = window[0];
        let function = window[1];
        let from_master = address == self.master_address;

        if self.read_functions.contains(&function) {
            let request = if from_master {
                Probe::Length(REQUEST_LEN)
            } else {
                Probe::None
            };
            let response = match window.get(2) {
                None => Probe::NeedMore,
                Some(&byte_count) if is_plausible_byte_count(byte_count) => {
                    Probe::Length(RESPONSE_OVERHEAD + usize::from(byte_count))
                }
                Some(_) => Probe::None,
            };
            [request, response]
        } else if function == WRITE_MULTIPLE_REGISTERS {
            let request = match (from_master, window.get(6)) {
                (false, _) => Probe::None,
                (true, None) => Probe::NeedMore,
                (true, Some(&byte_count)) if byte_count > 0 && byte_count % 2 == 0 => {
                    Probe::Length(WRITE_REQUEST_OVERHEAD + usize::from(byte_count))
                }
                (true, Some(_)) => Probe::None,
            };
            [request, Probe::Length(REQUEST_LEN)]
        } else if function & EXCEPTION_FLAG != 0 && self.is_known_function(function & !EXCEPTION_FLAG) {
            [Probe::Length(EXCEPTION_LEN), Probe::None]
        } else {
            [Probe::None, Probe::None]
        }
    }

    fn is_known_function(&self, function: u8) -> bool {
        function == WRITE_MULTIPLE_REGISTERS || self.read_functions.contains(&function)
    }
}

/// Response byte counts are non-zero whole 32-bit registers within one RTU frame
fn is_plausible_byte_count(byte_count: u8) -> bool {
    byte_count > 0 && byte_count % 4 == 0 && usize::from(byte_count) + RESPONSE_OVERHEAD <= MAX_FRAME_LEN
}

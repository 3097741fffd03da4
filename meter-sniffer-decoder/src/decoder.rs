//! Main decoder API
//!
//! This module provides the stream synchronizer: the [`Decoder`] owns the byte
//! buffer and the request/response correlator, and turns pushed bytes into
//! [`DecodedEvent`]s one frame at a time.
//!
//! Per frame the cycle is: scan → CRC check → classify → correlate →
//! decode registers → filter → emit, after which the frame and any noise in
//! front of it are consumed from the buffer.

use std::collections::{HashMap, VecDeque};

use crate::buffer::ByteBuffer;
use crate::config::DecoderConfig;
use crate::correlator::{Correlator, PendingRequest};
use crate::frame::FrameClassifier;
use crate::register_decoder::RegisterDecoder;
use crate::registers::{meter, PlausibilityFilter, RegisterMap};
use crate::scanner::{CrcMiss, FrameScanner, ScanOutcome};
use crate::types::{
    function_name, DecodedEvent, Diagnostic, FrameKind, MeasurementSet, ParsedFrame, Result, Timestamp,
};

/// Diagnostics kept for [`Decoder::take_diagnostics`] before the oldest are dropped
pub const MAX_QUEUED_DIAGNOSTICS: usize = 1024;

/// The stream decoder - entry point for all decoding operations
pub struct Decoder {
    config: DecoderConfig,
    register_map: RegisterMap,
    filter: PlausibilityFilter,
    scanner: FrameScanner,
    buffer: ByteBuffer,
    correlator: Correlator,
    diagnostics: VecDeque<Diagnostic>,
    warnings: WarningLimiter,
    stats: DecoderStats,
}

/// Next step after scanning the buffer
enum Step {
    /// A frame was found after `skipped` bytes of noise and ends at `end`
    Frame {
        frame: ParsedFrame,
        skipped: usize,
        end: usize,
    },
    /// No complete frame; the first `discard` bytes can never start one
    Wait { discard: usize },
}

impl Decoder {
    /// Create a decoder from a validated configuration and register map
    pub fn new(config: DecoderConfig, register_map: RegisterMap) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Decoder ready: master address {}, {} registers, buffer {} bytes",
            config.master_address,
            register_map.len(),
            config.buffer_capacity
        );
        Ok(Self::build(config, register_map))
    }

    /// Create a decoder with the default configuration and the built-in meter map
    pub fn with_defaults() -> Self {
        Self::build(DecoderConfig::default(), meter::default_map())
    }

    fn build(config: DecoderConfig, register_map: RegisterMap) -> Self {
        Self {
            filter: PlausibilityFilter::new(config.plausibility.clone()),
            scanner: FrameScanner::new(&config),
            buffer: ByteBuffer::new(config.buffer_capacity),
            correlator: Correlator::new(
                config.default_start_register,
                config.bytes_per_register,
                config.pending_timeout_ms,
            ),
            diagnostics: VecDeque::new(),
            warnings: WarningLimiter::new(config.max_repeated_warnings),
            stats: DecoderStats::default(),
            register_map,
            config,
        }
    }

    /// Append received bytes to the buffer
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.stats.bytes_received += bytes.len();
        let evicted = self.buffer.append(bytes);
        if evicted > 0 {
            self.stats.bytes_discarded += evicted;
            self.stats.buffer_overflows += 1;
            self.report(Diagnostic::BufferOverflow {
                discarded: evicted,
                capacity: self.buffer.capacity(),
            });
        }
    }

    /// Decode the next frame in the buffer
    ///
    /// Returns `None` when the buffer holds no complete frame; push more bytes
    /// (or call [`Decoder::flush_idle`]) and try again.
    pub fn next_event(&mut self, now: Timestamp) -> Option<DecodedEvent> {
        loop {
            let (step, crc_misses) = self.scan();

            let limit = match &step {
                Step::Frame { skipped, .. } => *skipped,
                Step::Wait { discard } => *discard,
            };
            self.report_crc_misses(crc_misses, limit);

            match step {
                Step::Frame {
                    frame,
                    skipped,
                    end,
                } => {
                    if skipped > 0 {
                        log::debug!("Resynchronized after skipping {} bytes", skipped);
                        self.stats.bytes_discarded += skipped;
                    }
                    self.consume(end);
                    if let Some(event) = self.handle_frame(frame, now) {
                        return Some(event);
                    }
                }
                Step::Wait { discard } => {
                    if discard > 0 {
                        log::trace!("Dropping {} bytes that cannot start a frame", discard);
                        self.stats.bytes_discarded += discard;
                        self.consume(discard);
                    }
                    self.enforce_half_capacity();
                    return None;
                }
            }
        }
    }

    /// Decode every complete frame currently buffered
    pub fn decode_available(&mut self, now: Timestamp) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event(now) {
            events.push(event);
        }
        events
    }

    /// Drop incomplete frames after the line went quiet
    ///
    /// A frame still incomplete once no more bytes arrive can never complete.
    /// Its first byte is dropped and the buffer rescanned until nothing
    /// incomplete remains. Returns the number of bytes discarded.
    pub fn flush_idle(&mut self) -> usize {
        if !self.config.idle_flush {
            return 0;
        }

        let mut discarded = 0;
        loop {
            let start = match self.scanner.scan(self.buffer.as_slice()).outcome {
                ScanOutcome::Incomplete { start } => start,
                ScanOutcome::Found(_) | ScanOutcome::NotFound => break,
            };
            self.consume(start + 1);
            discarded += start + 1;
        }

        if discarded > 0 {
            self.stats.bytes_discarded += discarded;
            self.report(Diagnostic::StaleFrameDiscarded { discarded });
        }
        discarded
    }

    /// Take all diagnostics recorded since the last call
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain(..).collect()
    }

    /// Get decoding statistics
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Number of bytes waiting in the buffer
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The request currently waiting for its response
    pub fn pending_request(&self) -> Option<&PendingRequest> {
        self.correlator.pending()
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.register_map
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Scan the buffer and copy out whatever the next step needs
    fn scan(&self) -> (Step, Vec<CrcMiss>) {
        let report = self.scanner.scan(self.buffer.as_slice());
        let step = match report.outcome {
            ScanOutcome::Found(candidate) => Step::Frame {
                frame: ParsedFrame::from_candidate(&candidate),
                skipped: candidate.start,
                end: candidate.end(),
            },
            ScanOutcome::Incomplete { start } => Step::Wait { discard: start },
            // Only the last byte could still be an address byte
            ScanOutcome::NotFound => Step::Wait {
                discard: self.buffer.len().saturating_sub(1),
            },
        };
        (step, report.crc_misses)
    }

    /// Report CRC misses in the region about to be consumed
    ///
    /// Misses further on are seen again by the next scan.
    fn report_crc_misses(&mut self, misses: Vec<CrcMiss>, limit: usize) {
        for miss in misses.into_iter().filter(|miss| miss.offset < limit) {
            self.stats.crc_mismatches += 1;
            self.report(Diagnostic::CrcMismatch {
                offset: miss.offset,
                address: miss.address,
                function: miss.function,
            });
        }
    }

    fn consume(&mut self, n: usize) {
        if let Err(e) = self.buffer.consume(n) {
            log::error!("Decoder consumed past the buffer end, resetting: {}", e);
            self.buffer.clear();
        }
    }

    /// Evict the oldest half if the buffer is still more than half full without a frame
    fn enforce_half_capacity(&mut self) {
        if self.buffer.len() > self.buffer.capacity() / 2 {
            let discarded = self.buffer.evict_oldest_half();
            self.stats.bytes_discarded += discarded;
            self.stats.buffer_overflows += 1;
            self.report(Diagnostic::BufferOverflow {
                discarded,
                capacity: self.buffer.capacity(),
            });
        }
    }

    /// Classify a validated frame and produce its event
    fn handle_frame(&mut self, frame: ParsedFrame, now: Timestamp) -> Option<DecodedEvent> {
        let kind = FrameClassifier::classify(&frame, self.config.master_address, &self.config.read_functions);
        log::debug!(
            "Frame from address {} ({}, {} bytes): {}",
            frame.address,
            function_name(frame.function),
            frame.len(),
            frame.hex()
        );

        match kind {
            Some(FrameKind::ReadRequest {
                start_register,
                register_count,
            }) => {
                self.stats.requests += 1;
                self.correlator.on_request(PendingRequest {
                    address: frame.address,
                    function: frame.function,
                    start_register,
                    register_count,
                    created_at: now,
                });
                Some(DecodedEvent::Request {
                    timestamp: now,
                    address: frame.address,
                    function: frame.function,
                    start_register,
                    register_count,
                })
            }
            Some(FrameKind::ReadResponse { .. }) => {
                self.stats.responses += 1;
                Some(DecodedEvent::Measurements(self.decode_response(&frame, now)))
            }
            Some(FrameKind::ExceptionResponse { exception_code }) => {
                self.stats.exception_responses += 1;
                if let Some(request) = self.correlator.on_exception() {
                    log::info!(
                        "Slave {} rejected read of 0x{:04X} x{} with exception {}",
                        frame.address,
                        request.start_register,
                        request.register_count,
                        exception_code
                    );
                }
                Some(DecodedEvent::ExceptionResponse {
                    timestamp: now,
                    address: frame.address,
                    function: frame.function,
                    exception_code,
                })
            }
            Some(FrameKind::WriteRequest {
                start_register,
                register_count,
            }) => {
                self.stats.write_frames += 1;
                Some(DecodedEvent::Write {
                    timestamp: now,
                    address: frame.address,
                    start_register,
                    register_count,
                    acknowledged: false,
                })
            }
            Some(FrameKind::WriteAck {
                start_register,
                register_count,
            }) => {
                self.stats.write_frames += 1;
                Some(DecodedEvent::Write {
                    timestamp: now,
                    address: frame.address,
                    start_register,
                    register_count,
                    acknowledged: true,
                })
            }
            None => {
                log::debug!("Ignoring unclassified frame {}", frame.hex());
                None
            }
        }
    }

    /// Correlate a read response with the pending request and decode its registers
    fn decode_response(&mut self, frame: &ParsedFrame, now: Timestamp) -> MeasurementSet {
        let data = frame.register_data();
        let correlation = self.correlator.on_response(frame.function, now);

        if let Some(expected) = correlation.expected_bytes.filter(|_| correlation.length_mismatch(data.len())) {
            self.report(Diagnostic::LengthMismatch {
                start_register: correlation.start_register,
                expected,
                actual: data.len(),
            });
        }

        let mut diagnostics = Vec::new();
        let readings = RegisterDecoder::new(&self.register_map, &self.filter, self.config.address_stride)
            .decode_payload(data, correlation.start_register, &mut diagnostics);
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }

        self.stats.measurement_sets += 1;
        log::debug!(
            "Decoded {} values from 0x{:04X}{}",
            readings.len(),
            correlation.start_register,
            if correlation.is_correlated() { "" } else { " (uncorrelated)" }
        );

        MeasurementSet {
            timestamp: now,
            slave_address: frame.address,
            start_register: correlation.start_register,
            correlated: correlation.is_correlated(),
            readings,
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.warnings.log(&diagnostic);
        if self.diagnostics.len() == MAX_QUEUED_DIAGNOSTICS {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(diagnostic);
    }
}

/// Decoding statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Bytes pushed into the decoder
    pub bytes_received: usize,
    /// Bytes dropped as noise, stale or overflow
    pub bytes_discarded: usize,
    pub requests: usize,
    pub responses: usize,
    pub exception_responses: usize,
    pub write_frames: usize,
    pub crc_mismatches: usize,
    pub buffer_overflows: usize,
    /// Measurement sets produced
    pub measurement_sets: usize,
}

/// Logs diagnostics, suppressing floods of the same kind
struct WarningLimiter {
    max: usize,
    counts: HashMap<&'static str, usize>,
}

impl WarningLimiter {
    fn new(max: usize) -> Self {
        Self {
            max,
            counts: HashMap::new(),
        }
    }

    fn log(&mut self, diagnostic: &Diagnostic) {
        // CRC misses are routine while hunting for frame boundaries in noise
        if matches!(diagnostic, Diagnostic::CrcMismatch { .. }) {
            log::debug!("{}", diagnostic);
            return;
        }

        let count = self.counts.entry(diagnostic.kind()).or_insert(0);
        *count += 1;
        if *count <= self.max {
            log::warn!("{}", diagnostic);
        } else if *count == self.max + 1 {
            log::warn!("... suppressing further '{}' warnings", diagnostic.kind());
        } else {
            log::debug!("{}", diagnostic);
        }
    }
}

//! Acquisition loop
//!
//! Drives a [`ByteSource`] through the [`Decoder`] and hands measurement sets
//! to the [`Emitter`] until the source runs dry, a measurement limit is hit or
//! shutdown is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::decoder::{Decoder, DecoderStats};
use crate::emitter::Emitter;
use crate::source::ByteSource;
use crate::types::{DecodedEvent, Result};

/// Read loop settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bytes requested per read
    pub read_size: usize,
    /// How long one read may block
    pub read_timeout: Duration,
    /// Stop after this many measurement sets
    pub max_measurements: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            read_size: 256,
            read_timeout: Duration::from_millis(100),
            max_measurements: None,
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub stats: DecoderStats,
    pub measurement_sets: usize,
    /// Diagnostics raised by the decoder and emitter
    pub diagnostics: usize,
    pub sink_failures: usize,
}

pub struct Pipeline<S: ByteSource> {
    source: S,
    decoder: Decoder,
    emitter: Emitter,
    settings: PipelineSettings,
    shutdown: Arc<AtomicBool>,
}

impl<S: ByteSource> Pipeline<S> {
    pub fn new(source: S, decoder: Decoder, emitter: Emitter, settings: PipelineSettings) -> Self {
        Self {
            source,
            decoder,
            emitter,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`Pipeline::run`] after the current read when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Run until the source is exhausted, the limit is reached or shutdown is requested
    ///
    /// Only source errors end the run early; everything the decoder or sinks
    /// report is counted in the summary.
    pub fn run(&mut self) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary::default();
        let result = self.run_loop(&mut summary);

        self.emitter.flush();
        if let Err(e) = self.source.close() {
            log::warn!("Failed to close byte source: {}", e);
        }

        summary.stats = self.decoder.stats();
        summary.sink_failures = self.emitter.failures();
        log::info!(
            "Acquisition finished: {} bytes, {} measurement sets, {} diagnostics",
            summary.stats.bytes_received,
            summary.measurement_sets,
            summary.diagnostics
        );
        result.map(|()| summary)
    }

    fn run_loop(&mut self, summary: &mut PipelineSummary) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            let bytes = self.source.read(self.settings.read_size, self.settings.read_timeout)?;

            if bytes.is_empty() {
                self.decoder.flush_idle();
                summary.diagnostics += self.decoder.take_diagnostics().len();
                if self.source.is_exhausted() {
                    log::debug!("Byte source exhausted");
                    break;
                }
                continue;
            }

            self.decoder.push_bytes(&bytes);
            while let Some(event) = self.decoder.next_event(Utc::now()) {
                if let DecodedEvent::Measurements(set) = event {
                    summary.measurement_sets += 1;
                    summary.diagnostics += self.emitter.emit(&set).len();
                    if self.limit_reached(summary.measurement_sets) {
                        summary.diagnostics += self.decoder.take_diagnostics().len();
                        log::info!("Reached measurement limit of {}", summary.measurement_sets);
                        return Ok(());
                    }
                }
            }
            summary.diagnostics += self.decoder.take_diagnostics().len();
        }
        Ok(())
    }

    fn limit_reached(&self, measurement_sets: usize) -> bool {
        self.settings
            .max_measurements
            .map_or(false, |max| measurement_sets >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::with_crc;
    use crate::emitter::MeasurementSink;
    use crate::source::ReplaySource;
    use crate::types::MeasurementSet;
    use std::sync::Mutex;

    struct CollectingSink {
        sets: Arc<Mutex<Vec<MeasurementSet>>>,
    }

    impl MeasurementSink for CollectingSink {
        fn name(&self) -> &str {
            "collect"
        }

        fn publish(&mut self, set: &MeasurementSet) -> Result<()> {
            self.sets.lock().unwrap().push(set.clone());
            Ok(())
        }
    }

    fn capture() -> Vec<u8> {
        let mut data = vec![0xFF, 0x00];
        data.extend(with_crc(&[0x01, 0x03, 0x20, 0x00, 0x00, 0x01]));
        data.extend(with_crc(&[0x05, 0x03, 0x04, 0xB3, 0x33, 0x43, 0x66]));
        data.extend(with_crc(&[0x01, 0x03, 0x20, 0x0A, 0x00, 0x01]));
        // Frequency 50.0
        data.extend(with_crc(&[0x05, 0x03, 0x04, 0x00, 0x00, 0x42, 0x48]));
        data
    }

    fn pipeline(data: Vec<u8>, chunk: usize, settings: PipelineSettings) -> (Pipeline<ReplaySource>, Arc<Mutex<Vec<MeasurementSet>>>) {
        let sets = Arc::new(Mutex::new(Vec::new()));
        let emitter = Emitter::new().with_sink(Box::new(CollectingSink { sets: Arc::clone(&sets) }));
        let pipeline = Pipeline::new(
            ReplaySource::new(data, chunk),
            Decoder::with_defaults(),
            emitter,
            settings,
        );
        (pipeline, sets)
    }

    #[test]
    fn test_replay_to_sink() {
        let (mut pipeline, sets) = pipeline(capture(), 3, PipelineSettings::default());
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.measurement_sets, 2);
        assert_eq!(summary.sink_failures, 0);
        assert_eq!(summary.stats.requests, 2);

        let sets = sets.lock().unwrap();
        assert_eq!(sets[0].get("Voltage L1"), Some(230.7));
        assert_eq!(sets[1].get("Frequency"), Some(50.0));
        assert!(sets.iter().all(|set| set.correlated));
    }

    #[test]
    fn test_measurement_limit() {
        let settings = PipelineSettings {
            max_measurements: Some(1),
            ..PipelineSettings::default()
        };
        let (mut pipeline, sets) = pipeline(capture(), 64, settings);
        let summary = pipeline.run().unwrap();
        assert_eq!(summary.measurement_sets, 1);
        assert_eq!(sets.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_shutdown_before_run() {
        let (mut pipeline, sets) = pipeline(capture(), 64, PipelineSettings::default());
        pipeline.shutdown_handle().store(true, Ordering::Relaxed);
        let summary = pipeline.run().unwrap();
        assert_eq!(summary.measurement_sets, 0);
        assert!(sets.lock().unwrap().is_empty());
    }
}

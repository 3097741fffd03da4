//! Measurement emitter
//!
//! Hands each measurement set to every configured sink. Delivery failures are
//! logged and reported as diagnostics; they never stop decoding and nothing
//! is retried here.

use crate::types::{Diagnostic, MeasurementSet, Result};

/// Downstream consumer of measurement sets (console, file, message broker...)
pub trait MeasurementSink {
    /// Short name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Deliver one measurement set
    fn publish(&mut self, set: &MeasurementSet) -> Result<()>;

    /// Flush buffered output on shutdown
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fan-out of measurement sets to sinks
#[derive(Default)]
pub struct Emitter {
    sinks: Vec<Box<dyn MeasurementSink>>,
    delivered: usize,
    failures: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a sink
    pub fn with_sink(mut self, sink: Box<dyn MeasurementSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn MeasurementSink>) {
        self.sinks.push(sink);
    }

    /// Publish to every sink, returning one diagnostic per failed sink
    pub fn emit(&mut self, set: &MeasurementSet) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for sink in &mut self.sinks {
            match sink.publish(set) {
                Ok(()) => self.delivered += 1,
                Err(e) => {
                    self.failures += 1;
                    log::warn!("Sink '{}' failed to publish measurement set: {}", sink.name(), e);
                    diagnostics.push(Diagnostic::SinkFailure {
                        sink: sink.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        diagnostics
    }

    /// Flush every sink; failures are logged only
    pub fn flush(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                log::warn!("Sink '{}' failed to flush: {}", sink.name(), e);
            }
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Successful deliveries (one per sink per set)
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecoderError;
    use chrono::Utc;

    struct CountingSink {
        count: usize,
    }

    impl MeasurementSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        fn publish(&mut self, _set: &MeasurementSet) -> Result<()> {
            self.count += 1;
            Ok(())
        }
    }

    struct BrokenSink;

    impl MeasurementSink for BrokenSink {
        fn name(&self) -> &str {
            "broken"
        }

        fn publish(&mut self, _set: &MeasurementSet) -> Result<()> {
            Err(DecoderError::SinkError("broker unreachable".to_string()))
        }
    }

    fn empty_set() -> MeasurementSet {
        MeasurementSet {
            timestamp: Utc::now(),
            slave_address: 1,
            start_register: 0x2000,
            correlated: false,
            readings: Vec::new(),
        }
    }

    #[test]
    fn test_failure_does_not_block_other_sinks() {
        let mut emitter = Emitter::new()
            .with_sink(Box::new(BrokenSink))
            .with_sink(Box::new(CountingSink { count: 0 }));

        let diagnostics = emitter.emit(&empty_set());
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(&diagnostics[0], Diagnostic::SinkFailure { sink, .. } if sink == "broken"));
        assert_eq!(emitter.delivered(), 1);
        assert_eq!(emitter.failures(), 1);

        emitter.emit(&empty_set());
        assert_eq!(emitter.delivered(), 2);
    }

    #[test]
    fn test_no_sinks() {
        let mut emitter = Emitter::new();
        assert!(emitter.emit(&empty_set()).is_empty());
        assert_eq!(emitter.sink_count(), 0);
    }
}

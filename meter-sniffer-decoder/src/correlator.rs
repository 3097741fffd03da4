//! Request/response correlation
//!
//! The bus is half-duplex with one outstanding request, so the correlator
//! keeps at most one [`PendingRequest`]. A newer request replaces it, a
//! response or exception consumes it.

use chrono::Duration;

use crate::types::Timestamp;

/// The most recent read request still waiting for its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// Address the request frame carried
    pub address: u8,
    pub function: u8,
    pub start_register: u16,
    pub register_count: u16,
    pub created_at: Timestamp,
}

/// How a response payload is to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    /// Register of the first value in the payload
    pub start_register: u16,
    /// Payload length implied by the request, if one matched
    pub expected_bytes: Option<usize>,
    /// The request this response answers, if any
    pub request: Option<PendingRequest>,
}

impl Correlation {
    pub fn is_correlated(&self) -> bool {
        self.request.is_some()
    }

    /// True if a request matched and implied a different payload length
    pub fn length_mismatch(&self, actual_bytes: usize) -> bool {
        self.expected_bytes
            .map_or(false, |expected| expected != actual_bytes)
    }
}

/// Single-slot request/response correlator
#[derive(Debug, Clone)]
pub struct Correlator {
    pending: Option<PendingRequest>,
    default_start_register: u16,
    bytes_per_register: usize,
    timeout: Option<Duration>,
}

impl Correlator {
    pub fn new(default_start_register: u16, bytes_per_register: usize, timeout_ms: Option<u64>) -> Self {
        Self {
            pending: None,
            default_start_register,
            bytes_per_register,
            // Timeouts beyond what a Duration can hold never expire
            timeout: timeout_ms
                .and_then(|ms| i64::try_from(ms).ok())
                .and_then(Duration::try_milliseconds),
        }
    }

    /// Record a new request, returning the one it superseded
    pub fn on_request(&mut self, request: PendingRequest) -> Option<PendingRequest> {
        let superseded = self.pending.replace(request);
        if let Some(old) = &superseded {
            log::debug!(
                "Request for 0x{:04X} x{} superseded before any response",
                old.start_register,
                old.register_count
            );
        }
        superseded
    }

    /// Consume the pending request for a response to `function`
    ///
    /// Falls back to the default start register when nothing usable is
    /// pending: no request, a request with another function code, or one
    /// older than the configured timeout.
    pub fn on_response(&mut self, function: u8, now: Timestamp) -> Correlation {
        let request = self.pending.take().filter(|request| {
            if request.function != function {
                log::debug!(
                    "Response function 0x{:02X} does not match pending request function 0x{:02X}",
                    function,
                    request.function
                );
                return false;
            }
            match self.timeout {
                Some(timeout) if now - request.created_at > timeout => {
                    log::debug!(
                        "Pending request for 0x{:04X} expired after {} ms",
                        request.start_register,
                        (now - request.created_at).num_milliseconds()
                    );
                    false
                }
                _ => true,
            }
        });

        match request {
            Some(request) => Correlation {
                start_register: request.start_register,
                expected_bytes: Some(usize::from(request.register_count) * self.bytes_per_register),
                request: Some(request),
            },
            None => Correlation {
                start_register: self.default_start_register,
                expected_bytes: None,
                request: None,
            },
        }
    }

    /// Clear the pending request after an exception response
    pub fn on_exception(&mut self) -> Option<PendingRequest> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }
}

//! Byte-stream sources
//!
//! The decoder only needs bounded, timed reads. Device sources live in the
//! application layer; the in-memory [`ReplaySource`] replays captured traffic.

use std::time::Duration;

use crate::types::Result;

/// Supplier of raw serial bytes
pub trait ByteSource {
    /// Read up to `max_bytes`, waiting at most `timeout`
    ///
    /// An empty result means the timeout passed without data.
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// True once the source can never produce more bytes
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Release the underlying device
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Replays a byte capture in fixed-size chunks
#[derive(Debug, Clone)]
pub struct ReplaySource {
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
}

impl ReplaySource {
    /// Replay `data`, at most `chunk_size` bytes per read (minimum 1)
    pub fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            data,
            position: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl ByteSource for ReplaySource {
    fn read(&mut self, max_bytes: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let take = self.remaining().min(max_bytes).min(self.chunk_size);
        let chunk = self.data[self.position..self.position + take].to_vec();
        self.position += take;
        Ok(chunk)
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.data.len()
    }
}

//! Bounded accumulator of unconsumed input bytes

use crate::types::{DecoderError, Result};

/// Append-only byte buffer with a hard capacity
///
/// Appending past the capacity keeps only the newest `capacity` bytes.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl ByteBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append bytes, evicting the oldest content if the capacity is exceeded
    ///
    /// Returns the number of bytes evicted (0 if everything fit).
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        self.data.extend_from_slice(bytes);
        let excess = self.data.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.data.drain(..excess);
        }
        excess
    }

    /// Remove the first `n` bytes
    ///
    /// Consuming more than is buffered is a caller bug and leaves the buffer untouched.
    pub fn consume(&mut self, n: usize) -> Result<()> {
        if n > self.data.len() {
            return Err(DecoderError::BufferUnderflow {
                requested: n,
                available: self.data.len(),
            });
        }
        self.data.drain(..n);
        Ok(())
    }

    /// Drop the oldest half of the content, returning how many bytes went
    pub fn evict_oldest_half(&mut self) -> usize {
        let discarded = self.data.len() / 2;
        self.data.drain(..discarded);
        discarded
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

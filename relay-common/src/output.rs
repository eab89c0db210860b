//! Bounded tail retention for captured process output.

use std::collections::VecDeque;

/// Default per-stream ceiling for captured script output, in bytes.
pub const DEFAULT_OUTPUT_LIMIT: usize = 20_000;

/// Fixed-capacity byte buffer that keeps only the most recent bytes.
///
/// Once the ceiling is exceeded the oldest bytes are discarded, so the final
/// diagnostic lines of a noisy script are always retained.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    discarded: u64,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
            discarded: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.capacity == 0 {
            self.discarded += chunk.len() as u64;
            return;
        }
        // Only the last `capacity` bytes of an oversized chunk can survive.
        let chunk = if chunk.len() > self.capacity {
            let skip = chunk.len() - self.capacity;
            self.discarded += skip as u64;
            &chunk[skip..]
        } else {
            chunk
        };

        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.bytes.drain(..overflow);
            self.discarded += overflow as u64;
        }
        self.bytes.extend(chunk);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes dropped from the front so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn is_truncated(&self) -> bool {
        self.discarded > 0
    }

    /// Decode the retained bytes as UTF-8.
    ///
    /// When truncation cut through a multi-byte character, the orphaned
    /// continuation bytes at the front are skipped.
    pub fn into_string(self) -> String {
        let truncated = self.is_truncated();
        let mut bytes: Vec<u8> = self.bytes.into();
        if truncated {
            let start = bytes
                .iter()
                .take(3)
                .take_while(|b| (**b & 0b1100_0000) == 0b1000_0000)
                .count();
            bytes.drain(..start);
        }
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }
}

impl Default for TailBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT)
    }
}

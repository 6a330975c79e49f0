// Stream framer
// Accumulates arbitrarily sized chunks and cuts them into fixed-size hops

use std::collections::VecDeque;

use crate::config::DetectorConfig;

/// FIFO accumulator emitting `hop_size` samples at a time
///
/// The backlog is bounded: samples left over from earlier pushes are
/// trimmed to `max_buffered` (oldest first) before a new chunk is appended.
/// A fresh chunk is always kept whole, so a consumer that drains hops after
/// every push never loses audio however large its chunks are.
pub struct StreamFramer {
    hop_size: usize,
    max_buffered: usize,
    accumulator: VecDeque<f32>,
    dropped: u64,
}

impl StreamFramer {
    /// `max_buffered` is raised to `hop_size` if smaller
    pub fn new(hop_size: usize, max_buffered: usize) -> Self {
        let max_buffered = max_buffered.max(hop_size);
        StreamFramer {
            hop_size,
            max_buffered,
            accumulator: VecDeque::with_capacity(max_buffered),
            dropped: 0,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.hop_size, config.max_buffered_samples)
    }

    /// Append a chunk; returns false if it was discarded
    /// Empty chunks and chunks containing NaN/inf samples are discarded whole
    pub fn push(&mut self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return false;
        }
        if chunk.iter().any(|s| !s.is_finite()) {
            log::debug!("Discarding chunk of {} samples with non-finite values", chunk.len());
            return false;
        }

        let backlog = self.accumulator.len().saturating_sub(self.max_buffered);
        if backlog > 0 {
            self.note_dropped(backlog);
            self.accumulator.drain(..backlog);
        }

        self.accumulator.extend(chunk.iter().copied());
        true
    }

    /// Remove and return the oldest full hop, if one is buffered
    pub fn next_hop(&mut self) -> Option<Vec<f32>> {
        if self.accumulator.len() < self.hop_size {
            return None;
        }
        Some(self.accumulator.drain(..self.hop_size).collect())
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Samples waiting for the next hop
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }

    /// Total samples discarded by the accumulator bound
    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    fn note_dropped(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.dropped += count as u64;
        log::warn!(
            "Framer over capacity ({} samples), dropped {} oldest samples",
            self.max_buffered,
            count
        );
    }
}

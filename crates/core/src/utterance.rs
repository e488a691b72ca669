//! Silence-based end-of-utterance detection for streamed microphone audio.
//!
//! The detector only classifies chunks and tracks time; the relay that owns
//! it decides what to do when [`UtteranceDetector::poll_boundary`] fires.

use crate::audio;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtteranceDetectorConfig {
    /// Peak sample amplitude a chunk must exceed to count as speech.
    pub threshold: u16,
    /// How long the signal must stay quiet before the utterance ends.
    pub hang_time: Duration,
    /// Chunks shorter than this are treated as noise.
    pub min_chunk_bytes: usize,
}

impl Default for UtteranceDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 500,
            hang_time: Duration::from_secs(1),
            min_chunk_bytes: 100,
        }
    }
}

#[derive(Debug)]
pub struct UtteranceDetector {
    config: UtteranceDetectorConfig,
    last_signal: Option<Instant>,
}

impl UtteranceDetector {
    pub fn new(config: UtteranceDetectorConfig) -> Self {
        Self {
            config,
            last_signal: None,
        }
    }

    pub fn is_signal_bearing(&self, chunk: &[u8]) -> bool {
        chunk.len() >= self.config.min_chunk_bytes
            && audio::peak_amplitude(chunk) > self.config.threshold
    }

    /// Records a chunk; speech starts or extends the current utterance.
    pub fn observe(&mut self, chunk: &[u8], now: Instant) {
        if self.is_signal_bearing(chunk) {
            self.last_signal = Some(now);
        }
    }

    /// Reports the end of the current utterance once, after `hang_time` of
    /// quiet.
    pub fn poll_boundary(&mut self, now: Instant) -> bool {
        match self.last_signal {
            Some(at) if now.saturating_duration_since(at) >= self.config.hang_time => {
                self.last_signal = None;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.last_signal = None;
    }
}

use crate::config::AudioConfig;
use crate::error::{AudioError, ConfigError};
use log::warn;

/// Fixed-length run of samples handed to inference exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisWindow {
    samples: Vec<i16>,
}

impl AnalysisWindow {
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Collects PCM bursts of any size and cuts them into analysis windows.
///
/// A window is the first `window_size` buffered samples; after it is taken `hop_size`
/// samples are drained from the front. `hop_size == window_size` gives disjoint windows,
/// anything smaller gives overlapping ones.
#[derive(Debug)]
pub struct AudioRechunker {
    buffer: Vec<i16>,
    window_size: usize,
    hop_size: usize,
    max_buffered: usize,
}

impl AudioRechunker {
    pub fn new(config: &AudioConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(AudioRechunker {
            buffer: Vec::with_capacity(config.max_buffered),
            window_size: config.window_size,
            hop_size: config.hop_size,
            max_buffered: config.max_buffered,
        })
    }

    /// Disjoint windows of `window_size` with the default buffer cap.
    pub fn disjoint(window_size: usize) -> Result<Self, ConfigError> {
        let defaults = AudioConfig::default();
        Self::new(&AudioConfig {
            window_size,
            hop_size: window_size,
            max_buffered: defaults.max_buffered.max(window_size * 2),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples waiting for the next window.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a burst and returns the windows it completes.
    ///
    /// The iterator is lazy: windows not pulled from it stay buffered and come out of the
    /// next push. A burst of any length is accepted while the caller keeps pulling; once
    /// `max_buffered` samples pile up undrained, further bursts are rejected. Rejected bursts
    /// leave the buffer untouched.
    pub fn push(&mut self, samples: &[i16]) -> Result<Windows<'_>, AudioError> {
        if samples.is_empty() {
            return Err(AudioError::EmptyBurst);
        }
        if self.buffer.len() >= self.max_buffered {
            let err = AudioError::BufferOverflow {
                buffered: self.buffer.len(),
                incoming: samples.len(),
                max: self.max_buffered,
            };
            warn!("Dropping burst: {}", err);
            return Err(err);
        }
        self.buffer.extend_from_slice(samples);
        Ok(Windows { rechunker: self })
    }

    /// Windows already complete in the buffer, without pushing anything new.
    pub fn ready(&mut self) -> Windows<'_> {
        Windows { rechunker: self }
    }

    fn next_window(&mut self) -> Option<AnalysisWindow> {
        if self.buffer.len() < self.window_size {
            return None;
        }
        let samples = self.buffer[..self.window_size].to_vec();
        self.buffer.drain(..self.hop_size);
        Some(AnalysisWindow { samples })
    }
}

pub struct Windows<'a> {
    rechunker: &'a mut AudioRechunker,
}

impl Iterator for Windows<'_> {
    type Item = AnalysisWindow;

    fn next(&mut self) -> Option<AnalysisWindow> {
        self.rechunker.next_window()
    }
}

/// Raw little-endian 16-bit PCM to samples.
pub fn samples_from_le_bytes(bytes: &[u8]) -> Result<Vec<i16>, AudioError> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::OddByteCount(bytes.len()));
    }
    Ok(bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect())
}

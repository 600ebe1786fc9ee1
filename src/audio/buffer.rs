//! Owned audio buffers for the two consumers of the microphone.
//!
//! * [`SampleAccumulator`] — re-frames arbitrary microphone chunks into the
//!   fixed frame length the wake-word detector requires.  Frames are
//!   *drained* out of the accumulator, so it never holds a complete frame
//!   after [`SampleAccumulator::next_frame`] returns `None`.
//! * [`RecordingBuffer`] — append-only PCM bytes for one utterance, handed to
//!   the WAV encoder once the recording finishes.
//!
//! # Example
//!
//! ```rust
//! use aurora_voice::audio::{PcmChunk, SampleAccumulator};
//!
//! let mut acc = SampleAccumulator::new(4);
//! acc.push(&PcmChunk::from_samples(&[1, 2, 3]));
//! assert!(acc.next_frame().is_none());
//!
//! acc.push(&PcmChunk::from_samples(&[4, 5]));
//! assert_eq!(acc.next_frame(), Some(vec![1, 2, 3, 4]));
//! assert_eq!(acc.len(), 1);
//! ```

use super::pcm::PcmChunk;
use super::wav::{self, WavError};

// ---------------------------------------------------------------------------
// SampleAccumulator
// ---------------------------------------------------------------------------

/// Queue of samples carried across chunk boundaries until a full detector
/// frame is available.
#[derive(Debug)]
pub struct SampleAccumulator {
    samples: Vec<i16>,
    frame_len: usize,
}

impl SampleAccumulator {
    /// Create an accumulator producing frames of `frame_len` samples.
    ///
    /// # Panics
    ///
    /// Panics if `frame_len == 0`.
    pub fn new(frame_len: usize) -> Self {
        assert!(frame_len > 0, "frame length must be > 0");
        Self {
            samples: Vec::with_capacity(frame_len * 2),
            frame_len,
        }
    }

    /// Append every sample of `chunk`.
    pub fn push(&mut self, chunk: &PcmChunk) {
        self.samples.extend(chunk.samples());
    }

    /// Remove and return the oldest full frame, if one is available.
    pub fn next_frame(&mut self) -> Option<Vec<i16>> {
        if self.samples.len() < self.frame_len {
            return None;
        }
        Some(self.samples.drain(..self.frame_len).collect())
    }

    /// Samples waiting for the next frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ---------------------------------------------------------------------------
// RecordingBuffer
// ---------------------------------------------------------------------------

/// Append-only byte buffer for one recording session.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    pcm: Vec<u8>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate room for `payload_bytes` of PCM.
    pub fn with_capacity(payload_bytes: usize) -> Self {
        Self {
            pcm: Vec::with_capacity(payload_bytes),
        }
    }

    pub fn append(&mut self, chunk: &PcmChunk) {
        self.pcm.extend_from_slice(chunk.as_bytes());
    }

    /// PCM payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.pcm.len()
    }

    /// `true` until the first non-empty chunk is appended.
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Finish the recording and encode it as WAV.
    pub fn into_wav(self, sample_rate: u32) -> Result<Vec<u8>, WavError> {
        wav::encode(&self.pcm, sample_rate)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

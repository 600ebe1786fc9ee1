//! Amplitude-threshold voice activity gating.
//!
//! A chunk *contains speech* when any sample's magnitude reaches the
//! configured threshold.  [`ActivityState`] tracks, per recording, whether
//! speech has been heard at all and when it was last heard; the recorder
//! stops once speech has been heard and the trailing quiet exceeds the
//! silence duration.
//!
//! ## Ordering
//!
//! The speech test runs before the silence test for every chunk, so a chunk
//! that contains speech can never itself end the recording, however long the
//! quiet stretch before it was.  An utterance that never crosses the
//! threshold never arms the silence stop at all.

use std::time::Duration;

use tokio::time::Instant;

use super::pcm::PcmChunk;

/// Returns `true` when any sample in `chunk` has `|sample| >= threshold`.
///
/// ```
/// use aurora_voice::audio::{vad, PcmChunk};
///
/// assert!(vad::contains_speech(&PcmChunk::from_samples(&[0, -1300]), 1300));
/// assert!(!vad::contains_speech(&PcmChunk::from_samples(&[1299, -1299]), 1300));
/// ```
pub fn contains_speech(chunk: &PcmChunk, threshold: u16) -> bool {
    let threshold = i32::from(threshold);
    chunk.samples().any(|s| i32::from(s).abs() >= threshold)
}

/// What a single chunk did to the activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkActivity {
    /// The chunk contained speech; `last_speech` moved forward.
    Speech,
    /// Quiet chunk, recording continues.
    Quiet,
    /// Speech was heard earlier and the quiet has now lasted longer than the
    /// silence duration.
    SilenceElapsed,
}

/// Per-recording speech bookkeeping.
///
/// `has_detected_speech` only ever goes `false → true` and `last_speech` only
/// ever moves forward.
#[derive(Debug, Clone)]
pub struct ActivityState {
    has_detected_speech: bool,
    last_speech: Instant,
    threshold: u16,
    silence: Duration,
}

impl ActivityState {
    pub fn new(threshold: u16, silence: Duration, now: Instant) -> Self {
        Self {
            has_detected_speech: false,
            last_speech: now,
            threshold,
            silence,
        }
    }

    /// Classify `chunk` arriving at `now` and update the state.
    pub fn observe(&mut self, chunk: &PcmChunk, now: Instant) -> ChunkActivity {
        if contains_speech(chunk, self.threshold) {
            self.has_detected_speech = true;
            if now > self.last_speech {
                self.last_speech = now;
            }
            return ChunkActivity::Speech;
        }

        if self.has_detected_speech && now.saturating_duration_since(self.last_speech) > self.silence {
            ChunkActivity::SilenceElapsed
        } else {
            ChunkActivity::Quiet
        }
    }

    pub fn has_detected_speech(&self) -> bool {
        self.has_detected_speech
    }

    pub fn last_speech(&self) -> Instant {
        self.last_speech
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

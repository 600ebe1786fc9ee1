//! Audio plumbing: microphone capture → framing / voice-activity gating → WAV.
//!
//! # Pipeline
//!
//! ```text
//! Microphone (cpal thread) → stereo_to_mono → RateConverter → PcmChunk (mpsc)
//!     ├─ wake-word engine:  SampleAccumulator → fixed detector frames
//!     └─ VoiceRecorder:     RecordingBuffer + ActivityState → wav container
//! ```
//!
//! Exactly one of the two consumers holds a [`MicStream`] at a time;
//! [`MicStream::close`] resolves once the device is released.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aurora_voice::audio::{CpalMicrophone, RecorderConfig, VoiceRecorder};
//!
//! # async fn example() -> Result<(), aurora_voice::audio::RecorderError> {
//! let recorder = VoiceRecorder::new(Arc::new(CpalMicrophone::new()));
//! let recording = recorder.capture(&RecorderConfig::default()).await?;
//! println!("{} ms, stopped on {}", recording.duration_ms(), recording.reason);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod capture;
pub mod pcm;
pub mod recorder;
pub mod resample;
pub mod vad;
pub mod wav;

pub use buffer::{RecordingBuffer, SampleAccumulator};
pub use capture::{
    CpalMicrophone, DeviceError, MicEvent, MicStream, Microphone, StreamHandle, StreamSpec,
};
pub use pcm::PcmChunk;
pub use recorder::{
    Recording, RecorderConfig, RecorderError, RecorderEvent, StopReason, VoiceRecorder,
};
pub use resample::{stereo_to_mono, RateConverter};
pub use wav::{WavError, WavHeader};

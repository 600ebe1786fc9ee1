//! Voice-activity-gated utterance capture.
//!
//! [`VoiceRecorder::capture`] opens the microphone, buffers every chunk and
//! stops on the first of:
//!
//! ```text
//! speech heard, then quiet > silence_duration   → Ok   (Silence)
//! max_duration deadline, something buffered     → Ok   (Timeout)
//! max_duration deadline, nothing buffered       → Err  TimeoutBeforeCapture
//! microphone error / stream closed              → Err  Device
//! VoiceRecorder::cancel()                       → Err  Cancelled
//! ```
//!
//! Only one capture may be in flight; a second call fails with
//! [`RecorderError::Busy`] without touching the first.  The capture loop
//! leaves exactly once, so only the first stop condition to fire finalizes
//! the recording.  The microphone is released before any result (success or
//! error) is returned, and the deadline timer is owned by the capture future
//! so it can never outlive it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;

use super::buffer::RecordingBuffer;
use super::capture::{DeviceError, MicEvent, Microphone, StreamSpec};
use super::pcm;
use super::vad::{ActivityState, ChunkActivity};
use super::wav::WavError;

/// Upper bound on the up-front buffer allocation; longer recordings grow.
const MAX_PREALLOCATION: Duration = Duration::from_secs(60);

/// Stand-in deadline for a `max_duration` too large to add to `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ---------------------------------------------------------------------------
// Config / results
// ---------------------------------------------------------------------------

/// Parameters for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Must match the wake-word detector's rate.
    pub sample_rate: u32,
    pub silence_duration: Duration,
    pub max_duration: Duration,
    /// Raw 16-bit magnitude at or above which a sample counts as speech.
    pub amplitude_threshold: u16,
    pub device: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            silence_duration: Duration::from_millis(1_200),
            max_duration: Duration::from_millis(10_000),
            amplitude_threshold: 1_300,
            device: None,
        }
    }
}

/// Why a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Silence,
    Timeout,
    Error,
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Silence => "silence",
            StopReason::Timeout => "timeout",
            StopReason::Error => "error",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A finished recording, already wrapped in a WAV container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub wav: Vec<u8>,
    pub reason: StopReason,
    pub sample_rate: u32,
    /// PCM bytes after the header.
    pub payload_len: usize,
}

impl Recording {
    pub fn duration_ms(&self) -> u64 {
        pcm::duration_ms(self.payload_len, self.sample_rate)
    }
}

/// Ways a capture can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("a capture is already in progress")]
    Busy,

    #[error("no audio was captured before the deadline")]
    TimeoutBeforeCapture,

    #[error("microphone error: {0}")]
    Device(#[from] DeviceError),

    #[error("capture was cancelled")]
    Cancelled,

    #[error(transparent)]
    Encode(#[from] WavError),
}

/// Lifecycle signals broadcast to [`VoiceRecorder::subscribe`]rs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEvent {
    Started,
    Stopped(StopReason),
    Cancelled,
}

// ---------------------------------------------------------------------------
// VoiceRecorder
// ---------------------------------------------------------------------------

struct ActiveCapture {
    id: u64,
    cancel: Option<oneshot::Sender<()>>,
}

type Slot = Arc<Mutex<Option<ActiveCapture>>>;

/// Clears the active slot when the capture future finishes or is dropped.
struct SlotGuard {
    slot: Slot,
    id: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut active = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().map(|a| a.id) == Some(self.id) {
            *active = None;
        }
    }
}

/// Single-flight recorder over a shared [`Microphone`].
pub struct VoiceRecorder {
    microphone: Arc<dyn Microphone>,
    slot: Slot,
    next_id: AtomicU64,
    events: broadcast::Sender<RecorderEvent>,
}

/// How the capture loop ended.
enum Finish {
    Silence,
    Deadline,
    Failed(DeviceError),
    Cancelled,
}

impl VoiceRecorder {
    pub fn new(microphone: Arc<dyn Microphone>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            microphone,
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Receive [`RecorderEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// `true` while a capture owns the microphone.
    pub fn is_capturing(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Record one utterance.
    ///
    /// # Errors
    ///
    /// See the module docs for the full list; every error path has already
    /// released the microphone.
    pub async fn capture(&self, config: &RecorderConfig) -> Result<Recording, RecorderError> {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let _guard = {
            let mut active = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if active.is_some() {
                log::warn!("recorder: capture requested while busy");
                return Err(RecorderError::Busy);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            *active = Some(ActiveCapture {
                id,
                cancel: Some(cancel_tx),
            });
            SlotGuard {
                slot: Arc::clone(&self.slot),
                id,
            }
        };

        let spec = StreamSpec {
            sample_rate: config.sample_rate,
            device: config.device.clone(),
        };
        let mut stream = match self.microphone.open(&spec).await {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("recorder: failed to open microphone: {e}");
                self.emit(RecorderEvent::Stopped(StopReason::Error));
                return Err(e.into());
            }
        };

        let started = Instant::now();
        let mut activity =
            ActivityState::new(config.amplitude_threshold, config.silence_duration, started);
        let bytes_per_sec = (config.sample_rate as usize).saturating_mul(pcm::BYTES_PER_SAMPLE);
        let prealloc_secs = config.max_duration.min(MAX_PREALLOCATION).as_secs().max(1) as usize;
        let mut buffer =
            RecordingBuffer::with_capacity(bytes_per_sec.saturating_mul(prealloc_secs));

        log::debug!("recorder: capture started at {} Hz", config.sample_rate);
        self.emit(RecorderEvent::Started);

        let deadline_at = started
            .checked_add(config.max_duration)
            .unwrap_or(started + FAR_FUTURE);
        let deadline = tokio::time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        let finish = loop {
            tokio::select! {
                biased;

                _ = &mut cancel_rx => break Finish::Cancelled,

                () = &mut deadline => break Finish::Deadline,

                event = stream.recv() => match event {
                    Some(MicEvent::Chunk(chunk)) => {
                        buffer.append(&chunk);
                        if activity.observe(&chunk, Instant::now()) == ChunkActivity::SilenceElapsed {
                            break Finish::Silence;
                        }
                    }
                    Some(MicEvent::Error(e)) => break Finish::Failed(e),
                    None => break Finish::Failed(DeviceError::Closed),
                },
            }
        };

        // Release the device before reporting anything.
        stream.close().await;

        let reason = match &finish {
            Finish::Silence => StopReason::Silence,
            Finish::Deadline => StopReason::Timeout,
            Finish::Failed(_) => StopReason::Error,
            Finish::Cancelled => StopReason::Cancelled,
        };
        log::info!(
            "recorder: stopped ({reason}) after {} ms, {} bytes buffered",
            started.elapsed().as_millis(),
            buffer.payload_len()
        );

        match finish {
            Finish::Cancelled => {
                self.emit(RecorderEvent::Cancelled);
                Err(RecorderError::Cancelled)
            }
            Finish::Failed(e) => {
                self.emit(RecorderEvent::Stopped(reason));
                Err(RecorderError::Device(e))
            }
            Finish::Deadline if buffer.is_empty() => {
                self.emit(RecorderEvent::Stopped(reason));
                Err(RecorderError::TimeoutBeforeCapture)
            }
            Finish::Silence | Finish::Deadline => {
                self.emit(RecorderEvent::Stopped(reason));
                let payload_len = buffer.payload_len();
                Ok(Recording {
                    wav: buffer.into_wav(config.sample_rate)?,
                    reason,
                    sample_rate: config.sample_rate,
                    payload_len,
                })
            }
        }
    }

    /// Abort the in-flight capture, if any.  Safe to call at any time.
    ///
    /// The pending [`capture`](Self::capture) resolves with
    /// [`RecorderError::Cancelled`] after releasing the microphone.
    pub fn cancel(&self) {
        let mut active = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = active.as_mut().and_then(|a| a.cancel.take()) {
            log::debug!("recorder: cancel requested");
            let _ = tx.send(());
        }
    }

    fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Microphone access.
//!
//! [`Microphone`] is the seam between the voice session and the physical
//! input device.  [`Microphone::open`] starts capture and returns a
//! [`MicStream`] that yields [`MicEvent`]s.  [`MicStream::close`] stops
//! capture and resolves once the device is released, which is what lets the
//! session hand the single microphone from the wake-word engine to the
//! recorder and back without ever holding it twice.  Dropping a stream
//! without closing it still releases the device, off the async workers.
//!
//! [`CpalMicrophone`] is the production implementation.  The cpal stream lives
//! on a dedicated capture thread (cpal streams are not `Send` on every
//! platform); each hardware buffer is downmixed, resampled to the requested
//! rate and forwarded as a [`PcmChunk`].  Opening and closing wait on that
//! thread, so neither ever blocks a tokio worker.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::pcm::{f32_to_i16, i16_to_f32, PcmChunk};
use super::resample::{stereo_to_mono, RateConverter};

// ---------------------------------------------------------------------------
// DeviceError
// ---------------------------------------------------------------------------

/// Errors opening or running a microphone stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to query input config: {0}")]
    Config(String),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to open input stream: {0}")]
    Open(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("audio stream closed unexpectedly")]
    Closed,
}

// ---------------------------------------------------------------------------
// StreamSpec / MicEvent
// ---------------------------------------------------------------------------

/// What the caller wants from the device.  Output is always mono 16-bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    /// Rate of the delivered PCM in Hz.
    pub sample_rate: u32,
    /// Input device name; `None` selects the system default.
    pub device: Option<String>,
}

/// Items delivered by a [`MicStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicEvent {
    Chunk(PcmChunk),
    Error(DeviceError),
}

// ---------------------------------------------------------------------------
// StreamHandle / MicStream
// ---------------------------------------------------------------------------

type Release = Box<dyn FnOnce() + Send>;

/// Keeps capture running until closed or dropped.
///
/// Holds the backend's teardown.  A *blocking* teardown (joining a capture
/// thread) is always run on tokio's blocking pool when a runtime is present.
pub struct StreamHandle {
    release: Option<Release>,
    blocking: bool,
}

impl StreamHandle {
    /// Teardown that returns immediately.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
            blocking: false,
        }
    }

    /// Teardown that may block the calling thread.
    pub fn blocking(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
            blocking: true,
        }
    }

    /// Run the teardown and wait for it to finish.
    pub async fn close(mut self) {
        let Some(release) = self.release.take() else {
            return;
        };
        if self.blocking {
            if let Err(e) = tokio::task::spawn_blocking(release).await {
                log::error!("audio: stream teardown failed: {e}");
            }
        } else {
            release();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };
        if self.blocking {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                // Finishes in the background; nobody is waiting on it.
                drop(runtime.spawn_blocking(release));
                return;
            }
        }
        release();
    }
}

/// A live microphone stream.  Close it (or drop it) to release the device.
pub struct MicStream {
    events: mpsc::UnboundedReceiver<MicEvent>,
    handle: StreamHandle,
}

impl MicStream {
    pub fn new(events: mpsc::UnboundedReceiver<MicEvent>, handle: StreamHandle) -> Self {
        Self { events, handle }
    }

    /// Next chunk or error.  `None` means the backend went away.
    pub async fn recv(&mut self) -> Option<MicEvent> {
        self.events.recv().await
    }

    /// Stop capture; resolves once the device has been released.
    pub async fn close(self) {
        let MicStream { events, handle } = self;
        drop(events);
        handle.close().await;
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Source of live PCM audio.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Start capturing according to `spec`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] when the device is missing or refuses the
    /// stream.  Nothing is left running on error.
    async fn open(&self, spec: &StreamSpec) -> Result<MicStream, DeviceError>;
}

// ---------------------------------------------------------------------------
// CpalMicrophone
// ---------------------------------------------------------------------------

/// Microphone backed by the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

/// Stops and joins the capture thread on drop.
struct CaptureThread {
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        // Dropping the sender wakes the thread, which drops the cpal stream.
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("audio: capture thread panicked");
            }
        }
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self, spec: &StreamSpec) -> Result<MicStream, DeviceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), DeviceError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let spec = spec.clone();

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let stream = match build_stream(&spec, tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until the handle is released.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("audio: capture stream closed");
            })
            .map_err(|e| DeviceError::Open(e.to_string()))?;

        let guard = CaptureThread {
            stop: Some(stop_tx),
            thread: Some(thread),
        };
        let handle = StreamHandle::blocking(move || drop(guard));

        match ready_rx.await {
            Ok(Ok(())) => Ok(MicStream::new(rx, handle)),
            Ok(Err(e)) => {
                handle.close().await;
                Err(e)
            }
            Err(_) => {
                handle.close().await;
                Err(DeviceError::Open("capture thread exited during setup".into()))
            }
        }
    }
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let Some(wanted) = name else {
        return host.default_input_device().ok_or(DeviceError::NoDevice);
    };

    let mut devices = host
        .input_devices()
        .map_err(|e| DeviceError::Config(e.to_string()))?;
    devices
        .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
        .ok_or_else(|| DeviceError::DeviceNotFound(wanted.to_string()))
}

/// Build and start a cpal input stream delivering `spec`-shaped chunks to `tx`.
fn build_stream(
    spec: &StreamSpec,
    tx: mpsc::UnboundedSender<MicEvent>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = select_device(&host, spec.device.as_deref())?;

    let supported = device
        .default_input_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;
    let channels = supported.channels();
    let device_rate = supported.sample_rate().0;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    // 10 ms of device audio per resampler pass.
    let chunk = (device_rate as usize / 100).max(1);
    let mut converter =
        RateConverter::new(device_rate, spec.sample_rate, chunk).map_err(DeviceError::Open)?;

    log::info!(
        "audio: opened {} ({} Hz, {} ch, {:?}) -> {} Hz mono",
        device.name().unwrap_or_else(|_| "<unnamed>".into()),
        device_rate,
        channels,
        format,
        spec.sample_rate
    );

    let data_tx = tx.clone();
    let mut forward = move |interleaved: &[f32]| {
        let mono = stereo_to_mono(interleaved, channels);
        let converted = converter.process(&mono);
        if converted.is_empty() {
            return;
        }
        let samples: Vec<i16> = converted.into_iter().map(f32_to_i16).collect();
        // Receiver may already be gone while the stream is shutting down.
        let _ = data_tx.send(MicEvent::Chunk(PcmChunk::from_samples(&samples)));
    };

    let err_tx = tx;
    let on_error = move |err: cpal::StreamError| {
        log::error!("audio: cpal stream error: {err}");
        let _ = err_tx.send(MicEvent::Error(DeviceError::Stream(err.to_string())));
    };

    let stream = match format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| forward(data),
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().copied().map(i16_to_f32).collect();
                forward(&floats);
            },
            on_error,
            None,
        ),
        other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
    }
    .map_err(|e| DeviceError::Open(e.to_string()))?;

    stream.play().map_err(|e| DeviceError::Open(e.to_string()))?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// MockMicrophone (tests only)
// ---------------------------------------------------------------------------

/// One step of a scripted microphone stream.
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Deliver these samples as one chunk.
    Chunk(Vec<i16>),
    /// Sleep (tokio time) before the next step.
    Wait(std::time::Duration),
    /// Deliver a stream error.
    Fail(String),
}

#[cfg(test)]
impl MockStep {
    /// `count` chunks of `samples_per_chunk` copies of `value`, each followed
    /// by a wait of `every`.
    pub fn repeat(
        value: i16,
        samples_per_chunk: usize,
        every: std::time::Duration,
        count: usize,
    ) -> Vec<MockStep> {
        (0..count)
            .flat_map(|_| {
                [
                    MockStep::Chunk(vec![value; samples_per_chunk]),
                    MockStep::Wait(every),
                ]
            })
            .collect()
    }
}

/// Scripted microphone for tests.
///
/// Each call to [`Microphone::open`] consumes the next script; once the
/// scripts run out, streams stay open but silent.  The mock tracks how many
/// streams are open at once so tests can assert single ownership.
#[cfg(test)]
#[derive(Default)]
pub struct MockMicrophone {
    scripts: std::sync::Mutex<std::collections::VecDeque<Vec<MockStep>>>,
    fail_next_open: std::sync::Mutex<Option<DeviceError>>,
    opened: std::sync::atomic::AtomicUsize,
    active: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    max_active: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    specs: std::sync::Mutex<Vec<StreamSpec>>,
}

#[cfg(test)]
impl MockMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scripts(scripts: Vec<Vec<MockStep>>) -> Self {
        let mic = Self::default();
        *mic.scripts.lock().unwrap() = scripts.into();
        mic
    }

    pub fn fail_next_open(&self, error: DeviceError) {
        *self.fail_next_open.lock().unwrap() = Some(error);
    }

    /// Total successful opens.
    pub fn opened(&self) -> usize {
        self.opened.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Streams currently open.
    pub fn active(&self) -> usize {
        self.active.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Highest number of simultaneously open streams observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn specs(&self) -> Vec<StreamSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Microphone for MockMicrophone {
    async fn open(&self, spec: &StreamSpec) -> Result<MicStream, DeviceError> {
        use std::sync::atomic::Ordering;

        if let Some(err) = self.fail_next_open.lock().unwrap().take() {
            return Err(err);
        }

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        self.specs.lock().unwrap().push(spec.clone());
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            for step in script {
                match step {
                    MockStep::Chunk(samples) => {
                        let _ = tx.send(MicEvent::Chunk(PcmChunk::from_samples(&samples)));
                    }
                    MockStep::Wait(d) => tokio::time::sleep(d).await,
                    MockStep::Fail(msg) => {
                        let _ = tx.send(MicEvent::Error(DeviceError::Stream(msg)));
                    }
                }
            }
            // Keep the stream open until the guard is dropped.
            std::future::pending::<()>().await;
            drop(tx);
        });

        let active = std::sync::Arc::clone(&self.active);
        let handle = StreamHandle::new(move || {
            task.abort();
            active.fetch_sub(1, Ordering::SeqCst);
        });
        Ok(MicStream::new(rx, handle))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Wake-word engine: owns the detector and, while listening, the microphone.
//!
//! # State machine
//!
//! ```text
//!                 start()                 pause()
//! Uninitialized ─────────▶ Listening ─────────────▶ Paused
//!       ▲                   ▲     ▲                   │
//!       │                   │     └──── resume() ─────┘
//!       │          start()  │
//!       └─ (never) Stopped ─┘   ◀── shutdown() from any state
//! ```
//!
//! While listening, a tokio task owns the [`MicStream`], the detector and a
//! [`SampleAccumulator`].  Stopping the task returns the detector through its
//! `JoinHandle`, so `pause()` keeps the model loaded while the microphone is
//! fully released by the time it returns.
//!
//! A microphone or detector failure ends the listening task after the stream
//! has been closed, then raises [`EngineEvent::Error`].  The engine reports
//! itself [`EngineState::Paused`] from then on and does not retry on its own.

use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::detector::{DetectorError, DetectorFactory, InitializationError, WakeWordDetector};
use crate::audio::{
    DeviceError, MicEvent, MicStream, Microphone, PcmChunk, SampleAccumulator, StreamSpec,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Listening,
    Paused,
    Stopped,
}

/// Errors from starting the engine or raised while listening.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Init(#[from] InitializationError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// A keyword match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub keyword_index: usize,
    pub detected_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    WakeWord(Detection),
    Error(EngineError),
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Push `chunk` into `acc` and run every complete frame through `detector`.
///
/// Returns the keyword indices matched, in order.  `acc` is left holding
/// fewer than `frame_length` samples.
pub fn feed(
    detector: &mut dyn WakeWordDetector,
    acc: &mut SampleAccumulator,
    chunk: &PcmChunk,
) -> Result<Vec<usize>, DetectorError> {
    acc.push(chunk);
    let mut hits = Vec::new();
    while let Some(frame) = acc.next_frame() {
        if let Some(index) = detector.process(&frame)? {
            hits.push(index);
        }
    }
    Ok(hits)
}

// ---------------------------------------------------------------------------
// WakeWordEngine
// ---------------------------------------------------------------------------

struct Listener {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Box<dyn WakeWordDetector>>,
}

/// Continuous wake-word listening with pause/resume hand-off of the mic.
pub struct WakeWordEngine {
    factory: Arc<dyn DetectorFactory>,
    microphone: Arc<dyn Microphone>,
    device: Option<String>,
    state: EngineState,
    detector: Option<Box<dyn WakeWordDetector>>,
    listener: Option<Listener>,
    /// `(frame_length, sample_rate)` of the last detector built.
    format: Option<(usize, u32)>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl WakeWordEngine {
    /// Create a stopped engine and the receiver for its events.
    pub fn new(
        factory: Arc<dyn DetectorFactory>,
        microphone: Arc<dyn Microphone>,
        device: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            factory,
            microphone,
            device,
            state: EngineState::Uninitialized,
            detector: None,
            listener: None,
            format: None,
            events,
        };
        (engine, rx)
    }

    /// Current state.  A listener that died on an error reads as `Paused`.
    pub fn state(&self) -> EngineState {
        match (&self.state, &self.listener) {
            (EngineState::Listening, Some(l)) if l.task.is_finished() => EngineState::Paused,
            (state, _) => *state,
        }
    }

    /// Detector input rate, known once a detector has been built.
    pub fn sample_rate(&self) -> Option<u32> {
        self.format.map(|(_, rate)| rate)
    }

    pub fn frame_length(&self) -> Option<usize> {
        self.format.map(|(len, _)| len)
    }

    /// Build the detector if needed and start listening.  No-op while
    /// already listening; from `Paused` this behaves like [`resume`](Self::resume).
    ///
    /// # Errors
    ///
    /// [`EngineError::Init`] if the model cannot be built, or
    /// [`EngineError::Device`] if the microphone cannot be opened.  The state
    /// is unchanged on error.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.reap().await;
        match self.state {
            EngineState::Listening => Ok(()),
            EngineState::Paused => self.resume().await,
            EngineState::Uninitialized | EngineState::Stopped => self.listen().await,
        }
    }

    /// Stop listening and release the microphone, keeping the detector.
    /// No-op unless listening.
    pub async fn pause(&mut self) {
        self.reap().await;
        if self.state != EngineState::Listening {
            return;
        }
        self.stop_listener().await;
        self.state = EngineState::Paused;
        log::info!("wakeword: paused");
    }

    /// Reopen the microphone and continue listening.  No-op unless paused.
    pub async fn resume(&mut self) -> Result<(), EngineError> {
        self.reap().await;
        if self.state != EngineState::Paused {
            return Ok(());
        }
        self.listen().await
    }

    /// Release microphone and detector.  Idempotent.
    pub async fn shutdown(&mut self) {
        self.stop_listener().await;
        if let Some(mut detector) = self.detector.take() {
            detector.release();
        }
        if self.state != EngineState::Stopped {
            log::info!("wakeword: stopped");
        }
        self.state = EngineState::Stopped;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn listen(&mut self) -> Result<(), EngineError> {
        let mut detector = match self.detector.take() {
            Some(detector) => detector,
            None => {
                let detector = self.factory.create()?;
                log::info!(
                    "wakeword: detector initialised (frame {} @ {} Hz)",
                    detector.frame_length(),
                    detector.sample_rate()
                );
                detector
            }
        };
        self.format = Some((detector.frame_length(), detector.sample_rate()));

        let spec = StreamSpec {
            sample_rate: detector.sample_rate(),
            device: self.device.clone(),
        };
        let stream = match self.microphone.open(&spec).await {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("wakeword: failed to open microphone: {e}");
                self.detector = Some(detector);
                return Err(e.into());
            }
        };

        let (stop, stop_rx) = oneshot::channel();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            run_listener(&mut detector, stream, events, stop_rx).await;
            detector
        });

        self.listener = Some(Listener { stop, task });
        self.state = EngineState::Listening;
        log::info!("wakeword: listening");
        Ok(())
    }

    /// Stop the listening task and take the detector back.
    async fn stop_listener(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let _ = listener.stop.send(());
        match listener.task.await {
            Ok(detector) => self.detector = Some(detector),
            Err(e) => log::error!("wakeword: listener task failed: {e}"),
        }
    }

    /// Collect a listener that exited on its own after an error.
    async fn reap(&mut self) {
        if self.state() == EngineState::Paused && self.state == EngineState::Listening {
            self.stop_listener().await;
            self.state = EngineState::Paused;
        }
    }
}

async fn run_listener(
    detector: &mut Box<dyn WakeWordDetector>,
    mut stream: MicStream,
    events: mpsc::UnboundedSender<EngineEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut acc = SampleAccumulator::new(detector.frame_length());

    let failure: Option<EngineError> = loop {
        tokio::select! {
            biased;

            _ = &mut stop => break None,

            event = stream.recv() => match event {
                Some(MicEvent::Chunk(chunk)) => match feed(detector.as_mut(), &mut acc, &chunk) {
                    Ok(hits) => {
                        for keyword_index in hits {
                            log::info!("wakeword: keyword {keyword_index} detected");
                            let _ = events.send(EngineEvent::WakeWord(Detection {
                                keyword_index,
                                detected_at: SystemTime::now(),
                            }));
                        }
                    }
                    Err(e) => break Some(e.into()),
                },
                Some(MicEvent::Error(e)) => break Some(e.into()),
                None => break Some(DeviceError::Closed.into()),
            },
        }
    };

    stream.close().await;
    if let Some(error) = failure {
        log::error!("wakeword: listening stopped: {error}");
        let _ = events.send(EngineEvent::Error(error));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::{MockMicrophone, MockStep};
    use crate::wakeword::detector::MockDetectorFactory;

    fn engine(
        factory: MockDetectorFactory,
        mic: &Arc<MockMicrophone>,
    ) -> (WakeWordEngine, mpsc::UnboundedReceiver<EngineEvent>) {
        WakeWordEngine::new(
            Arc::new(factory),
            Arc::clone(mic) as Arc<dyn Microphone>,
            None,
        )
    }

    // ---- framing -----------------------------------------------------------

    #[test]
    fn two_half_chunks_make_one_process_call() {
        let factory = MockDetectorFactory::new();
        let log = Arc::clone(&factory.log);
        let mut detector = factory.create().unwrap();
        let mut acc = SampleAccumulator::new(512);

        let first: Vec<i16> = (0..256).collect();
        let second: Vec<i16> = (256..512).collect();

        assert!(feed(detector.as_mut(), &mut acc, &PcmChunk::from_samples(&first))
            .unwrap()
            .is_empty());
        assert!(log.frames().is_empty());

        feed(detector.as_mut(), &mut acc, &PcmChunk::from_samples(&second)).unwrap();
        assert_eq!(log.frames(), vec![(0..512).collect::<Vec<i16>>()]);
        assert_eq!(acc.len(), 0);
    }

    #[test]
    fn feed_reports_every_matching_frame() {
        let factory = MockDetectorFactory {
            frame_length: 4,
            ..MockDetectorFactory::new()
        };
        let mut detector = factory.create().unwrap();
        let mut acc = SampleAccumulator::new(4);

        let chunk = PcmChunk::from_samples(&[0, i16::MAX, 0, 0, 0, 0, 0, 0, i16::MAX, 1]);
        let hits = feed(detector.as_mut(), &mut acc, &chunk).unwrap();
        assert_eq!(hits, vec![0]);
        assert_eq!(acc.len(), 2);
    }

    // ---- lifecycle ---------------------------------------------------------

    #[tokio::test]
    async fn detection_raises_wakeword_event() {
        let factory = MockDetectorFactory {
            trigger: 511,
            ..MockDetectorFactory::new()
        };
        let log = Arc::clone(&factory.log);
        let mic = Arc::new(MockMicrophone::with_scripts(vec![vec![
            MockStep::Chunk((0..256).collect()),
            MockStep::Chunk((256..512).collect()),
        ]]));
        let (mut engine, mut events) = engine(factory, &mic);

        engine.start().await.unwrap();
        assert_eq!(engine.state(), EngineState::Listening);
        assert_eq!(mic.specs()[0].sample_rate, 16_000);

        match events.recv().await.unwrap() {
            EngineEvent::WakeWord(d) => assert_eq!(d.keyword_index, 0),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(log.frames().len(), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let factory = MockDetectorFactory::new();
        let log = Arc::clone(&factory.log);
        let mic = Arc::new(MockMicrophone::new());
        let (mut engine, _events) = engine(factory, &mic);

        engine.start().await.unwrap();
        engine.start().await.unwrap();

        assert_eq!(mic.opened(), 1);
        assert_eq!(log.created(), 1);
        assert_eq!(engine.sample_rate(), Some(16_000));
        assert_eq!(engine.frame_length(), Some(512));
    }

    #[tokio::test]
    async fn pause_releases_mic_and_resume_reuses_detector() {
        let factory = MockDetectorFactory::new();
        let log = Arc::clone(&factory.log);
        let mic = Arc::new(MockMicrophone::new());
        let (mut engine, _events) = engine(factory, &mic);

        engine.start().await.unwrap();
        engine.pause().await;
        assert_eq!(engine.state(), EngineState::Paused);
        assert_eq!(mic.active(), 0);

        engine.pause().await;
        engine.resume().await.unwrap();
        assert_eq!(engine.state(), EngineState::Listening);
        assert_eq!(mic.opened(), 2);
        assert_eq!(log.created(), 1);
        assert_eq!(mic.max_active(), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_are_no_ops_when_not_applicable() {
        let mic = Arc::new(MockMicrophone::new());
        let (mut engine, _events) = engine(MockDetectorFactory::new(), &mic);

        engine.pause().await;
        engine.resume().await.unwrap();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(mic.opened(), 0);
    }

    #[tokio::test]
    async fn shutdown_releases_everything_and_is_idempotent() {
        let factory = MockDetectorFactory::new();
        let log = Arc::clone(&factory.log);
        let mic = Arc::new(MockMicrophone::new());
        let (mut engine, _events) = engine(factory, &mic);

        engine.shutdown().await;
        assert_eq!(engine.state(), EngineState::Stopped);

        engine.start().await.unwrap();
        engine.shutdown().await;
        engine.shutdown().await;

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(mic.active(), 0);
        assert_eq!(log.released(), 1);

        // A fresh start after shutdown needs a new detector.
        engine.start().await.unwrap();
        assert_eq!(log.created(), 2);
    }

    #[tokio::test]
    async fn init_error_propagates_and_leaves_mic_closed() {
        let factory = MockDetectorFactory::failing(InitializationError::MissingAccessKey);
        let mic = Arc::new(MockMicrophone::new());
        let (mut engine, _events) = engine(factory, &mic);

        let err = engine.start().await.unwrap_err();
        assert_eq!(err, EngineError::Init(InitializationError::MissingAccessKey));
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(mic.opened(), 0);
    }

    #[tokio::test]
    async fn mic_open_failure_keeps_detector_for_retry() {
        let factory = MockDetectorFactory::new();
        let log = Arc::clone(&factory.log);
        let mic = Arc::new(MockMicrophone::new());
        mic.fail_next_open(DeviceError::NoDevice);
        let (mut engine, _events) = engine(factory, &mic);

        assert_eq!(
            engine.start().await,
            Err(EngineError::Device(DeviceError::NoDevice))
        );
        engine.start().await.unwrap();
        assert_eq!(log.created(), 1);
    }

    #[tokio::test]
    async fn stream_error_raises_event_and_stops_listening() {
        let factory = MockDetectorFactory::new();
        let mic = Arc::new(MockMicrophone::with_scripts(vec![vec![MockStep::Fail(
            "unplugged".into(),
        )]]));
        let (mut engine, mut events) = engine(factory, &mic);

        engine.start().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            EngineEvent::Error(EngineError::Device(DeviceError::Stream("unplugged".into())))
        );
        assert_eq!(mic.active(), 0);

        // The caller decides; resume reopens the mic with the same detector.
        engine.resume().await.unwrap();
        assert_eq!(engine.state(), EngineState::Listening);
        assert_eq!(mic.opened(), 2);
    }
}

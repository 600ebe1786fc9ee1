//! Session orchestrator: wake word → record → voice API → popup.
//!
//! [`SessionOrchestrator`] owns the wake-word engine and drives one
//! interaction at a time in response to [`EngineEvent`]s received over a
//! `tokio::sync::mpsc` channel.
//!
//! # Interaction flow
//!
//! ```text
//! EngineEvent::WakeWord            (idle → busy, SessionToken taken)
//!   ├─▶ popup.show(wakeword) + wake-word payload
//!   ├─▶ engine.pause()              microphone released
//!   ├─▶ KeepAwakeGuard::acquire
//!   ├─▶ recorder.capture()          microphone owned by the recorder
//!   ├─▶ engine.resume()             whatever the capture result
//!   ├─▶ client.send_audio(wav)
//!   │     ├─ Ok  → ai:response {message, raw}, hide_after(response)
//!   │     └─ Err → ai:response {error},        hide_after(error)
//!   └─▶ guard + token dropped       (busy → idle)
//!
//! EngineEvent::WakeWord while busy → dropped with a warning
//! EngineEvent::Error               → ai:response {error}, hide_after(error), engine.pause()
//!   └─▶ after the hide delay: engine.resume() once
//!         ├─ Ok  → listening again
//!         └─ Err → run() returns the error
//! ```
//!
//! Shutdown drops an in-flight interaction wherever it is suspended; its
//! guards release the microphone, the keep-awake lock and the session token.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::audio::{RecorderConfig, RecorderError, VoiceRecorder};
use crate::surface::{AiResponsePayload, Popup, VisibilityReason, WakeWordPayload};
use crate::voice_api::{InferenceClient, VoiceApiError, VoiceResponse};
use crate::wakeword::{Detection, EngineError, EngineEvent, WakeWordEngine};

use super::keep_awake::{KeepAwake, KeepAwakeGuard};
use super::state::{SessionGate, SessionState, SessionToken};

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Why an interaction failed.  The message is what the popup shows.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Recording failed: {0}")]
    Capture(#[from] RecorderError),

    #[error("Voice request failed: {0}")]
    Inference(#[from] VoiceApiError),
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Shown in the wake-word payload.
    pub keyword_label: String,
    /// Delay before the popup hides after a response or error.
    pub hide_delay: Duration,
    /// `sample_rate` is overwritten with the engine's rate on start.
    pub recorder: RecorderConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keyword_label: "Hey Aurora".into(),
            hide_delay: Duration::from_millis(4_000),
            recorder: RecorderConfig::default(),
        }
    }
}

/// What the event loop should do after handling an event.
enum Flow {
    Continue,
    Shutdown,
    Failed(EngineError),
}

/// Sleep until `at`, or forever when there is nothing to wait for.
async fn sleep_until_some(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

/// Drives the voice session.
///
/// Create with [`SessionOrchestrator::new`], call [`start`](Self::start),
/// then [`run`](Self::run) inside a tokio task.
pub struct SessionOrchestrator {
    engine: WakeWordEngine,
    recorder: Arc<VoiceRecorder>,
    client: Arc<dyn InferenceClient>,
    popup: Popup,
    keep_awake: Arc<dyn KeepAwake>,
    gate: SessionGate,
    settings: SessionSettings,
    /// When to try listening again after an engine error.
    retry_at: Option<Instant>,
}

impl SessionOrchestrator {
    pub fn new(
        engine: WakeWordEngine,
        recorder: Arc<VoiceRecorder>,
        client: Arc<dyn InferenceClient>,
        popup: Popup,
        keep_awake: Arc<dyn KeepAwake>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            engine,
            recorder,
            client,
            popup,
            keep_awake,
            gate: SessionGate::new(),
            settings,
            retry_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.gate.state()
    }

    /// Start wake-word listening and align the recorder with the detector's
    /// sample rate.
    ///
    /// # Errors
    ///
    /// Propagates engine start failures; an [`EngineError::Init`] is fatal
    /// to startup.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.engine.start().await?;
        if let Some(rate) = self.engine.sample_rate() {
            self.settings.recorder.sample_rate = rate;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `shutdown` fires (or its sender is dropped) or `events`
    /// closes, then shut everything down.
    ///
    /// # Errors
    ///
    /// After an engine error the engine is resumed once, a hide delay later.
    /// If that fails the session shuts down and the error is returned.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<(), EngineError> {
        let result = loop {
            let retry_at = self.retry_at;
            let flow = tokio::select! {
                biased;

                _ = &mut shutdown => Flow::Shutdown,

                event = events.recv() => match event {
                    Some(EngineEvent::WakeWord(detection)) => {
                        self.handle_wake_word(detection, &mut events, &mut shutdown).await
                    }
                    Some(EngineEvent::Error(e)) => {
                        self.handle_engine_error(e).await;
                        Flow::Continue
                    }
                    None => {
                        log::info!("session: engine event channel closed");
                        Flow::Shutdown
                    }
                },

                () = sleep_until_some(retry_at) => {
                    self.retry_at = None;
                    match self.engine.resume().await {
                        Ok(()) => {
                            log::info!("session: wake-word engine resumed after error");
                            Flow::Continue
                        }
                        Err(e) => {
                            log::error!("session: wake-word engine did not recover: {e}");
                            Flow::Failed(e)
                        }
                    }
                },
            };
            match flow {
                Flow::Continue => {}
                Flow::Shutdown => break Ok(()),
                Flow::Failed(e) => break Err(e),
            }
        };

        self.shutdown().await;
        result
    }

    /// Stop the engine, cancel any capture and release the keep-awake lock.
    /// Safe to call in any state.
    pub async fn shutdown(&mut self) {
        log::info!("session: shutting down");
        self.engine.shutdown().await;
        self.recorder.cancel();
        self.keep_awake.release();
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Run one interaction while draining (and dropping) events that arrive
    /// in the meantime.
    async fn handle_wake_word(
        &mut self,
        detection: Detection,
        events: &mut mpsc::UnboundedReceiver<EngineEvent>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Flow {
        let Some(token) = self.gate.try_acquire() else {
            log::warn!(
                "session: wake word detected while {}, ignoring",
                self.gate.state().label()
            );
            return Flow::Continue;
        };

        let mut deferred_error: Option<EngineError> = None;
        let flow = {
            let interaction = self.interact(detection, token);
            tokio::pin!(interaction);

            loop {
                tokio::select! {
                    biased;

                    _ = &mut *shutdown => break Flow::Shutdown,

                    () = &mut interaction => break Flow::Continue,

                    Some(event) = events.recv() => match event {
                        EngineEvent::WakeWord(_) => {
                            log::warn!("session: wake word detected while busy, ignoring");
                        }
                        EngineEvent::Error(e) => deferred_error = Some(e),
                    },
                }
            }
        };

        if let (Flow::Continue, Some(e)) = (&flow, deferred_error) {
            self.handle_engine_error(e).await;
        }
        flow
    }

    async fn interact(&mut self, detection: Detection, _token: SessionToken) {
        log::info!("session: wake word detected, starting interaction");

        self.popup.show(VisibilityReason::Wakeword);
        self.popup.send_wake_word(WakeWordPayload::new(
            self.settings.keyword_label.clone(),
            detection.detected_at,
        ));

        self.engine.pause().await;
        let _awake = KeepAwakeGuard::acquire(Arc::clone(&self.keep_awake)).await;

        match self.record_and_send().await {
            Ok(response) => {
                log::info!("session: response received ({} chars)", response.message.len());
                self.popup
                    .send_ai_response(AiResponsePayload::success(response.message, response.data));
                self.popup
                    .hide_after(VisibilityReason::Response, self.settings.hide_delay);
            }
            Err(e) => {
                log::error!("session: interaction failed: {e}");
                self.popup
                    .send_ai_response(AiResponsePayload::failure(e.to_string()));
                self.popup
                    .hide_after(VisibilityReason::Error, self.settings.hide_delay);
            }
        }
    }

    async fn record_and_send(&mut self) -> Result<VoiceResponse, SessionError> {
        let capture = self.recorder.capture(&self.settings.recorder).await;

        if let Err(e) = self.engine.resume().await {
            log::error!("session: failed to resume wake-word engine: {e}");
        }

        let recording = capture?;
        log::info!(
            "session: sending {} ms of audio ({})",
            recording.duration_ms(),
            recording.reason
        );
        Ok(self.client.send_audio(recording.wav).await?)
    }

    async fn handle_engine_error(&mut self, error: EngineError) {
        log::error!("session: wake-word engine error: {error}");
        self.popup
            .send_ai_response(AiResponsePayload::failure(error.to_string()));
        self.popup
            .hide_after(VisibilityReason::Error, self.settings.hide_delay);
        self.engine.pause().await;
        self.retry_at = Some(Instant::now() + self.settings.hide_delay);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    use tokio::task::JoinHandle;

    use crate::audio::capture::{MockMicrophone, MockStep};
    use crate::audio::{DeviceError, Microphone};
    use crate::session::keep_awake::CountingKeepAwake;
    use crate::surface::{SurfaceEvent, VisibilityPayload};
    use crate::voice_api::client::MockInferenceClient;
    use crate::wakeword::detector::MockDetectorFactory;
    use crate::wakeword::InitializationError;

    const CHUNK: usize = 320;
    const EVERY: Duration = Duration::from_millis(20);

    fn utterance() -> Vec<MockStep> {
        let mut script = MockStep::repeat(4_000, CHUNK, EVERY, 25);
        script.extend(MockStep::repeat(0, CHUNK, EVERY, 70));
        script
    }

    fn detection() -> EngineEvent {
        EngineEvent::WakeWord(Detection {
            keyword_index: 0,
            detected_at: SystemTime::now(),
        })
    }

    fn visibility(visible: bool, reason: VisibilityReason) -> SurfaceEvent {
        SurfaceEvent::Visibility(VisibilityPayload { visible, reason })
    }

    struct Parts {
        orchestrator: SessionOrchestrator,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        surface: mpsc::UnboundedReceiver<SurfaceEvent>,
    }

    /// Orchestrator over mocks, not yet started.
    fn parts(
        mic: &Arc<MockMicrophone>,
        client: &Arc<MockInferenceClient>,
        awake: &Arc<CountingKeepAwake>,
    ) -> Parts {
        let (engine, engine_events) = WakeWordEngine::new(
            Arc::new(MockDetectorFactory::new()),
            Arc::clone(mic) as Arc<dyn Microphone>,
            None,
        );
        let recorder = Arc::new(VoiceRecorder::new(Arc::clone(mic) as Arc<dyn Microphone>));
        let (popup, surface) = Popup::new();
        let orchestrator = SessionOrchestrator::new(
            engine,
            recorder,
            Arc::clone(client) as Arc<dyn InferenceClient>,
            popup,
            Arc::clone(awake) as Arc<dyn KeepAwake>,
            SessionSettings::default(),
        );
        Parts {
            orchestrator,
            engine_events,
            surface,
        }
    }

    struct Fixture {
        mic: Arc<MockMicrophone>,
        client: Arc<MockInferenceClient>,
        awake: Arc<CountingKeepAwake>,
        surface: mpsc::UnboundedReceiver<SurfaceEvent>,
        events: mpsc::UnboundedSender<EngineEvent>,
        shutdown: Option<oneshot::Sender<()>>,
        task: JoinHandle<Result<(), EngineError>>,
    }

    impl Fixture {
        /// Engine listening on an idle stream; the recorder gets `capture`.
        /// Engine events are injected through `events`.
        async fn start(client: MockInferenceClient, capture: Vec<MockStep>) -> Self {
            let mic = Arc::new(MockMicrophone::with_scripts(vec![vec![], capture]));
            let client = Arc::new(client);
            let awake = Arc::new(CountingKeepAwake::default());

            let Parts {
                mut orchestrator,
                surface,
                ..
            } = parts(&mic, &client, &awake);
            orchestrator.start().await.unwrap();

            let (events, events_rx) = mpsc::unbounded_channel();
            let (shutdown, shutdown_rx) = oneshot::channel();
            let task = tokio::spawn(orchestrator.run(events_rx, shutdown_rx));

            Self {
                mic,
                client,
                awake,
                surface,
                events,
                shutdown: Some(shutdown),
                task,
            }
        }

        async fn next(&mut self) -> SurfaceEvent {
            self.surface.recv().await.expect("surface closed")
        }

        async fn expect_wake_signals(&mut self) {
            assert_eq!(self.next().await, visibility(true, VisibilityReason::Wakeword));
            match self.next().await {
                SurfaceEvent::WakeWord(p) => assert_eq!(p.keyword, "Hey Aurora"),
                other => panic!("expected wake-word payload, got {other:?}"),
            }
        }

        async fn stop(mut self) -> Self {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
            (&mut self.task).await.unwrap().unwrap();
            self
        }
    }

    // ---- happy path --------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn wake_word_records_sends_and_hides() {
        let mut fx = Fixture::start(MockInferenceClient::replying("hello"), utterance()).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;

        match fx.next().await {
            SurfaceEvent::AiResponse(p) => {
                assert_eq!(p.message, "hello");
                assert!(p.raw.is_some());
                assert_eq!(p.error, None);
            }
            other => panic!("expected ai response, got {other:?}"),
        }
        assert_eq!(fx.next().await, visibility(false, VisibilityReason::Response));

        let uploads = fx.client.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(&uploads[0][..4], b"RIFF");

        // Engine start, recorder, engine resume; never two at once.
        assert_eq!(fx.mic.opened(), 3);
        assert_eq!(fx.mic.max_active(), 1);
        assert_eq!(fx.mic.specs()[1].sample_rate, 16_000);
        assert_eq!(fx.awake.acquired(), 1);
        assert_eq!(fx.awake.released(), 1);

        let fx = fx.stop().await;
        assert_eq!(fx.mic.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hide_waits_for_the_configured_delay() {
        let mut fx = Fixture::start(MockInferenceClient::replying("hi"), utterance()).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;
        fx.next().await; // ai:response
        let responded = tokio::time::Instant::now();

        assert_eq!(fx.next().await, visibility(false, VisibilityReason::Response));
        assert!(responded.elapsed() >= Duration::from_millis(4_000));
    }

    // ---- failures ----------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn capture_failure_reports_error_and_still_resumes() {
        let capture = vec![MockStep::Fail("unplugged".into())];
        let mut fx = Fixture::start(MockInferenceClient::replying("unused"), capture).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;

        match fx.next().await {
            SurfaceEvent::AiResponse(p) => {
                assert_eq!(p.message, "");
                assert!(p.error.unwrap().contains("unplugged"));
            }
            other => panic!("expected error payload, got {other:?}"),
        }
        assert_eq!(fx.next().await, visibility(false, VisibilityReason::Error));

        assert!(fx.client.uploads().is_empty());
        assert_eq!(fx.mic.opened(), 3);
        assert_eq!(fx.mic.active(), 1);
        assert_eq!(fx.awake.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inference_failure_reports_status() {
        let client = MockInferenceClient::failing(VoiceApiError::Remote {
            status: 500,
            body: "boom".into(),
        });
        let mut fx = Fixture::start(client, utterance()).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;

        match fx.next().await {
            SurfaceEvent::AiResponse(p) => {
                assert!(p.message.is_empty());
                let error = p.error.unwrap();
                assert!(error.contains("500"), "{error}");
                assert!(error.contains("boom"), "{error}");
            }
            other => panic!("expected error payload, got {other:?}"),
        }
        assert_eq!(fx.next().await, visibility(false, VisibilityReason::Error));
        assert!(!fx.awake.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn engine_error_pauses_then_resumes_after_hide_delay() {
        let mut fx = Fixture::start(MockInferenceClient::replying("x"), vec![]).await;
        assert_eq!(fx.mic.active(), 1);

        fx.events
            .send(EngineEvent::Error(EngineError::Device(DeviceError::Closed)))
            .unwrap();

        match fx.next().await {
            SurfaceEvent::AiResponse(p) => assert!(p.error.is_some()),
            other => panic!("expected error payload, got {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(fx.mic.active(), 0);

        assert_eq!(fx.next().await, visibility(false, VisibilityReason::Error));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.mic.active(), 1);
        assert_eq!(fx.mic.opened(), 2);
        assert_eq!(fx.mic.max_active(), 1);

        let fx = fx.stop().await;
        assert_eq!(fx.mic.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resume_after_engine_error_ends_the_session() {
        let mut fx = Fixture::start(MockInferenceClient::replying("x"), vec![]).await;
        fx.mic.fail_next_open(DeviceError::NoDevice);

        fx.events
            .send(EngineEvent::Error(EngineError::Device(DeviceError::Closed)))
            .unwrap();

        let result = (&mut fx.task).await.unwrap();
        assert_eq!(result, Err(EngineError::Device(DeviceError::NoDevice)));
        assert_eq!(fx.mic.active(), 0);
        assert_eq!(fx.mic.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_error_during_interaction_is_handled_afterwards() {
        let client = MockInferenceClient::replying("done").with_delay(Duration::from_secs(2));
        let mut fx = Fixture::start(client, utterance()).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;
        fx.events
            .send(EngineEvent::Error(EngineError::Device(DeviceError::Closed)))
            .unwrap();

        match fx.next().await {
            SurfaceEvent::AiResponse(p) => assert_eq!(p.message, "done"),
            other => panic!("expected ai response, got {other:?}"),
        }
        match fx.next().await {
            SurfaceEvent::AiResponse(p) => assert!(p.error.unwrap().contains("closed")),
            other => panic!("expected error payload, got {other:?}"),
        }
        // The error's hide replaces the response's.
        assert_eq!(fx.next().await, visibility(false, VisibilityReason::Error));

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Engine, recorder, resume after capture, resume after the error.
        assert_eq!(fx.mic.opened(), 4);
        assert_eq!(fx.mic.active(), 1);
        assert_eq!(fx.mic.max_active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn detection_from_the_engine_drives_an_interaction() {
        let mut trigger = vec![0_i16; 512];
        trigger[100] = i16::MAX;
        let mic = Arc::new(MockMicrophone::with_scripts(vec![
            vec![MockStep::Chunk(trigger)],
            utterance(),
        ]));
        let client = Arc::new(MockInferenceClient::replying("heard you"));
        let awake = Arc::new(CountingKeepAwake::default());

        let Parts {
            mut orchestrator,
            engine_events,
            mut surface,
        } = parts(&mic, &client, &awake);
        orchestrator.start().await.unwrap();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(orchestrator.run(engine_events, shutdown_rx));

        assert_eq!(
            surface.recv().await.unwrap(),
            visibility(true, VisibilityReason::Wakeword)
        );
        assert!(matches!(
            surface.recv().await.unwrap(),
            SurfaceEvent::WakeWord(_)
        ));
        match surface.recv().await.unwrap() {
            SurfaceEvent::AiResponse(p) => assert_eq!(p.message, "heard you"),
            other => panic!("expected ai response, got {other:?}"),
        }
        assert_eq!(client.uploads().len(), 1);
        assert_eq!(mic.opened(), 3);
        assert_eq!(mic.max_active(), 1);

        shutdown.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(mic.active(), 0);
    }

    // ---- single flight / shutdown ------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn wake_word_while_busy_is_dropped() {
        let client = MockInferenceClient::replying("first").with_delay(Duration::from_secs(2));
        let mut fx = Fixture::start(client, utterance()).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;
        fx.events.send(detection()).unwrap();

        match fx.next().await {
            SurfaceEvent::AiResponse(p) => assert_eq!(p.message, "first"),
            other => panic!("expected ai response, got {other:?}"),
        }
        assert_eq!(fx.next().await, visibility(false, VisibilityReason::Response));
        assert!(fx.surface.try_recv().is_err());
        assert_eq!(fx.client.uploads().len(), 1);
        assert_eq!(fx.mic.max_active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_pending_request_and_releases_everything() {
        let client = MockInferenceClient::replying("late").with_delay(Duration::from_secs(60));
        let mut fx = Fixture::start(client, utterance()).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fx.client.uploads().len(), 1);
        assert!(fx.awake.is_held());

        let mut fx = fx.stop().await;

        assert!(!fx.awake.is_held());
        assert_eq!(fx.awake.released(), 1);
        assert_eq!(fx.mic.active(), 0);
        while let Some(event) = fx.surface.recv().await {
            assert!(
                !matches!(event, SurfaceEvent::AiResponse(_)),
                "no response after shutdown"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_capture_releases_the_mic() {
        let mut fx = Fixture::start(MockInferenceClient::replying("x"), vec![]).await;

        fx.events.send(detection()).unwrap();
        fx.expect_wake_signals().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.mic.opened(), 2);

        let fx = fx.stop().await;
        assert_eq!(fx.mic.active(), 0);
        assert!(fx.client.uploads().is_empty());
        assert!(!fx.awake.is_held());
    }

    #[tokio::test]
    async fn closing_the_event_channel_stops_the_loop() {
        let fx = Fixture::start(MockInferenceClient::replying("x"), vec![]).await;
        let Fixture {
            mic, events, task, ..
        } = fx;
        drop(events);
        task.await.unwrap().unwrap();
        assert_eq!(mic.active(), 0);
    }

    #[tokio::test]
    async fn start_propagates_initialisation_error() {
        let mic = Arc::new(MockMicrophone::new());
        let (engine, _rx) = WakeWordEngine::new(
            Arc::new(MockDetectorFactory::failing(
                InitializationError::BackendUnavailable,
            )),
            Arc::clone(&mic) as Arc<dyn Microphone>,
            None,
        );
        let (popup, _surface) = Popup::new();
        let mut orchestrator = SessionOrchestrator::new(
            engine,
            Arc::new(VoiceRecorder::new(Arc::clone(&mic) as Arc<dyn Microphone>)),
            Arc::new(MockInferenceClient::replying("x")),
            popup,
            Arc::new(CountingKeepAwake::default()),
            SessionSettings::default(),
        );

        assert_eq!(
            orchestrator.start().await,
            Err(EngineError::Init(InitializationError::BackendUnavailable))
        );
        assert_eq!(orchestrator.state(), SessionState::Idle);
        assert_eq!(mic.opened(), 0);
    }
}

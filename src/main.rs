//! Application entry point — Aurora voice assistant.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk with environment overrides, validate.
//! 3. Create the [`tokio`] runtime.
//! 4. Build the wake-word detector factory (fatal on failure).
//! 5. Wire engine, recorder, voice API client, popup and keep-awake lock
//!    into a [`SessionOrchestrator`] and start listening.
//! 6. Forward popup signals to stdout as JSON lines.
//! 7. Run until Ctrl-C, then shut the session down.  Exits non-zero if the
//!    wake-word engine cannot be restarted after an audio error.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};

use aurora_voice::{
    audio::{CpalMicrophone, Microphone, VoiceRecorder},
    config::AppConfig,
    session::{SessionOrchestrator, SessionSettings, SystemInhibitor},
    surface::{Popup, SurfaceEvent},
    voice_api::HttpVoiceClient,
    wakeword::{detector_factory, WakeWordEngine},
};

// ---------------------------------------------------------------------------
// Presentation surface
// ---------------------------------------------------------------------------

/// Write each signal as one JSON line on stdout for the popup process.
async fn forward_surface(mut rx: mpsc::UnboundedReceiver<SurfaceEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut out = std::io::stdout().lock();
                if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
                    log::warn!("surface: stdout closed, dropping {}", event.channel());
                }
            }
            Err(e) => log::error!("surface: failed to encode {}: {e}", event.channel()),
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Aurora voice starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::from_env()
    });
    config.validate().context("invalid configuration")?;

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 4. Detector factory; an initialisation error aborts startup.
    let factory = detector_factory(config.wake_word_options())
        .context("wake-word detector unavailable")?;

    // 5. Components
    let microphone: Arc<dyn Microphone> = Arc::new(CpalMicrophone::new());
    let (engine, engine_events) =
        WakeWordEngine::new(factory, Arc::clone(&microphone), config.audio.device.clone());
    let recorder = Arc::new(VoiceRecorder::new(Arc::clone(&microphone)));
    let client = Arc::new(HttpVoiceClient::from_config(&config.voice_api));
    let (popup, surface_rx) = Popup::new();

    let settings = SessionSettings {
        keyword_label: config.wake_word.keyword_label.clone(),
        hide_delay: config.hide_delay(),
        recorder: config.recorder_config(16_000),
    };

    let mut orchestrator = SessionOrchestrator::new(
        engine,
        recorder,
        client,
        popup,
        Arc::new(SystemInhibitor::new()),
        settings,
    );
    orchestrator
        .start()
        .await
        .context("failed to start wake-word engine")?;
    log::info!(
        "Listening for \"{}\" (voice API at {})",
        config.wake_word.keyword_label,
        config.voice_api.base_url
    );

    // 6. Surface forwarding
    let surface = tokio::spawn(forward_surface(surface_rx));

    // 7. Ctrl-C → shutdown
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Ctrl-C received");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                // Dropping the sender would stop the session; keep it alive.
                log::error!("failed to listen for Ctrl-C: {e}");
                let _keep = shutdown_tx;
                std::future::pending::<()>().await;
            }
        }
    });

    let outcome = orchestrator.run(engine_events, shutdown_rx).await;

    // The popup was dropped with the orchestrator; flush what is left.
    let _ = surface.await;
    outcome.context("wake-word listening could not be restarted")?;
    log::info!("Aurora voice stopped");
    Ok(())
}

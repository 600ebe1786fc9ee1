//! Wake-word detector contract.
//!
//! The acoustic model is an external capability.  [`WakeWordDetector`] is the
//! narrow interface the engine needs from it; [`DetectorFactory`] builds a
//! fresh detector whenever the engine has none (first `start()`, or after a
//! `shutdown()` released the previous one).
//!
//! # Contract
//!
//! - `frame_length()` and `sample_rate()` are constant for the detector's
//!   lifetime.
//! - `process()` consumes exactly one frame of `frame_length()` samples.
//!   Any other length is a caller bug and reported as
//!   [`DetectorError::FrameLength`].
//! - `release()` frees the model; later calls are no-ops and the detector is
//!   unusable afterwards.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The acoustic model could not be constructed.  Fatal to engine start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitializationError {
    #[error("wake-word access key is missing")]
    MissingAccessKey,

    #[error("no wake-word keyword file configured")]
    MissingKeyword,

    #[error("keyword file not found: {0}")]
    KeywordNotFound(PathBuf),

    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("sensitivity {0} is outside [0, 1]")]
    InvalidSensitivity(String),

    #[error("{keywords} keyword(s) but {sensitivities} sensitivity value(s)")]
    SensitivityCount { keywords: usize, sensitivities: usize },

    #[error("wake-word backend not compiled in (enable the `porcupine` feature)")]
    BackendUnavailable,

    #[error("wake-word model initialisation failed: {0}")]
    Model(String),
}

/// Per-frame processing failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("frame has {got} samples, detector requires {expected}")]
    FrameLength { expected: usize, got: usize },

    #[error("detector used after release")]
    Released,

    #[error("wake-word processing failed: {0}")]
    Process(String),
}

// ---------------------------------------------------------------------------
// WakeWordOptions
// ---------------------------------------------------------------------------

/// Construction parameters for the acoustic model.
#[derive(Debug, Clone, PartialEq)]
pub struct WakeWordOptions {
    pub access_key: String,
    pub keyword_paths: Vec<PathBuf>,
    /// One value per keyword, each in `[0, 1]`.
    pub sensitivities: Vec<f32>,
    /// Alternate model parameters file.
    pub model_path: Option<PathBuf>,
}

impl WakeWordOptions {
    /// Check the options before handing them to the model.
    ///
    /// Path existence is checked here so a typo surfaces as a readable
    /// [`InitializationError`] instead of an opaque native error.
    pub fn validate(&self) -> Result<(), InitializationError> {
        if self.access_key.trim().is_empty() {
            return Err(InitializationError::MissingAccessKey);
        }
        if self.keyword_paths.is_empty() {
            return Err(InitializationError::MissingKeyword);
        }
        if self.sensitivities.len() != self.keyword_paths.len() {
            return Err(InitializationError::SensitivityCount {
                keywords: self.keyword_paths.len(),
                sensitivities: self.sensitivities.len(),
            });
        }
        if let Some(bad) = self
            .sensitivities
            .iter()
            .find(|s| !(0.0..=1.0).contains(*s))
        {
            return Err(InitializationError::InvalidSensitivity(bad.to_string()));
        }
        if let Some(missing) = self.keyword_paths.iter().find(|p| !p.exists()) {
            return Err(InitializationError::KeywordNotFound(missing.clone()));
        }
        if let Some(model) = self.model_path.as_ref().filter(|p| !p.exists()) {
            return Err(InitializationError::ModelNotFound(model.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A loaded acoustic model.
pub trait WakeWordDetector: Send {
    /// Samples per [`process`](Self::process) call.
    fn frame_length(&self) -> usize;

    /// Required input rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Consume one frame; returns the matched keyword index, if any.
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError>;

    /// Free the model.  Idempotent.
    fn release(&mut self);
}

/// Builds detectors on demand.
pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn WakeWordDetector>, InitializationError>;
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Shared record of what mock detectors were asked to do.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct DetectorLog {
    pub frames: std::sync::Mutex<Vec<Vec<i16>>>,
    pub created: std::sync::atomic::AtomicUsize,
    pub released: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl DetectorLog {
    pub fn frames(&self) -> Vec<Vec<i16>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Detector that fires when a frame contains `trigger`.
#[cfg(test)]
pub struct MockDetector {
    frame_length: usize,
    sample_rate: u32,
    trigger: i16,
    released: bool,
    log: std::sync::Arc<DetectorLog>,
}

#[cfg(test)]
impl WakeWordDetector for MockDetector {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError> {
        if self.released {
            return Err(DetectorError::Released);
        }
        if frame.len() != self.frame_length {
            return Err(DetectorError::FrameLength {
                expected: self.frame_length,
                got: frame.len(),
            });
        }
        self.log.frames.lock().unwrap().push(frame.to_vec());
        Ok(frame.contains(&self.trigger).then_some(0))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log
                .released
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }
}

/// Factory for [`MockDetector`]s sharing one [`DetectorLog`].
#[cfg(test)]
pub struct MockDetectorFactory {
    pub frame_length: usize,
    pub sample_rate: u32,
    pub trigger: i16,
    pub fail_with: Option<InitializationError>,
    pub log: std::sync::Arc<DetectorLog>,
}

#[cfg(test)]
impl MockDetectorFactory {
    /// 512-sample frames at 16 kHz, firing on `i16::MAX`.
    pub fn new() -> Self {
        Self {
            frame_length: 512,
            sample_rate: 16_000,
            trigger: i16::MAX,
            fail_with: None,
            log: std::sync::Arc::new(DetectorLog::default()),
        }
    }

    pub fn failing(error: InitializationError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new()
        }
    }
}

#[cfg(test)]
impl DetectorFactory for MockDetectorFactory {
    fn create(&self) -> Result<Box<dyn WakeWordDetector>, InitializationError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.log
            .created
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(Box::new(MockDetector {
            frame_length: self.frame_length,
            sample_rate: self.sample_rate,
            trigger: self.trigger,
            released: false,
            log: std::sync::Arc::clone(&self.log),
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

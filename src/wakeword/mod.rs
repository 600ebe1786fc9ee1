//! Wake-word detection.
//!
//! - [`detector`] — the acoustic-model contract ([`WakeWordDetector`],
//!   [`DetectorFactory`]) and its errors.
//! - [`engine`] — [`WakeWordEngine`], the listening state machine that owns
//!   the microphone while idle.
//! - `porcupine` — the Picovoice backend, compiled with the `porcupine`
//!   feature.

pub mod detector;
pub mod engine;
#[cfg(feature = "porcupine")]
pub mod porcupine;

use std::sync::Arc;

pub use detector::{
    DetectorError, DetectorFactory, InitializationError, WakeWordDetector, WakeWordOptions,
};
pub use engine::{Detection, EngineError, EngineEvent, EngineState, WakeWordEngine};

/// Build the detector factory for the compiled-in backend.
///
/// # Errors
///
/// Invalid options, or [`InitializationError::BackendUnavailable`] when the
/// crate was built without a wake-word backend.
pub fn detector_factory(
    options: WakeWordOptions,
) -> Result<Arc<dyn DetectorFactory>, InitializationError> {
    #[cfg(feature = "porcupine")]
    {
        Ok(Arc::new(porcupine::PorcupineFactory::new(options)?))
    }

    #[cfg(not(feature = "porcupine"))]
    {
        options.validate()?;
        Err(InitializationError::BackendUnavailable)
    }
}

#[cfg(all(test, not(feature = "porcupine")))]
mod tests {
    use super::*;

    #[test]
    fn without_backend_factory_is_unavailable() {
        let keyword = tempfile::NamedTempFile::new().unwrap();
        let options = WakeWordOptions {
            access_key: "key".into(),
            keyword_paths: vec![keyword.path().to_path_buf()],
            sensitivities: vec![0.5],
            model_path: None,
        };
        assert!(matches!(
            detector_factory(options),
            Err(InitializationError::BackendUnavailable)
        ));
    }

    #[test]
    fn invalid_options_are_reported_first() {
        let options = WakeWordOptions {
            access_key: String::new(),
            keyword_paths: vec![],
            sensitivities: vec![],
            model_path: None,
        };
        assert!(matches!(
            detector_factory(options),
            Err(InitializationError::MissingAccessKey)
        ));
    }
}

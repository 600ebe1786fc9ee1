//! Picovoice Porcupine backend (cargo feature `porcupine`).

use ::porcupine::{Porcupine, PorcupineBuilder};

use super::detector::{
    DetectorError, DetectorFactory, InitializationError, WakeWordDetector, WakeWordOptions,
};

/// Builds [`PorcupineDetector`]s from validated options.
#[derive(Debug, Clone)]
pub struct PorcupineFactory {
    options: WakeWordOptions,
}

impl PorcupineFactory {
    pub fn new(options: WakeWordOptions) -> Result<Self, InitializationError> {
        options.validate()?;
        Ok(Self { options })
    }
}

impl DetectorFactory for PorcupineFactory {
    fn create(&self) -> Result<Box<dyn WakeWordDetector>, InitializationError> {
        let mut builder = PorcupineBuilder::new_with_keyword_paths(
            &self.options.access_key,
            &self.options.keyword_paths,
        );
        builder.sensitivities(&self.options.sensitivities);
        if let Some(model) = &self.options.model_path {
            builder.model_path(model);
        }

        let handle = builder
            .init()
            .map_err(|e| InitializationError::Model(e.to_string()))?;

        log::info!(
            "wakeword: porcupine ready ({} keyword(s), frame {} @ {} Hz)",
            self.options.keyword_paths.len(),
            handle.frame_length(),
            handle.sample_rate()
        );

        Ok(Box::new(PorcupineDetector {
            frame_length: handle.frame_length() as usize,
            sample_rate: handle.sample_rate(),
            handle: Some(handle),
        }))
    }
}

/// Live Porcupine handle.  `release()` drops the native instance.
pub struct PorcupineDetector {
    handle: Option<Porcupine>,
    frame_length: usize,
    sample_rate: u32,
}

impl WakeWordDetector for PorcupineDetector {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError> {
        let handle = self.handle.as_ref().ok_or(DetectorError::Released)?;
        if frame.len() != self.frame_length {
            return Err(DetectorError::FrameLength {
                expected: self.frame_length,
                got: frame.len(),
            });
        }
        let index = handle
            .process(frame)
            .map_err(|e| DetectorError::Process(e.to_string()))?;
        // Porcupine reports "no match" as -1.
        Ok(usize::try_from(index).ok())
    }

    fn release(&mut self) {
        if self.handle.take().is_some() {
            log::debug!("wakeword: porcupine released");
        }
    }
}

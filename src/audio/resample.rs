//! Channel mixing and sample-rate conversion for device capture.
//!
//! Input devices rarely offer the detector's rate (16 kHz mono) natively, so
//! the capture thread records at the device's default configuration and
//! converts on the way out:
//!
//! 1. [`stereo_to_mono`] — downmix any number of interleaved channels.
//! 2. [`RateConverter`] — resample from the device rate to the target rate
//!    with a rubato `FastFixedIn` session.  Partial input is carried over
//!    between callbacks so chunk boundaries do not click.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use aurora_voice::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// RateConverter
// ---------------------------------------------------------------------------

/// Converts mono `f32` audio from one fixed rate to another.
///
/// When both rates match the converter is a passthrough and no rubato session
/// is created.
pub struct RateConverter {
    resampler: Option<FastFixedIn<f32>>,
    input_buf: Vec<f32>,
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `source_rate` to `target_rate` that feeds
    /// rubato `chunk_size` input frames at a time.
    ///
    /// # Errors
    ///
    /// Returns the rubato construction error message when the ratio or chunk
    /// size is rejected.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self, String> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| format!("resampler init: {e}"))?;

        let output_buf = vec![vec![0_f32; resampler.output_frames_max()]; 1];

        log::debug!("audio: resampling {source_rate} Hz -> {target_rate} Hz (chunk {chunk_size})");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
        })
    }

    /// Process incoming samples and return whatever output is ready.
    ///
    /// The result may be empty while fewer than `chunk_size` samples are
    /// buffered.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => log::error!("audio: resampler process error: {e}"),
            }
            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

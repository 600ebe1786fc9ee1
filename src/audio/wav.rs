//! RIFF/WAVE container for a single mono 16-bit PCM recording.
//!
//! The voice API receives the recording as a canonical 44-byte WAV header
//! followed by the raw payload.  [`encode`] writes it with `hound`; for a
//! mono 16-bit spec that is exactly this layout, which [`WavHeader::parse`]
//! reads back:
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  payload_len + 36
//!      8     4  "WAVE"
//!     12     4  "fmt "
//!     16     4  16            (fmt chunk size)
//!     20     2  1             (PCM)
//!     22     2  1             (mono)
//!     24     4  sample_rate
//!     28     4  sample_rate * 2
//!     32     2  2             (block align)
//!     34     2  16            (bits per sample)
//!     36     4  "data"
//!     40     4  payload_len
//!     44     …  payload
//! ```

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

use super::pcm::BYTES_PER_SAMPLE;

/// Size of the canonical header in bytes.
pub const HEADER_LEN: usize = 44;

const PCM_FORMAT: u16 = 1;
const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Reasons a buffer cannot be encoded, or is not a header produced by
/// [`encode`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WavError {
    #[error("buffer shorter than the {HEADER_LEN}-byte WAV header ({0} bytes)")]
    Truncated(usize),

    #[error("missing {0:?} marker")]
    MissingMarker(&'static str),

    #[error("unsupported format: code {format}, {channels} channel(s), {bits} bits")]
    Unsupported { format: u16, channels: u16, bits: u16 },

    #[error("PCM payload has an odd length ({0} bytes)")]
    OddLength(usize),

    #[error("WAV encoding failed: {0}")]
    Encode(String),
}

impl From<hound::Error> for WavError {
    fn from(e: hound::Error) -> Self {
        WavError::Encode(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Format written by [`encode`]: mono, 16-bit signed integer PCM.
pub fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// Encode raw 16-bit little-endian PCM bytes into a WAV buffer.
///
/// Deterministic; the output is always `44 + pcm.len()` bytes.
///
/// ```
/// use aurora_voice::audio::wav;
///
/// let out = wav::encode(&[0, 0, 1, 0], 16_000).unwrap();
/// assert_eq!(out.len(), 48);
/// assert_eq!(&out[0..4], b"RIFF");
/// ```
///
/// # Errors
///
/// [`WavError::OddLength`] if `pcm` splits a sample, or
/// [`WavError::Encode`] if the payload exceeds what a WAV header can declare.
pub fn encode(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    if pcm.len() % BYTES_PER_SAMPLE != 0 {
        return Err(WavError::OddLength(pcm.len()));
    }

    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + pcm.len()));
    {
        let mut writer = WavWriter::new(&mut cursor, spec(sample_rate))?;
        for pair in pcm.chunks_exact(BYTES_PER_SAMPLE) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Fields recovered from a canonical header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_len: u32,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub channels: u16,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavHeader {
    /// Parse the first [`HEADER_LEN`] bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, WavError> {
        if buf.len() < HEADER_LEN {
            return Err(WavError::Truncated(buf.len()));
        }
        for (offset, marker) in [(0, "RIFF"), (8, "WAVE"), (12, "fmt "), (36, "data")] {
            if &buf[offset..offset + 4] != marker.as_bytes() {
                return Err(WavError::MissingMarker(marker));
            }
        }

        let u16_at = |o: usize| u16::from_le_bytes([buf[o], buf[o + 1]]);
        let u32_at = |o: usize| u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]]);

        let format = u16_at(20);
        let channels = u16_at(22);
        let bits_per_sample = u16_at(34);
        if format != PCM_FORMAT || channels != CHANNELS || bits_per_sample != BITS_PER_SAMPLE {
            return Err(WavError::Unsupported {
                format,
                channels,
                bits: bits_per_sample,
            });
        }

        Ok(Self {
            riff_len: u32_at(4),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            channels,
            block_align: u16_at(32),
            bits_per_sample,
            data_len: u32_at(40),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

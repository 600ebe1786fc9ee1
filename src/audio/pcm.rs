//! 16-bit little-endian PCM plumbing.
//!
//! Every component in the voice session speaks the same wire format: mono,
//! signed 16-bit, little-endian samples packed into byte chunks.  A
//! [`PcmChunk`] is one such block as delivered by a microphone stream.

// ---------------------------------------------------------------------------
// PcmChunk
// ---------------------------------------------------------------------------

/// Bytes per mono 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// One block of raw microphone audio (mono, `i16` LE).
///
/// The byte length is always even, so a chunk boundary never splits a sample.
/// Construct from samples with [`PcmChunk::from_samples`] or from raw bytes
/// with [`PcmChunk::from_bytes`] (a trailing odd byte is dropped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmChunk {
    bytes: Vec<u8>,
}

impl PcmChunk {
    /// Wrap raw LE bytes.  An odd trailing byte cannot form a sample and is
    /// discarded.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        if bytes.len() % BYTES_PER_SAMPLE != 0 {
            bytes.pop();
        }
        Self { bytes }
    }

    /// Encode `samples` as little-endian bytes.
    ///
    /// ```
    /// use aurora_voice::audio::PcmChunk;
    ///
    /// let chunk = PcmChunk::from_samples(&[1, -1]);
    /// assert_eq!(chunk.as_bytes(), &[0x01, 0x00, 0xff, 0xff]);
    /// ```
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self { bytes }
    }

    /// Iterate the decoded samples in order.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of samples in the chunk.
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Convert a normalised `f32` sample in `[-1.0, 1.0]` to `i16`, clamping
/// out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32_767.0).clamp(-32_768.0, 32_767.0) as i16
}

/// Convert an `i16` sample to a normalised `f32`.
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32_768.0
}

/// Duration in milliseconds of `byte_len` bytes of mono 16-bit PCM.
pub fn duration_ms(byte_len: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (byte_len / BYTES_PER_SAMPLE) as u64 * 1_000 / sample_rate as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_decode_little_endian() {
        let chunk = PcmChunk::from_bytes(vec![0x34, 0x12, 0x00, 0x80]);
        let samples: Vec<i16> = chunk.samples().collect();
        assert_eq!(samples, vec![0x1234, i16::MIN]);
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let chunk = PcmChunk::from_bytes(vec![1, 0, 7]);
        assert_eq!(chunk.as_bytes().len(), 2);
        assert_eq!(chunk.sample_count(), 1);
    }

    #[test]
    fn from_samples_matches_sample_iterator() {
        let input = [0_i16, 1300, -1300, i16::MAX, i16::MIN];
        let chunk = PcmChunk::from_samples(&input);
        assert_eq!(chunk.samples().collect::<Vec<_>>(), input.to_vec());
    }

    #[test]
    fn f32_conversion_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), i16::MIN);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn duration_of_one_second_at_16k() {
        assert_eq!(duration_ms(32_000, 16_000), 1_000);
        assert_eq!(duration_ms(32_000, 0), 0);
    }
}

use std::{sync::Arc, time::Duration};

use crate::{EditorError, Result};

/// Largest magnitude a signed 16-bit sample can represent.
pub const FULL_SCALE: f64 = 32_768.0;

/// Bytes per stored sample; storage is always signed 16-bit.
pub const SAMPLE_WIDTH_BYTES: u16 = 2;

/// Decoded PCM audio held in memory.
///
/// Samples are signed 16-bit values interleaved by channel. The buffer is
/// immutable once constructed; every transformation produces a new buffer.
/// Cloning is cheap because the sample storage is shared, which lets a
/// playback session keep its captured audio while the editor swaps in a
/// freshly filtered buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Arc<[i16]>,
    channel_count: u16,
    sample_rate: u32,
    sample_width_bytes: u16,
}

impl SampleBuffer {
    /// Builds a buffer, checking the format metadata against the samples.
    pub fn new(
        samples: Vec<i16>,
        channel_count: u16,
        sample_rate: u32,
        sample_width_bytes: u16,
    ) -> Result<Self> {
        if channel_count == 0 {
            return Err(EditorError::invalid("channel count must be positive"));
        }
        if sample_rate == 0 {
            return Err(EditorError::invalid("sample rate must be positive"));
        }
        if sample_width_bytes != SAMPLE_WIDTH_BYTES {
            return Err(EditorError::UnsupportedFormat(format!(
                "{sample_width_bytes}-byte samples, only 16-bit is supported"
            )));
        }
        if samples.len() % channel_count as usize != 0 {
            return Err(EditorError::invalid(format!(
                "{} samples do not divide evenly into {channel_count} channels",
                samples.len()
            )));
        }

        Ok(Self {
            samples: samples.into(),
            channel_count,
            sample_rate,
            sample_width_bytes,
        })
    }

    /// Returns a new buffer with the same format but different samples.
    ///
    /// Used by transformations, which never change the channel layout.
    pub(crate) fn with_samples(&self, samples: Vec<i16>) -> Self {
        debug_assert_eq!(samples.len() % self.channel_count as usize, 0);
        Self {
            samples: samples.into(),
            channel_count: self.channel_count,
            sample_rate: self.sample_rate,
            sample_width_bytes: self.sample_width_bytes,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_width_bytes(&self) -> u16 {
        self.sample_width_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Raw little-endian PCM bytes, the layout output devices consume.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|sample| sample.to_le_bytes())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_samples_that_do_not_fill_whole_frames() {
        let err = SampleBuffer::new(vec![0; 5], 2, 44_100, 2).unwrap_err();
        assert!(matches!(err, EditorError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_zero_format_fields() {
        assert!(SampleBuffer::new(vec![0; 4], 0, 44_100, 2).is_err());
        assert!(SampleBuffer::new(vec![0; 4], 2, 0, 2).is_err());
    }

    #[test]
    fn rejects_widths_other_than_16_bit() {
        for width in [0, 1, 3, 4] {
            assert!(matches!(
                SampleBuffer::new(vec![0; 4], 2, 44_100, width),
                Err(EditorError::UnsupportedFormat(_))
            ));
        }
        let buffer = SampleBuffer::new(vec![0; 4], 2, 44_100, SAMPLE_WIDTH_BYTES).unwrap();
        assert_eq!(
            buffer.to_le_bytes().len(),
            buffer.samples().len() * buffer.sample_width_bytes() as usize
        );
    }

    #[test]
    fn reports_frames_and_duration() {
        let buffer = SampleBuffer::new(vec![1, -1, 2, -2, 3, -3], 2, 3, 2).unwrap();
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.duration(), Duration::from_secs(1));
    }

    #[test]
    fn encodes_little_endian_bytes() {
        let buffer = SampleBuffer::new(vec![1, -2], 1, 8_000, 2).unwrap();
        assert_eq!(buffer.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
    }

    #[test]
    fn clones_share_sample_storage() {
        let buffer = SampleBuffer::new(vec![7; 8], 1, 8_000, 2).unwrap();
        let copy = buffer.clone();
        assert!(std::ptr::eq(buffer.samples(), copy.samples()));
    }
}

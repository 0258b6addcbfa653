use std::path::Path;

use crate::{buffer::SAMPLE_WIDTH_BYTES, EditorError, Result, SampleBuffer};

/// File formats the editor can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
}

impl AudioFormat {
    /// Resolves the format from a file extension, ignoring case.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                EditorError::UnsupportedFormat(format!("`{}` has no file extension", path.display()))
            })?;

        match extension.as_str() {
            "wav" | "wave" => Ok(Self::Wav),
            other => Err(EditorError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Converts between audio files and in-memory sample buffers.
pub trait AudioCodec {
    fn decode(&self, path: &Path) -> Result<SampleBuffer>;
    fn encode(&self, buffer: &SampleBuffer, path: &Path, format: AudioFormat) -> Result<()>;
}

/// WAV reader/writer backed by `hound`.
///
/// Every supported input is converted to signed 16-bit samples; output is
/// always 16-bit integer PCM.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavCodec;

impl AudioCodec for WavCodec {
    fn decode(&self, path: &Path) -> Result<SampleBuffer> {
        AudioFormat::from_path(path)?;

        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .collect::<std::result::Result<_, _>>()?,
            (hound::SampleFormat::Int, bits @ (8 | 24 | 32)) => {
                let shift = bits as i32 - 16;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| rescale_int(x, shift)))
                    .collect::<std::result::Result<_, _>>()?
            }
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(float_to_i16))
                .collect::<std::result::Result<_, _>>()?,
            (format, bits) => {
                return Err(EditorError::UnsupportedFormat(format!(
                    "{bits}-bit {format:?} wav"
                )))
            }
        };

        tracing::debug!(?path, ?spec, samples = samples.len(), "decoded wav");
        SampleBuffer::new(samples, spec.channels, spec.sample_rate, SAMPLE_WIDTH_BYTES)
    }

    fn encode(&self, buffer: &SampleBuffer, path: &Path, format: AudioFormat) -> Result<()> {
        match format {
            AudioFormat::Wav => {
                let spec = hound::WavSpec {
                    channels: buffer.channel_count(),
                    sample_rate: buffer.sample_rate(),
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };
                let mut writer = hound::WavWriter::create(path, spec)?;
                for &sample in buffer.samples() {
                    writer.write_sample(sample)?;
                }
                writer.finalize()?;
            }
        }
        tracing::debug!(?path, frames = buffer.frames(), "encoded wav");
        Ok(())
    }
}

fn rescale_int(value: i32, shift: i32) -> i16 {
    let scaled = if shift >= 0 {
        value >> shift
    } else {
        value << -shift
    };
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn float_to_i16(value: f32) -> i16 {
    (value as f64 * 32_768.0)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("audio-editor-{}-{name}", std::process::id()))
    }

    #[test]
    fn resolves_format_from_extension() {
        assert_eq!(AudioFormat::from_path(Path::new("a/b.WAV")).unwrap(), AudioFormat::Wav);
        assert!(matches!(
            AudioFormat::from_path(Path::new("song.mp3")),
            Err(EditorError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            AudioFormat::from_path(Path::new("noext")),
            Err(EditorError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn wav_file_survives_export_and_reload() {
        let path = temp_path("stereo.wav");
        let buffer = SampleBuffer::new(vec![0, 1, -1, i16::MAX, i16::MIN, 42], 2, 22_050, 2).unwrap();

        WavCodec.encode(&buffer, &path, AudioFormat::Wav).unwrap();
        let decoded = WavCodec.decode(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(decoded, buffer);
    }

    #[test]
    fn decodes_24_bit_files_to_16_bit() {
        let path = temp_path("deep.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0i32, 256, -8_388_608, 8_388_607] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = WavCodec.decode(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(decoded.samples(), &[0, 1, i16::MIN, i16::MAX]);
        assert_eq!(decoded.sample_width_bytes(), 2);
    }

    #[test]
    fn decodes_8_bit_files_to_16_bit() {
        let path = temp_path("narrow.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0i8, 1, -128, 127] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = WavCodec.decode(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(decoded.samples(), &[0, 256, i16::MIN, 32_512]);
    }

    #[test]
    fn decodes_float_files_with_clipping() {
        let path = temp_path("float.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0.0f32, 0.5, -1.0, 1.0, 2.0, -0.25] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = WavCodec.decode(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.sample_rate(), 48_000);
        assert_eq!(
            decoded.samples(),
            &[0, 16_384, i16::MIN, i16::MAX, i16::MAX, -8_192]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(WavCodec.decode(&temp_path("does-not-exist.wav")).is_err());
    }
}

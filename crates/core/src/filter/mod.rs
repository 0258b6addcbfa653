//! Frequency-domain filters and gain.
//!
//! Every function here is pure: it reads a [`SampleBuffer`] and returns a
//! newly allocated one with the same channel count, sample rate and sample
//! width. Filters are linear-phase windowed-sinc FIR kernels applied to each
//! channel with FFT overlap-add over fixed-size blocks, so the cost grows
//! linearly with the length of the audio and the FFT is planned once per call.

use std::{f64::consts::PI, sync::Arc};

use realfft::{num_complex::Complex64, ComplexToReal, RealFftPlanner, RealToComplex};

use crate::{EditorError, Result, SampleBuffer};

pub const MIN_CUTOFF_HZ: u32 = 1;
pub const MAX_CUTOFF_HZ: u32 = 20_000;
pub const MIN_GAIN_DB: f32 = -20.0;
pub const MAX_GAIN_DB: f32 = 20.0;

/// Length of every filter kernel. Odd, so the kernel has an integer delay.
pub const KERNEL_TAPS: usize = 1_025;
/// FFT size used for overlap-add.
const BLOCK_SIZE: usize = 4_096;
/// Input samples consumed per block.
const HOP_SIZE: usize = BLOCK_SIZE - KERNEL_TAPS + 1;

/// Checks that a cutoff lies within `[MIN_CUTOFF_HZ, MAX_CUTOFF_HZ]`.
pub fn validate_cutoff(cutoff_hz: u32) -> Result<()> {
    if (MIN_CUTOFF_HZ..=MAX_CUTOFF_HZ).contains(&cutoff_hz) {
        Ok(())
    } else {
        Err(EditorError::invalid(format!(
            "cutoff {cutoff_hz} Hz outside {MIN_CUTOFF_HZ}..={MAX_CUTOFF_HZ} Hz"
        )))
    }
}

/// Checks that a gain lies within `[MIN_GAIN_DB, MAX_GAIN_DB]`.
pub fn validate_gain(db: f32) -> Result<()> {
    if db.is_finite() && (MIN_GAIN_DB..=MAX_GAIN_DB).contains(&db) {
        Ok(())
    } else {
        Err(EditorError::invalid(format!(
            "gain {db} dB outside {MIN_GAIN_DB}..={MAX_GAIN_DB} dB"
        )))
    }
}

/// Removes frequency content above `cutoff_hz`.
pub fn apply_lowpass(buffer: &SampleBuffer, cutoff_hz: u32) -> Result<SampleBuffer> {
    validate_cutoff(cutoff_hz)?;
    let nyquist = buffer.sample_rate() as f64 / 2.0;
    if cutoff_hz as f64 >= nyquist || buffer.is_empty() {
        // Nothing above the cutoff can be represented.
        return Ok(buffer.clone());
    }
    convolve_channels(buffer, &lowpass_kernel(cutoff_hz, buffer.sample_rate()))
}

/// Removes frequency content below `cutoff_hz`.
///
/// A cutoff of [`MIN_CUTOFF_HZ`] is the fully open position and leaves the
/// buffer as it is.
pub fn apply_highpass(buffer: &SampleBuffer, cutoff_hz: u32) -> Result<SampleBuffer> {
    validate_cutoff(cutoff_hz)?;
    let nyquist = buffer.sample_rate() as f64 / 2.0;
    if cutoff_hz <= MIN_CUTOFF_HZ || buffer.is_empty() {
        return Ok(buffer.clone());
    }
    if cutoff_hz as f64 >= nyquist {
        return Ok(buffer.with_samples(vec![0; buffer.samples().len()]));
    }
    convolve_channels(buffer, &highpass_kernel(cutoff_hz, buffer.sample_rate()))
}

/// Scales every sample by `10^(db / 20)`.
///
/// Results beyond the 16-bit range are hard clamped to `i16::MIN`/`i16::MAX`.
/// Clipping is lossy but accepted; it is not reported as an error.
pub fn apply_gain(buffer: &SampleBuffer, db: f32) -> Result<SampleBuffer> {
    validate_gain(db)?;
    if db == 0.0 {
        return Ok(buffer.clone());
    }

    let factor = 10f64.powf(db as f64 / 20.0);
    let samples = buffer
        .samples()
        .iter()
        .map(|&sample| to_i16(sample as f64 * factor))
        .collect();
    Ok(buffer.with_samples(samples))
}

fn lowpass_kernel(cutoff_hz: u32, sample_rate: u32) -> Vec<f64> {
    let cutoff = cutoff_hz as f64 / sample_rate as f64;
    let center = (KERNEL_TAPS - 1) as f64 / 2.0;
    let mut taps: Vec<f64> = (0..KERNEL_TAPS)
        .map(|n| 2.0 * cutoff * sinc(2.0 * cutoff * (n as f64 - center)) * blackman(n))
        .collect();

    // Unity gain at DC.
    let sum: f64 = taps.iter().sum();
    for tap in &mut taps {
        *tap /= sum;
    }
    taps
}

/// Spectral inversion of the matching lowpass.
fn highpass_kernel(cutoff_hz: u32, sample_rate: u32) -> Vec<f64> {
    let mut taps = lowpass_kernel(cutoff_hz, sample_rate);
    for tap in &mut taps {
        *tap = -*tap;
    }
    taps[(KERNEL_TAPS - 1) / 2] += 1.0;
    taps
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn blackman(n: usize) -> f64 {
    let phase = 2.0 * PI * n as f64 / (KERNEL_TAPS - 1) as f64;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}

fn convolve_channels(buffer: &SampleBuffer, taps: &[f64]) -> Result<SampleBuffer> {
    let channels = buffer.channel_count() as usize;
    let mut convolver = BlockConvolver::new(taps)?;
    let mut filtered = vec![0i16; buffer.samples().len()];
    let mut input = Vec::with_capacity(buffer.frames());

    for channel in 0..channels {
        input.clear();
        input.extend(
            buffer
                .samples()
                .iter()
                .skip(channel)
                .step_by(channels)
                .map(|&sample| sample as f64),
        );

        let output = convolver.process(&input)?;
        for (frame, value) in output.iter().enumerate() {
            filtered[frame * channels + channel] = to_i16(*value);
        }
    }

    tracing::trace!(frames = buffer.frames(), channels, "convolved buffer");
    Ok(buffer.with_samples(filtered))
}

/// Overlap-add convolution with a fixed kernel.
struct BlockConvolver {
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    kernel: Vec<Complex64>,
    block: Vec<f64>,
    spectrum: Vec<Complex64>,
    output: Vec<f64>,
    forward_scratch: Vec<Complex64>,
    inverse_scratch: Vec<Complex64>,
}

impl BlockConvolver {
    fn new(taps: &[f64]) -> Result<Self> {
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(BLOCK_SIZE);
        let inverse = planner.plan_fft_inverse(BLOCK_SIZE);

        let mut block = forward.make_input_vec();
        let mut kernel = forward.make_output_vec();
        let mut forward_scratch = forward.make_scratch_vec();
        block[..taps.len()].copy_from_slice(taps);
        forward.process_with_scratch(&mut block, &mut kernel, &mut forward_scratch)?;

        Ok(Self {
            spectrum: forward.make_output_vec(),
            output: inverse.make_output_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            forward,
            inverse,
            kernel,
            block,
            forward_scratch,
        })
    }

    /// Filters `input`, compensating the kernel delay so the output lines up
    /// sample for sample with the input.
    fn process(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        let delay = (KERNEL_TAPS - 1) / 2;
        let scale = 1.0 / BLOCK_SIZE as f64;
        let mut accumulated = vec![0.0; input.len() + KERNEL_TAPS - 1];

        for (index, chunk) in input.chunks(HOP_SIZE).enumerate() {
            self.block[..chunk.len()].copy_from_slice(chunk);
            self.block[chunk.len()..].fill(0.0);

            self.forward.process_with_scratch(
                &mut self.block,
                &mut self.spectrum,
                &mut self.forward_scratch,
            )?;
            for (bin, kernel) in self.spectrum.iter_mut().zip(&self.kernel) {
                *bin *= *kernel;
            }
            // The inverse transform rejects imaginary parts on the purely real bins.
            self.spectrum[0].im = 0.0;
            if let Some(last) = self.spectrum.last_mut() {
                last.im = 0.0;
            }
            self.inverse.process_with_scratch(
                &mut self.spectrum,
                &mut self.output,
                &mut self.inverse_scratch,
            )?;

            let start = index * HOP_SIZE;
            let used = chunk.len() + KERNEL_TAPS - 1;
            for (slot, value) in accumulated[start..start + used].iter_mut().zip(&self.output) {
                *slot += value * scale;
            }
        }

        Ok(accumulated[delay..delay + input.len()].to_vec())
    }
}

fn to_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn tone(freqs: &[f64], sample_rate: u32, frames: usize, amplitude: f64) -> SampleBuffer {
        let samples = (0..frames)
            .map(|n| {
                let t = n as f64 / sample_rate as f64;
                let sum: f64 = freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum();
                to_i16(sum * amplitude)
            })
            .collect();
        SampleBuffer::new(samples, 1, sample_rate, 2).unwrap()
    }

    fn rms(samples: &[i16]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    // Skips the edges, where the kernel overlaps the implicit silence around
    // the buffer.
    fn interior(samples: &[i16]) -> &[i16] {
        &samples[KERNEL_TAPS..samples.len() - KERNEL_TAPS]
    }

    #[test]
    fn lowpass_removes_tones_above_cutoff() {
        let high = tone(&[3_000.0], 8_000, 8_000, 10_000.0);
        let low = tone(&[100.0], 8_000, 8_000, 10_000.0);

        let filtered_high = apply_lowpass(&high, 1_000).unwrap();
        let filtered_low = apply_lowpass(&low, 1_000).unwrap();

        assert!(rms(interior(filtered_high.samples())) < rms(interior(high.samples())) * 0.01);
        assert!(rms(interior(filtered_low.samples())) > rms(interior(low.samples())) * 0.99);
    }

    #[test]
    fn highpass_removes_tones_below_cutoff() {
        let mixed = tone(&[50.0, 2_000.0], 8_000, 8_000, 8_000.0);
        let only_high = tone(&[2_000.0], 8_000, 8_000, 8_000.0);

        let filtered = apply_highpass(&mixed, 500).unwrap();

        let diff: Vec<i16> = interior(filtered.samples())
            .iter()
            .zip(interior(only_high.samples()))
            .map(|(a, b)| a - b)
            .collect();
        assert!(rms(&diff) < rms(interior(only_high.samples())) * 0.01);
    }

    #[test]
    fn filters_preserve_format_and_channel_layout() {
        let samples: Vec<i16> = (0..8_000).map(|n| if n % 2 == 0 { 1_000 } else { -500 }).collect();
        let stereo = SampleBuffer::new(samples, 2, 22_050, 2).unwrap();

        let filtered = apply_highpass(&stereo, 200).unwrap();

        assert_eq!(filtered.channel_count(), 2);
        assert_eq!(filtered.sample_rate(), 22_050);
        assert_eq!(filtered.sample_width_bytes(), 2);
        assert_eq!(filtered.samples().len(), stereo.samples().len());
        // Both channels are pure DC, so the highpass silences them away from the edges.
        assert!(interior(filtered.samples()).iter().all(|s| s.abs() <= 1));
    }

    #[test]
    fn filtering_is_deterministic() {
        let buffer = tone(&[440.0, 5_000.0], 44_100, 4_410, 6_000.0);
        let first = apply_lowpass(&buffer, 2_000).unwrap();
        let second = apply_lowpass(&buffer, 2_000).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn open_cutoffs_leave_the_buffer_untouched() {
        let buffer = tone(&[1_000.0], 8_000, 800, 5_000.0);

        let lowpassed = apply_lowpass(&buffer, 4_000).unwrap();
        let highpassed = apply_highpass(&buffer, MIN_CUTOFF_HZ).unwrap();

        // No work done: the sample storage is shared with the input.
        assert!(std::ptr::eq(lowpassed.samples(), buffer.samples()));
        assert!(std::ptr::eq(highpassed.samples(), buffer.samples()));
    }

    #[test]
    fn highpass_at_or_above_nyquist_silences() {
        let buffer = tone(&[1_000.0], 8_000, 800, 5_000.0);
        let filtered = apply_highpass(&buffer, 4_000).unwrap();
        assert!(filtered.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn buffers_shorter_than_the_kernel_are_filtered() {
        let buffer = tone(&[100.0], 8_000, 10, 1_000.0);
        let filtered = apply_lowpass(&buffer, 1_000).unwrap();
        assert_eq!(filtered.samples().len(), 10);
    }

    #[test]
    fn long_buffers_filter_in_linear_time() {
        // Twenty seconds of stereo audio at 44.1 kHz with a prime frame count.
        let frames = 882_001;
        let samples = (0..frames * 2).map(|n| ((n * 7_919) % 20_000) as i16 - 10_000).collect();
        let buffer = SampleBuffer::new(samples, 2, 44_100, 2).unwrap();

        let started = Instant::now();
        let lowpassed = apply_lowpass(&buffer, 5_000).unwrap();
        let filtered = apply_highpass(&lowpassed, 100).unwrap();

        assert_eq!(filtered.frames(), frames);
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[test]
    fn rejects_out_of_range_cutoffs() {
        let buffer = tone(&[100.0], 8_000, 80, 1_000.0);
        for cutoff in [0, 20_001] {
            assert!(matches!(
                apply_lowpass(&buffer, cutoff),
                Err(EditorError::InvalidParameter(_))
            ));
            assert!(matches!(
                apply_highpass(&buffer, cutoff),
                Err(EditorError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn gain_clips_instead_of_wrapping() {
        let ninety_percent = (i16::MAX as f64 * 0.9) as i16;
        let buffer = SampleBuffer::new(vec![ninety_percent, -ninety_percent, 0], 1, 8_000, 2).unwrap();

        let boosted = apply_gain(&buffer, 20.0).unwrap();

        assert_eq!(boosted.samples(), &[i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn gain_scales_by_decibels() {
        let buffer = SampleBuffer::new(vec![10_000, -10_000], 1, 8_000, 2).unwrap();
        let cut = apply_gain(&buffer, -20.0).unwrap();
        assert_eq!(cut.samples(), &[1_000, -1_000]);
        assert_eq!(apply_gain(&buffer, 0.0).unwrap(), buffer);
    }

    #[test]
    fn rejects_out_of_range_gain() {
        let buffer = SampleBuffer::new(vec![1], 1, 8_000, 2).unwrap();
        assert!(apply_gain(&buffer, 20.5).is_err());
        assert!(apply_gain(&buffer, -21.0).is_err());
        assert!(apply_gain(&buffer, f32::NAN).is_err());
    }
}

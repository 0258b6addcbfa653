use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{buffer::FULL_SCALE, EditorError, Result, SampleBuffer};

/// Lobes of the Lanczos kernel used when resampling to the display width.
const LANCZOS_LOBES: f64 = 3.0;

/// Fixed-width amplitude strip used to draw the waveform.
///
/// Values use an inverted convention: silence maps to `1.0` and a
/// full-scale sample maps to `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformEnvelope {
    values: Vec<f32>,
}

impl WaveformEnvelope {
    pub fn width(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Builds an envelope of exactly `width` columns from `buffer`.
///
/// Only the first channel of each frame contributes (every
/// `channel_count`-th sample). Each sample becomes
/// `1 - |sample / 32768|` and the resulting sequence is resampled to `width`
/// with a Lanczos kernel.
pub fn render(buffer: &SampleBuffer, width: usize) -> Result<WaveformEnvelope> {
    if buffer.is_empty() {
        return Err(EditorError::EmptyBuffer);
    }
    if width == 0 {
        return Err(EditorError::invalid("waveform width must be positive"));
    }

    let levels: Vec<f64> = buffer
        .samples()
        .iter()
        .step_by(buffer.channel_count() as usize)
        .map(|&sample| 1.0 - (sample as f64 / FULL_SCALE).abs())
        .collect();

    let values = resample_lanczos(&levels, width)
        .into_iter()
        .map(|value| value.clamp(0.0, 1.0) as f32)
        .collect();

    Ok(WaveformEnvelope { values })
}

/// Maps a playback position onto one of `width` display columns.
pub fn cursor_column(position: usize, total_frames: usize, width: usize) -> usize {
    if total_frames == 0 || width == 0 {
        return 0;
    }
    let fraction = position.min(total_frames) as f64 / total_frames as f64;
    ((fraction * width as f64) as usize).min(width - 1)
}

fn resample_lanczos(input: &[f64], width: usize) -> Vec<f64> {
    let scale = input.len() as f64 / width as f64;
    // Widen the kernel when shrinking so every input sample is seen.
    let filter_scale = scale.max(1.0);
    let support = LANCZOS_LOBES * filter_scale;

    (0..width)
        .map(|column| {
            let center = (column as f64 + 0.5) * scale;
            let start = (center - support).floor().max(0.0) as usize;
            let end = ((center + support).ceil() as usize).min(input.len());

            let mut weighted = 0.0;
            let mut total = 0.0;
            for (index, value) in input.iter().enumerate().take(end).skip(start) {
                let weight = lanczos((index as f64 + 0.5 - center) / filter_scale);
                weighted += weight * value;
                total += weight;
            }

            if total.abs() > f64::EPSILON {
                weighted / total
            } else {
                let nearest = (center as usize).min(input.len() - 1);
                input[nearest]
            }
        })
        .collect()
}

fn lanczos(x: f64) -> f64 {
    if x.abs() >= LANCZOS_LOBES {
        0.0
    } else {
        sinc(x) * sinc(x / LANCZOS_LOBES)
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

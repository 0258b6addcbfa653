use serde::{Deserialize, Serialize};

use crate::{
    filter::{self, MAX_CUTOFF_HZ, MIN_CUTOFF_HZ},
    EditorError, Result, SampleBuffer,
};

/// Filter and gain settings applied to the original buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub lowpass_cutoff_hz: u32,
    pub highpass_cutoff_hz: u32,
    pub gain_db: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            lowpass_cutoff_hz: MAX_CUTOFF_HZ,
            highpass_cutoff_hz: MIN_CUTOFF_HZ,
            gain_db: 0.0,
        }
    }
}

impl FilterParams {
    /// Derives the processed buffer from `original`.
    ///
    /// Always starts from the untouched source so repeated edits never stack
    /// filter artefacts on top of each other.
    pub fn render(&self, original: &SampleBuffer) -> Result<SampleBuffer> {
        let lowpassed = filter::apply_lowpass(original, self.lowpass_cutoff_hz)?;
        let highpassed = filter::apply_highpass(&lowpassed, self.highpass_cutoff_hz)?;
        filter::apply_gain(&highpassed, self.gain_db)
    }
}

#[derive(Debug)]
struct Loaded {
    original: SampleBuffer,
    current: SampleBuffer,
}

/// Owns the loaded audio and the settings that turn it into what is heard.
///
/// The original buffer is never modified; `current` is replaced wholesale
/// after every successful parameter change. Callers holding a waveform
/// envelope must re-render it after any mutation.
#[derive(Debug, Default)]
pub struct AudioState {
    loaded: Option<Loaded>,
    params: FilterParams,
}

impl AudioState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any loaded audio and resets filters and gain.
    pub fn load(&mut self, buffer: SampleBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Err(EditorError::EmptyBuffer);
        }

        tracing::info!(
            frames = buffer.frames(),
            channels = buffer.channel_count(),
            sample_rate = buffer.sample_rate(),
            "loaded audio"
        );
        self.params = FilterParams::default();
        self.loaded = Some(Loaded {
            original: buffer.clone(),
            current: buffer,
        });
        Ok(())
    }

    pub fn set_lowpass(&mut self, hz: u32) -> Result<()> {
        filter::validate_cutoff(hz)?;
        self.recompute(FilterParams {
            lowpass_cutoff_hz: hz,
            ..self.params
        })
    }

    pub fn set_highpass(&mut self, hz: u32) -> Result<()> {
        filter::validate_cutoff(hz)?;
        self.recompute(FilterParams {
            highpass_cutoff_hz: hz,
            ..self.params
        })
    }

    pub fn set_gain(&mut self, db: f32) -> Result<()> {
        filter::validate_gain(db)?;
        self.recompute(FilterParams {
            gain_db: db,
            ..self.params
        })
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    pub fn current_buffer(&self) -> Result<&SampleBuffer> {
        self.loaded
            .as_ref()
            .map(|loaded| &loaded.current)
            .ok_or(EditorError::NoAudioLoaded)
    }

    pub fn original_buffer(&self) -> Result<&SampleBuffer> {
        self.loaded
            .as_ref()
            .map(|loaded| &loaded.original)
            .ok_or(EditorError::NoAudioLoaded)
    }

    // Parameters are only committed once the new buffer exists, so a failure
    // leaves the previous state intact.
    fn recompute(&mut self, params: FilterParams) -> Result<()> {
        let loaded = self.loaded.as_mut().ok_or(EditorError::NoAudioLoaded)?;
        let current = params.render(&loaded.original)?;
        tracing::debug!(?params, "recomputed filtered audio");
        loaded.current = current;
        self.params = params;
        Ok(())
    }
}

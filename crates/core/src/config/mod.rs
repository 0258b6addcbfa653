use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{EditorError, Result};

/// Top-level configuration structure for the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub waveform: WaveformConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

impl EditorConfig {
    /// Reads a JSON configuration file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|err| {
            EditorError::invalid(format!("config `{}`: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.waveform.width == 0 {
            return Err(EditorError::invalid("waveform width must be positive"));
        }
        if self.playback.tick_ms == 0 {
            return Err(EditorError::invalid("playback tick must be positive"));
        }
        Ok(())
    }
}

/// Size of the waveform display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Number of columns an envelope is resampled to.
    pub width: usize,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self { width: 400 }
    }
}

/// Timing of the playback cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Interval between cursor position updates, in milliseconds.
    pub tick_ms: u64,
}

impl PlaybackConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { tick_ms: 50 }
    }
}

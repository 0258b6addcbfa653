//! Command dispatch between a front end and the audio core.
//!
//! Front ends translate user input into [`Command`]s and hand them to an
//! [`Editor`]; they never touch threads or device handles themselves.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    waveform, AudioCodec, AudioFormat, AudioState, EditorConfig, EditorError, PlaybackController,
    PlaybackDevice, Result, WaveformEnvelope,
};

/// A single user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(PathBuf),
    SetLowpass(u32),
    SetHighpass(u32),
    SetGain(f32),
    Start,
    Stop,
    Export(PathBuf),
}

impl FromStr for Command {
    type Err = EditorError;

    /// Parses the text vocabulary used by interactive sessions, e.g.
    /// `open song.wav`, `lowpass 800`, `gain -3.5`, `play`.
    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match (word.to_ascii_lowercase().as_str(), rest) {
            ("open" | "load", path) if !path.is_empty() => Ok(Self::Load(PathBuf::from(path))),
            ("save" | "export", path) if !path.is_empty() => Ok(Self::Export(PathBuf::from(path))),
            ("lowpass", value) => parse_cutoff(value).map(Self::SetLowpass),
            ("highpass", value) => parse_cutoff(value).map(Self::SetHighpass),
            ("gain" | "volume", value) => value
                .parse::<f32>()
                .map(Self::SetGain)
                .map_err(|_| EditorError::invalid(format!("`{value}` is not a gain in dB"))),
            ("play", "") => Ok(Self::Start),
            ("stop", "") => Ok(Self::Stop),
            _ => Err(EditorError::invalid(format!("unrecognised command `{line}`"))),
        }
    }
}

// Cutoff entries are plain digit strings.
fn parse_cutoff(value: &str) -> Result<u32> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(EditorError::invalid(format!("`{value}` is not a frequency in Hz")));
    }
    value
        .parse()
        .map_err(|_| EditorError::invalid(format!("`{value}` is out of range")))
}

/// What the caller has to refresh after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The audio changed; any previously drawn waveform is stale.
    Waveform(WaveformEnvelope),
    Unchanged,
}

/// Routes commands to the audio state, the codec and the playback controller.
#[derive(Debug)]
pub struct Editor<C: AudioCodec, D: PlaybackDevice> {
    codec: C,
    audio: AudioState,
    playback: PlaybackController<D>,
    waveform_width: usize,
}

impl<C: AudioCodec, D: PlaybackDevice> Editor<C, D> {
    /// Builds an editor with nothing loaded. Fails if `config` is invalid.
    pub fn new(codec: C, device: D, config: &EditorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            codec,
            audio: AudioState::new(),
            playback: PlaybackController::new(device, config.playback.tick()),
            waveform_width: config.waveform.width,
        })
    }

    pub fn audio(&self) -> &AudioState {
        &self.audio
    }

    pub fn playback(&self) -> &PlaybackController<D> {
        &self.playback
    }

    /// Executes one command. A failed command leaves every piece of state as
    /// it was.
    pub fn dispatch(&mut self, command: Command) -> Result<Outcome> {
        tracing::debug!(?command, "dispatching");
        match command {
            Command::Load(path) => {
                let buffer = self.codec.decode(&path)?;
                // Render first so a buffer that cannot be drawn is never committed.
                let envelope = waveform::render(&buffer, self.waveform_width)?;
                self.audio.load(buffer)?;
                tracing::info!(?path, "opened audio file");
                Ok(Outcome::Waveform(envelope))
            }
            Command::SetLowpass(hz) => {
                self.audio.set_lowpass(hz)?;
                self.changed()
            }
            Command::SetHighpass(hz) => {
                self.audio.set_highpass(hz)?;
                self.changed()
            }
            Command::SetGain(db) => {
                self.audio.set_gain(db)?;
                self.changed()
            }
            Command::Start => {
                // Playback keeps its own copy; later edits need a restart to be heard.
                let buffer = self.audio.current_buffer()?.clone();
                self.playback.start(&buffer)?;
                Ok(Outcome::Unchanged)
            }
            Command::Stop => {
                self.playback.stop()?;
                Ok(Outcome::Unchanged)
            }
            Command::Export(path) => {
                self.export(&path)?;
                Ok(Outcome::Unchanged)
            }
        }
    }

    /// Renders the current buffer at the configured width.
    pub fn waveform(&self) -> Result<WaveformEnvelope> {
        waveform::render(self.audio.current_buffer()?, self.waveform_width)
    }

    /// Display column of the playback cursor.
    pub fn cursor_column(&self) -> Result<usize> {
        let snapshot = self.playback.snapshot()?;
        Ok(waveform::cursor_column(
            snapshot.position,
            snapshot.total_frames,
            self.waveform_width,
        ))
    }

    fn export(&self, path: &Path) -> Result<()> {
        let buffer = self.audio.current_buffer()?;
        let format = AudioFormat::from_path(path)?;
        self.codec.encode(buffer, path, format)?;
        tracing::info!(?path, ?format, "exported audio");
        Ok(())
    }

    fn changed(&self) -> Result<Outcome> {
        self.waveform().map(Outcome::Waveform)
    }
}

//! Core library for the audio editor.
//!
//! The crate holds everything that has invariants: the immutable sample
//! buffer, the filter engine, the audio state that always re-derives its
//! processed buffer from the untouched original, the waveform renderer and
//! the playback controller that keeps a cursor in step with the output
//! device. File codecs and output devices sit behind the [`AudioCodec`] and
//! [`PlaybackDevice`] traits; front ends drive the core through
//! [`Editor::dispatch`].

pub mod buffer;
pub mod codec;
pub mod config;
pub mod editor;
pub mod error;
pub mod filter;
pub mod playback;
pub mod state;
pub mod waveform;

pub use buffer::SampleBuffer;
pub use codec::{AudioCodec, AudioFormat, WavCodec};
pub use config::{EditorConfig, PlaybackConfig, WaveformConfig};
pub use editor::{Command, Editor, Outcome};
pub use error::{EditorError, Result};
pub use playback::{PlaybackController, PlaybackDevice, PlaybackSnapshot, PlaybackState};
pub use state::{AudioState, FilterParams};
pub use waveform::WaveformEnvelope;
